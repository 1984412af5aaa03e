use std::collections::HashMap;
use std::fs::File;
use std::io::{prelude::*, BufReader};
use std::mem;
use std::path::Path;

use log::{debug, trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::params::{Param, ParamLike, ParamList, Unit};
use crate::spectrum::bindata::Bytes;
use crate::spectrum::spectrum_types::PassThroughMarkup;
use crate::spectrum::{
    ArrayRetrievalError, ArrayType, BinaryArrayMap, BinaryCompressionType, BinaryDataArrayType,
    DataArray, RetentionTime, Spectrum,
};

use super::super::traits::SpectrumSource;
use super::reading_shared::{
    attribute_value, CVParamParse, MzMLParserError, MzMLParserState, XMLParseBase,
};

pub(crate) const BUFFER_SIZE: usize = 10000;

/// The parts of an mzML document that surround its spectra.
///
/// The header and trailer are kept as XML events so that they can be replayed around a
/// different set of spectra by [`MzMLWriter`](super::MzMLWriter).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MzMLDocument {
    /// Every event ahead of the `<spectrumList>` start tag, including the XML declaration
    /// and the `indexedmzML` wrapper if there was one
    pub header: Vec<Event<'static>>,
    /// The `<spectrumList>` start tag, if the document had one
    pub spectrum_list: Option<BytesStart<'static>>,
    /// Every event after `</spectrumList>` through `</mzML>`, minus any offset index and
    /// checksum
    pub trailer: Vec<Event<'static>>,
    /// Whether the document was wrapped in `<indexedmzML>`
    pub indexed: bool,
    /// The `id` of the first `<dataProcessing>` in the header
    pub default_data_processing: Option<String>,
}

const MINIMAL_DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<indexedmzML xmlns="http://psi.hupo.org/ms/mzml" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.2_idx.xsd">
<mzML xmlns="http://psi.hupo.org/ms/mzml" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.0.xsd" version="1.1.0">
<cvList count="2">
<cv id="MS" fullName="Proteomics Standards Initiative Mass Spectrometry Ontology" URI="https://raw.githubusercontent.com/HUPO-PSI/psi-ms-CV/master/psi-ms.obo"/>
<cv id="UO" fullName="Unit Ontology" URI="http://ontologies.berkeleybop.org/uo.obo"/>
</cvList>
<fileDescription><fileContent/></fileDescription>
<softwareList count="0"></softwareList>
<instrumentConfigurationList count="1"><instrumentConfiguration id="IC1"/></instrumentConfigurationList>
<dataProcessingList count="1"><dataProcessing id="DP1"></dataProcessing></dataProcessingList>
<run id="run" defaultInstrumentConfigurationRef="IC1">
<spectrumList count="0" defaultDataProcessingRef="DP1">
</spectrumList>
</run>
</mzML>
</indexedmzML>"#;

impl MzMLDocument {
    /// A bare indexed mzML document with an empty processing history, used when the
    /// spectra being written were not read from a file
    pub fn minimal() -> Self {
        match MzMLReader::new(MINIMAL_DOCUMENT.as_bytes()) {
            Ok(mut reader) => {
                while let Ok(Some(_)) = reader.read_next() {}
                reader.into_document()
            }
            Err(e) => {
                log::error!("Failed to build the minimal mzML document: {e}");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Default)]
struct ArrayBuilder {
    name: Option<ArrayType>,
    dtype: Option<BinaryDataArrayType>,
    compression: Option<BinaryCompressionType>,
    unit: Unit,
    params: ParamList,
    data_processing_reference: Option<Box<str>>,
    array_length: Option<usize>,
    encoded: Bytes,
}

impl ArrayBuilder {
    fn add_param(&mut self, param: Param) {
        if let Some(curie) = param.curie() {
            if let Some(dtype) = BinaryDataArrayType::from_accession(&curie) {
                self.dtype = Some(dtype);
                return;
            }
            if let Some(compression) = BinaryCompressionType::from_accession(&curie) {
                self.compression = Some(compression);
                return;
            }
        }
        if let Some(name) = ArrayType::from_param(&param) {
            if param.unit != Unit::Unknown {
                self.unit = param.unit;
            }
            self.name = Some(name);
            return;
        }
        self.params.push(param);
    }

    fn build(self, spectrum_id: &str) -> Result<DataArray, ArrayRetrievalError> {
        let name = self.name.unwrap_or_else(|| {
            warn!("A data array of {spectrum_id} has no name");
            ArrayType::Unknown
        });
        let dtype = self.dtype.unwrap_or_else(|| {
            debug!("{name} of {spectrum_id} has no data type, assuming its default");
            name.preferred_dtype()
        });
        let compression = self
            .compression
            .unwrap_or(BinaryCompressionType::NoCompression);

        let text: Bytes = self
            .encoded
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let bytes = base64_simd::STANDARD
            .decode_type::<Bytes>(&text)
            .map_err(|e| ArrayRetrievalError::DecompressionError(format!("invalid base64: {e}")))?;

        let mut array = DataArray::decode_from(&name, dtype, compression, &bytes)?;
        if let Some(expected) = self.array_length {
            if expected != array.len() {
                debug!(
                    "{name} of {spectrum_id} declared {expected} values but decoded {}",
                    array.len()
                );
            }
        }
        if self.unit != Unit::Unknown {
            array.unit = self.unit;
        }
        if !self.params.is_empty() {
            array.params = Some(Box::new(self.params));
        }
        array.data_processing_reference = self.data_processing_reference;
        Ok(array)
    }
}

/// Accumulates one `<spectrum>` element's fields and pass-through markup
#[derive(Debug)]
struct SpectrumBuilder {
    id: String,
    index: usize,
    ms_level: Option<u8>,
    retention_time: Option<RetentionTime>,
    params: ParamList,
    arrays: BinaryArrayMap,

    start: BytesStart<'static>,
    body: Vec<Event<'static>>,
    arrays_at: Option<usize>,
    scan_time_group: Option<(usize, ParamList)>,

    stack: Vec<MzMLParserState>,
    scans_seen: usize,
    current_array: Option<ArrayBuilder>,
}

impl XMLParseBase for SpectrumBuilder {}
impl CVParamParse for SpectrumBuilder {}

fn retention_time_from(param: &Param) -> Option<RetentionTime> {
    let value: f64 = match param.coerce() {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse scan start time {:?}: {e}", param.value);
            return None;
        }
    };
    let rt = match param.unit {
        Unit::Second | Unit::Minute => RetentionTime::new(value, param.unit),
        Unit::Millisecond => RetentionTime::seconds(value / 1000.0),
        Unit::Unknown => RetentionTime::minutes(value),
        unit => {
            warn!("Scan start time has a unit that is not a time, {unit:?}, assuming minutes");
            RetentionTime::minutes(value)
        }
    };
    Some(rt)
}

impl SpectrumBuilder {
    fn new(start: BytesStart<'static>, ordinal: usize) -> Result<Self, MzMLParserError> {
        let state = MzMLParserState::Spectrum;
        let id = attribute_value(&start, b"id", state)?.ok_or_else(|| {
            MzMLParserError::IncompleteElementError(
                String::from_utf8_lossy(&start).to_string(),
                state,
            )
        })?;
        let index = attribute_value(&start, b"index", state)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(ordinal);
        Ok(Self {
            id,
            index,
            ms_level: None,
            retention_time: None,
            params: ParamList::new(),
            arrays: BinaryArrayMap::new(),
            start,
            body: Vec::new(),
            arrays_at: None,
            scan_time_group: None,
            stack: Vec::new(),
            scans_seen: 0,
            current_array: None,
        })
    }

    fn state(&self) -> MzMLParserState {
        self.stack
            .last()
            .copied()
            .unwrap_or(MzMLParserState::Spectrum)
    }

    fn in_arrays(&self) -> bool {
        self.stack.contains(&MzMLParserState::BinaryDataArrayList)
    }

    fn fill_param(&mut self, param: Param, state: MzMLParserState) {
        match state {
            MzMLParserState::Spectrum => {
                if param.is_term("MS:1000511") {
                    match param.coerce::<u8>() {
                        Ok(level) => self.ms_level = Some(level),
                        Err(e) => warn!("Invalid ms level {:?} in {}: {e}", param.value, self.id),
                    }
                }
                self.params.push(param);
            }
            MzMLParserState::Scan => {
                if self.scans_seen == 1
                    && self.retention_time.is_none()
                    && param.is_term("MS:1000016")
                {
                    self.retention_time = retention_time_from(&param);
                }
            }
            MzMLParserState::BinaryDataArray => {
                if let Some(array) = self.current_array.as_mut() {
                    array.add_param(param);
                }
            }
            _ => {}
        }
    }

    /// Feed one event to the builder, returning `true` once the spectrum is closed
    fn handle_event(
        &mut self,
        event: Event<'_>,
        groups: &HashMap<String, ParamList>,
    ) -> Result<bool, MzMLParserError> {
        let state = self.state();
        let in_arrays = self.in_arrays();
        let keep = match &event {
            Event::Start(e) => {
                let next = match e.name().as_ref() {
                    b"binaryDataArrayList" => {
                        self.arrays_at = Some(self.body.len());
                        MzMLParserState::BinaryDataArrayList
                    }
                    b"binaryDataArray" => {
                        let array_length = attribute_value(e, b"arrayLength", state)?
                            .and_then(|v| v.parse().ok());
                        let data_processing_reference =
                            attribute_value(e, b"dataProcessingRef", state)?.map(|v| v.into());
                        self.current_array = Some(ArrayBuilder {
                            array_length,
                            data_processing_reference,
                            ..Default::default()
                        });
                        MzMLParserState::BinaryDataArray
                    }
                    b"binary" => MzMLParserState::Binary,
                    b"scanList" => MzMLParserState::ScanList,
                    b"scan" => {
                        self.scans_seen += 1;
                        MzMLParserState::Scan
                    }
                    _ => MzMLParserState::SpectrumChild,
                };
                self.stack.push(next);
                !self.in_arrays()
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"cvParam" | b"userParam" => {
                    let param = Self::handle_param(e, state)?;
                    self.fill_param(param, state);
                    !in_arrays
                }
                b"referenceableParamGroupRef" => {
                    let group_id = attribute_value(e, b"ref", state)?.unwrap_or_default();
                    match groups.get(&group_id) {
                        Some(group) => {
                            let had_time = self.retention_time.is_some();
                            for param in group.iter().cloned() {
                                self.fill_param(param, state);
                            }
                            if state == MzMLParserState::Scan
                                && !had_time
                                && self.retention_time.is_some()
                            {
                                self.scan_time_group = Some((self.body.len(), group.clone()));
                            }
                        }
                        None => warn!("{} refers to an unknown param group {group_id}", self.id),
                    }
                    !in_arrays
                }
                b"binaryDataArrayList" => {
                    self.arrays_at = Some(self.body.len());
                    false
                }
                _ => !in_arrays,
            },
            Event::Text(t) => {
                if state == MzMLParserState::Binary {
                    if let Some(array) = self.current_array.as_mut() {
                        array.encoded.extend_from_slice(t);
                    }
                }
                !in_arrays
            }
            Event::End(e) => {
                match e.name().as_ref() {
                    b"spectrum" if self.stack.is_empty() => return Ok(true),
                    b"binaryDataArray" => {
                        if let Some(array) = self.current_array.take() {
                            let array = array.build(&self.id).map_err(|source| {
                                MzMLParserError::ArrayDecodingError {
                                    id: self.id.clone(),
                                    source,
                                }
                            })?;
                            self.arrays.add(array);
                        }
                    }
                    _ => {}
                }
                self.stack.pop();
                !in_arrays
            }
            Event::Eof => return Err(MzMLParserError::IncompleteSpectrum),
            _ => !in_arrays,
        };
        if keep {
            self.body.push(event.into_owned());
        }
        Ok(false)
    }

    fn into_spectrum(self) -> Spectrum {
        let ms_level = self.ms_level.unwrap_or_else(|| {
            warn!("{} has no ms level, assuming MS1", self.id);
            1
        });
        let arrays_at = self.arrays_at.unwrap_or(self.body.len());
        Spectrum {
            id: self.id,
            index: self.index,
            ms_level,
            retention_time: self.retention_time,
            params: self.params,
            arrays: self.arrays,
            markup: Some(PassThroughMarkup {
                start: self.start,
                body: self.body,
                arrays_at,
                scan_time_group: self.scan_time_group,
            }),
        }
    }
}

/**
A streaming mzML reader that yields fully decoded [`Spectrum`]s one at a time, keeping
only the spectrum being read in memory.

Constructing the reader parses everything ahead of the `<spectrumList>`. The events after
the spectrum list are collected once the last spectrum has been read, after which
[`MzMLReader::document`] describes the whole document.
*/
pub struct MzMLReader<R: Read> {
    handle: Reader<BufReader<R>>,
    /// The current state of the parser
    pub state: MzMLParserState,
    buffer: Bytes,
    document: MzMLDocument,
    reference_param_groups: HashMap<String, ParamList>,
    spectrum_counter: usize,
}

impl<R: Read> XMLParseBase for MzMLReader<R> {}
impl<R: Read> CVParamParse for MzMLReader<R> {}

impl MzMLReader<File> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, MzMLParserError> {
        let handle = File::open(path.as_ref())
            .map_err(|e| MzMLParserError::IOError(MzMLParserState::Start, e))?;
        Self::new(handle)
    }
}

impl<R: Read> MzMLReader<R> {
    /// Create a new [`MzMLReader`] instance, wrapping the [`io::Read`] handle provided
    /// with an [`io::BufReader`], and parse the document header.
    pub fn new(file: R) -> Result<Self, MzMLParserError> {
        Self::with_buffer_capacity(file, BUFFER_SIZE)
    }

    pub fn with_buffer_capacity(file: R, capacity: usize) -> Result<Self, MzMLParserError> {
        let mut handle = Reader::from_reader(BufReader::with_capacity(capacity, file));
        handle.trim_text(true);
        let mut inst = Self {
            handle,
            state: MzMLParserState::Start,
            buffer: Bytes::new(),
            document: MzMLDocument::default(),
            reference_param_groups: HashMap::new(),
            spectrum_counter: 0,
        };
        inst.parse_header()?;
        Ok(inst)
    }

    /// Whether the input was wrapped in `<indexedmzML>`
    pub fn is_indexed(&self) -> bool {
        self.document.indexed
    }

    /// The document surrounding the spectra. The trailer is only populated once every
    /// spectrum has been read.
    pub fn document(&self) -> &MzMLDocument {
        &self.document
    }

    pub fn into_document(self) -> MzMLDocument {
        self.document
    }

    /// The parameters of each `referenceableParamGroup`, by `id`
    pub fn reference_param_groups(&self) -> &HashMap<String, ParamList> {
        &self.reference_param_groups
    }

    fn read_event<'b>(&mut self, buffer: &'b mut Bytes) -> Result<Event<'b>, MzMLParserError> {
        match self.handle.read_event_into(buffer) {
            Ok(event) => Ok(event),
            Err(e) => Err(self.handle_xml_error(e, self.state)),
        }
    }

    fn parse_header(&mut self) -> Result<(), MzMLParserError> {
        let mut buffer = mem::take(&mut self.buffer);
        let mut current_group: Option<(String, ParamList)> = None;
        self.state = MzMLParserState::Header;

        enum Next {
            Continue,
            Spectra,
            Trailer,
        }

        loop {
            buffer.clear();
            let event = self.read_event(&mut buffer)?;
            let state = self.state;
            let mut keep = true;
            let next = match &event {
                Event::Start(e) | Event::Empty(e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.name().as_ref() {
                        b"indexedmzML" => {
                            self.document.indexed = true;
                            Next::Continue
                        }
                        b"referenceableParamGroupList" => {
                            if !is_empty {
                                self.state = MzMLParserState::ReferenceParamGroupList;
                            }
                            Next::Continue
                        }
                        b"referenceableParamGroup" => {
                            let id = attribute_value(e, b"id", state)?.unwrap_or_default();
                            if is_empty {
                                self.reference_param_groups.insert(id, ParamList::new());
                            } else {
                                current_group = Some((id, ParamList::new()));
                                self.state = MzMLParserState::ReferenceParamGroup;
                            }
                            Next::Continue
                        }
                        b"cvParam" | b"userParam" => {
                            if let Some((_, params)) = current_group.as_mut() {
                                params.push(Self::handle_param(e, state)?);
                            }
                            Next::Continue
                        }
                        b"dataProcessing" => {
                            if self.document.default_data_processing.is_none() {
                                self.document.default_data_processing =
                                    attribute_value(e, b"id", state)?;
                            }
                            Next::Continue
                        }
                        b"spectrumList" => {
                            self.document.spectrum_list = Some(e.clone().into_owned());
                            keep = false;
                            if is_empty {
                                Next::Trailer
                            } else {
                                Next::Spectra
                            }
                        }
                        b"chromatogramList" => Next::Trailer,
                        _ => Next::Continue,
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"referenceableParamGroup" => {
                        if let Some((id, params)) = current_group.take() {
                            trace!("Read param group {id} with {} params", params.len());
                            self.reference_param_groups.insert(id, params);
                        }
                        self.state = MzMLParserState::ReferenceParamGroupList;
                        Next::Continue
                    }
                    b"referenceableParamGroupList" => {
                        self.state = MzMLParserState::Header;
                        Next::Continue
                    }
                    b"run" => Next::Trailer,
                    _ => Next::Continue,
                },
                Event::Eof => {
                    return Err(MzMLParserError::IncompleteDocument(self.state));
                }
                _ => Next::Continue,
            };
            match next {
                Next::Continue => {
                    if keep {
                        self.document.header.push(event.into_owned());
                    }
                }
                Next::Spectra => {
                    self.state = MzMLParserState::SpectrumList;
                    break;
                }
                Next::Trailer => {
                    if keep {
                        self.document.trailer.push(event.into_owned());
                    }
                    self.state = MzMLParserState::SpectrumListDone;
                    break;
                }
            }
        }
        self.buffer = buffer;
        if self.state == MzMLParserState::SpectrumListDone {
            self.parse_trailer()?;
        }
        Ok(())
    }

    fn parse_trailer(&mut self) -> Result<(), MzMLParserError> {
        let mut buffer = mem::take(&mut self.buffer);
        self.state = MzMLParserState::Trailer;
        let mut skip_depth = 0usize;
        loop {
            buffer.clear();
            let event = self.read_event(&mut buffer)?;
            let keep = match &event {
                Event::Eof => break,
                Event::Start(_) if skip_depth > 0 => {
                    skip_depth += 1;
                    false
                }
                Event::End(_) if skip_depth > 0 => {
                    skip_depth -= 1;
                    if skip_depth == 0 {
                        self.state = MzMLParserState::Trailer;
                    }
                    false
                }
                _ if skip_depth > 0 => false,
                Event::Start(e)
                    if matches!(
                        e.name().as_ref(),
                        b"indexList" | b"indexListOffset" | b"fileChecksum"
                    ) =>
                {
                    self.state = MzMLParserState::Index;
                    skip_depth = 1;
                    false
                }
                Event::Empty(e)
                    if matches!(
                        e.name().as_ref(),
                        b"indexList" | b"indexListOffset" | b"fileChecksum"
                    ) =>
                {
                    false
                }
                Event::End(e) if e.name().as_ref() == b"indexedmzML" => false,
                _ => true,
            };
            if keep {
                self.document.trailer.push(event.into_owned());
            }
        }
        self.buffer = buffer;
        self.state = MzMLParserState::EOF;
        Ok(())
    }

    fn parse_next_spectrum(&mut self) -> Result<Option<Spectrum>, MzMLParserError> {
        let mut buffer = mem::take(&mut self.buffer);
        let mut builder: Option<SpectrumBuilder> = None;
        loop {
            buffer.clear();
            let event = self.read_event(&mut buffer)?;
            match builder.as_mut() {
                None => match &event {
                    Event::Start(e) if e.name().as_ref() == b"spectrum" => {
                        trace!("Starting spectrum {}", self.spectrum_counter);
                        builder = Some(SpectrumBuilder::new(
                            e.clone().into_owned(),
                            self.spectrum_counter,
                        )?);
                        self.state = MzMLParserState::Spectrum;
                    }
                    Event::End(e) if e.name().as_ref() == b"spectrumList" => {
                        self.state = MzMLParserState::SpectrumListDone;
                        break;
                    }
                    Event::Eof => return Err(MzMLParserError::IncompleteDocument(self.state)),
                    _ => {}
                },
                Some(current) => {
                    if current.handle_event(event, &self.reference_param_groups)? {
                        self.state = MzMLParserState::SpectrumList;
                        break;
                    }
                    self.state = current.state();
                }
            }
        }
        self.buffer = buffer;
        match builder {
            Some(builder) => {
                self.spectrum_counter += 1;
                Ok(Some(builder.into_spectrum()))
            }
            None => {
                self.parse_trailer()?;
                Ok(None)
            }
        }
    }

    /// Read the next spectrum, or `None` once the spectrum list is exhausted
    pub fn read_next(&mut self) -> Result<Option<Spectrum>, MzMLParserError> {
        match self.state {
            MzMLParserState::ParserError => {
                warn!("Attempting to read past an earlier parser error");
                return Ok(None);
            }
            state if state >= MzMLParserState::SpectrumListDone => return Ok(None),
            _ => {}
        }
        match self.parse_next_spectrum() {
            Ok(spectrum) => Ok(spectrum),
            Err(err) => {
                log::error!("Error while reading mzML spectrum: {err}");
                self.state = MzMLParserState::ParserError;
                Err(err)
            }
        }
    }
}

impl<R: Read> SpectrumSource for MzMLReader<R> {
    type Error = MzMLParserError;

    fn pull_next_spectrum(&mut self) -> Result<Option<Spectrum>, Self::Error> {
        self.read_next()
    }
}

impl<R: Read> Iterator for MzMLReader<R> {
    type Item = Result<Spectrum, MzMLParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// Read every remaining spectrum from `reader`, returning the smallest and largest m/z
/// over all MS1 spectra, or `None` if there were no MS1 m/z values.
pub fn scan_mz_range<S: SpectrumSource>(reader: &mut S) -> Result<Option<(f64, f64)>, S::Error> {
    let mut range: Option<(f64, f64)> = None;
    while let Some(spectrum) = reader.pull_next_spectrum()? {
        if spectrum.ms_level != 1 {
            continue;
        }
        let Ok(mzs) = spectrum.mzs() else {
            continue;
        };
        for mz in mzs.iter().copied().filter(|v| v.is_finite()) {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(mz), hi.max(mz)),
                None => (mz, mz),
            });
        }
    }
    Ok(range)
}
