use std::fmt::Debug;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::mem;

use log::{debug, trace};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Error as XMLError;
use quick_xml::Writer;
use thiserror::Error;

use crate::filter::FilterSpec;
use crate::params::{ControlledVocabulary, Param, ParamLike, Unit};
use crate::spectrum::bindata::Bytes;
use crate::spectrum::spectrum_types::PassThroughMarkup;
use crate::spectrum::{
    ArrayRetrievalError, BinaryArrayMap, BinaryCompressionType, RetentionTime, Spectrum,
};

use super::super::offset_index::OffsetIndex;
use super::super::traits::SpectrumWriter;
use super::super::utils::{ByteCounter, CountingStream, HashingStream};
use super::reader::MzMLDocument;

const BUFFER_SIZE: usize = 10000;

/// The `id` of the `<software>` entry describing this program
pub const SOFTWARE_ID: &str = "mzfilter";

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let value: &str = &$value;
        $elt.push_attribute(($name, value));
    };
}

macro_rules! start_event {
    ($writer:expr, $target:ident) => {
        $writer.write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($writer:expr, $target:ident) => {
        $writer.write_event(Event::End($target.to_end()))?;
    };
}

#[derive(Debug, Error)]
pub enum MzMLWriterError {
    #[error("An XML error occurred: {0}")]
    XMLError(#[from] XMLError),
    #[error("An IO error occurred: {0}")]
    IOError(#[from] io::Error),
    #[error("Failed to encode a data array of spectrum {id}: {source}")]
    ArrayEncodingError {
        id: String,
        #[source]
        source: ArrayRetrievalError,
    },
    #[error("Cannot transition from {from_state:?} to {to_state:?}")]
    StateTransitionError {
        from_state: MzMLWriterState,
        to_state: MzMLWriterState,
    },
    #[error("Cannot perform that action in {0:?}")]
    InvalidActionError(MzMLWriterState),
}

impl From<MzMLWriterError> for io::Error {
    fn from(value: MzMLWriterError) -> Self {
        match value {
            MzMLWriterError::IOError(e) => e,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

pub type WriterResult = Result<(), MzMLWriterError>;

/**
The different states that [`MzMLWriter`] can enter while
writing an mzML document. This is only necessary for the module
consumer when determining where something may have gone wrong.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub enum MzMLWriterState {
    Start,
    SpectrumList,
    Header,
    SpectrumListClosed,
    Trailer,
    IndexList,
    End,
}

/// Read the unescaped value of attribute `key` of `tag`
fn attribute_of(tag: &BytesStart, key: &[u8]) -> Result<Option<String>, XMLError> {
    for attr in tag.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Copy `tag`, replacing the values of the listed attributes in place and appending any
/// that were missing
fn with_attributes(
    tag: &BytesStart,
    replacements: &[(&str, &str)],
) -> Result<BytesStart<'static>, XMLError> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut seen = vec![false; replacements.len()];
    for attr in tag.attributes() {
        let attr = attr?;
        match replacements
            .iter()
            .position(|(k, _)| k.as_bytes() == attr.key.as_ref())
        {
            Some(i) => {
                seen[i] = true;
                out.push_attribute(replacements[i]);
            }
            None => out.push_attribute(attr),
        }
    }
    for (pair, seen) in replacements.iter().zip(seen) {
        if !seen {
            out.push_attribute(*pair);
        }
    }
    Ok(out)
}

fn is_scan_start_time(tag: &BytesStart) -> bool {
    matches!(attribute_of(tag, b"accession"), Ok(Some(acc)) if acc == "MS:1000016")
}

fn scan_start_time_param(rt: &RetentionTime) -> Param {
    ControlledVocabulary::MS
        .param_val("MS:1000016", "scan start time", rt.value)
        .with_unit_t(&rt.unit)
}

struct InnerXMLWriter<W: Write + ByteCounter> {
    pub handle: Writer<W>,
}

impl<W: Write + ByteCounter> Debug for InnerXMLWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerXMLWriter")
            .field("handle", &"...")
            .finish()
    }
}

impl<W: Write + ByteCounter> InnerXMLWriter<W> {
    pub fn new(stream: W) -> InnerXMLWriter<W> {
        Self {
            handle: Writer::new_with_indent(stream, b' ', 2),
        }
    }

    /// The number of bytes written so far
    pub fn position(&mut self) -> u64 {
        self.handle.get_mut().bytes_written()
    }

    pub fn write_event<'a, E: AsRef<Event<'a>>>(&mut self, event: E) -> WriterResult {
        self.handle.write_event(event)?;
        Ok(())
    }

    /// Write `tag` as a start tag, returning the offset of its opening `<`
    pub fn write_start(&mut self, tag: &BytesStart) -> Result<u64, MzMLWriterError> {
        self.write_event(Event::Start(tag.borrow()))?;
        Ok(self.position() - (tag.len() as u64 + 2))
    }

    pub fn write_text_element(&mut self, name: &str, text: &str) -> WriterResult {
        let tag = BytesStart::new(name);
        start_event!(self, tag);
        self.write_event(Event::Text(BytesText::new(text)))?;
        end_event!(self, tag);
        Ok(())
    }

    pub fn write_param<P: ParamLike>(&mut self, param: &P) -> WriterResult {
        let mut elt = match param.curie() {
            Some(accession) => {
                let mut elt = bstart!("cvParam");
                if let Some(cv_ref) = param.controlled_vocabulary() {
                    attrib!("cvRef", cv_ref.prefix(), elt);
                }
                attrib!("accession", accession, elt);
                elt
            }
            None => bstart!("userParam"),
        };

        attrib!("name", param.name(), elt);
        if !param.value().is_empty() {
            attrib!("value", param.value(), elt);
        }
        match param.unit() {
            Unit::Unknown => {}
            unit => {
                let (unit_acc, unit_name) = unit.for_param();
                let prefix = unit_acc.split(':').next().unwrap_or("UO");
                attrib!("unitCvRef", prefix, elt);
                attrib!("unitAccession", unit_acc, elt);
                attrib!("unitName", unit_name, elt);
            }
        }
        self.write_event(Event::Empty(elt))
    }

    fn write_index(&mut self, index: &OffsetIndex) -> WriterResult {
        let mut outer = bstart!("index");
        attrib!("name", index.name, outer);
        start_event!(self, outer);
        for (id, offset) in index.iter() {
            let mut tag = bstart!("offset");
            attrib!("idRef", id, tag);
            start_event!(self, tag);
            let content = offset.to_string();
            self.write_event(Event::Text(BytesText::new(&content)))?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_binary_data_arrays(
        &mut self,
        arrays: &BinaryArrayMap,
        encoded: &[(BinaryCompressionType, Bytes)],
    ) -> WriterResult {
        let mut outer = bstart!("binaryDataArrayList");
        attrib!("count", arrays.len().to_string(), outer);
        start_event!(self, outer);
        let default_length = arrays.default_length();
        for ((_, array), (compression, bytes)) in arrays.iter().zip(encoded) {
            let text = base64_simd::STANDARD.encode_type::<String>(bytes);
            let mut tag = bstart!("binaryDataArray");
            attrib!("encodedLength", text.len().to_string(), tag);
            if array.len() != default_length {
                attrib!("arrayLength", array.len().to_string(), tag);
            }
            if let Some(reference) = array.data_processing_reference.as_deref() {
                attrib!("dataProcessingRef", reference, tag);
            }
            start_event!(self, tag);
            if let Some(param) = array.dtype.as_param() {
                self.write_param(&param)?;
            }
            self.write_param(&compression.as_param())?;
            self.write_param(&array.name.as_param(Some(array.unit)))?;
            if let Some(params) = array.params.as_deref() {
                for param in params.iter() {
                    self.write_param(param)?;
                }
            }
            self.write_text_element("binary", &text)?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    /// Replay the markup of a spectrum read from a file, updating its scan start time and
    /// regenerating its data arrays.
    ///
    /// A param group reference that supplied the scan start time is expanded in place, so the
    /// group's time in its original unit does not contradict the rewritten one.
    fn write_markup_body(
        &mut self,
        spectrum: &Spectrum,
        markup: &PassThroughMarkup,
        encoded: &[(BinaryCompressionType, Bytes)],
    ) -> WriterResult {
        let rt_param = spectrum.retention_time.as_ref().map(scan_start_time_param);
        let mut rt_done = false;
        for (i, event) in markup.body.iter().enumerate() {
            if i == markup.arrays_at {
                self.write_binary_data_arrays(&spectrum.arrays, encoded)?;
            }
            match (event, markup.scan_time_group.as_ref()) {
                (Event::Empty(_), Some((at, group))) if *at == i && !rt_done => {
                    for param in group.iter() {
                        match rt_param.as_ref() {
                            Some(rt) if param.is_term("MS:1000016") => self.write_param(rt)?,
                            _ => self.write_param(param)?,
                        }
                    }
                    rt_done = true;
                    continue;
                }
                _ => {}
            }
            match event {
                Event::Empty(e)
                    if !rt_done && e.name().as_ref() == b"cvParam" && is_scan_start_time(e) =>
                {
                    if let Some(param) = rt_param.as_ref() {
                        self.write_param(param)?;
                    }
                    rt_done = true;
                }
                Event::End(e) if !rt_done && e.name().as_ref() == b"scan" => {
                    if let Some(param) = rt_param.as_ref() {
                        self.write_param(param)?;
                    }
                    rt_done = true;
                    self.write_event(event)?;
                }
                _ => self.write_event(event)?,
            }
        }
        if markup.arrays_at >= markup.body.len() {
            self.write_binary_data_arrays(&spectrum.arrays, encoded)?;
        }
        Ok(())
    }

    /// Describe a spectrum that was built in memory rather than read from a file
    fn write_synthesized_body(
        &mut self,
        spectrum: &Spectrum,
        encoded: &[(BinaryCompressionType, Bytes)],
    ) -> WriterResult {
        let cv = ControlledVocabulary::MS;
        self.write_param(&cv.param_val("MS:1000511", "ms level", spectrum.ms_level))?;
        if spectrum.ms_level == 1 {
            self.write_param(&cv.param("MS:1000579", "MS1 spectrum"))?;
        } else {
            self.write_param(&cv.param("MS:1000580", "MSn spectrum"))?;
        }
        for param in spectrum.params.iter().filter(|p| {
            !(p.is_term("MS:1000511") || p.is_term("MS:1000579") || p.is_term("MS:1000580"))
        }) {
            self.write_param(param)?;
        }

        if let Some(rt) = spectrum.retention_time.as_ref() {
            let mut scan_list = bstart!("scanList");
            attrib!("count", "1", scan_list);
            start_event!(self, scan_list);
            self.write_param(&cv.param("MS:1000795", "no combination"))?;
            let scan = bstart!("scan");
            start_event!(self, scan);
            self.write_param(&scan_start_time_param(rt))?;
            end_event!(self, scan);
            end_event!(self, scan_list);
        }
        self.write_binary_data_arrays(&spectrum.arrays, encoded)
    }

    /// Write one `<spectrum>` element at output position `ordinal`, returning the offset of
    /// its start tag
    fn write_spectrum(
        &mut self,
        spectrum: &Spectrum,
        ordinal: u64,
    ) -> Result<u64, MzMLWriterError> {
        let encoded = spectrum.arrays.encode_all_arrays().map_err(|source| {
            MzMLWriterError::ArrayEncodingError {
                id: spectrum.id.clone(),
                source,
            }
        })?;
        let index = ordinal.to_string();
        let default_length = spectrum.arrays.default_length().to_string();
        let tag = match &spectrum.markup {
            Some(markup) => with_attributes(
                &markup.start,
                &[
                    ("index", &index),
                    ("id", &spectrum.id),
                    ("defaultArrayLength", &default_length),
                ],
            )?,
            None => {
                let mut tag = bstart!("spectrum");
                attrib!("index", index, tag);
                attrib!("id", spectrum.id, tag);
                attrib!("defaultArrayLength", default_length, tag);
                tag
            }
        };
        let offset = self.write_start(&tag)?;
        match &spectrum.markup {
            Some(markup) => self.write_markup_body(spectrum, markup, &encoded)?,
            None => self.write_synthesized_body(spectrum, &encoded)?,
        }
        end_event!(self, tag);
        Ok(offset)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.handle.get_mut().flush()
    }
}

/**
An mzML writer that places spectra inside the document described by an [`MzMLDocument`],
usually the one they were read from.

Spectra are serialized as they are pushed to an anonymous temporary file, so that the
`<spectrumList>` can be given its final `count` when the writer is closed. On
[`MzMLWriter::close`] the header, the spooled spectra and the trailer are written in order,
followed by a fresh offset index and SHA-1 checksum if the document is indexed.
*/
#[derive(Debug)]
pub struct MzMLWriter<W: Write> {
    handle: InnerXMLWriter<HashingStream<BufWriter<W>>>,
    spool: Option<InnerXMLWriter<CountingStream<BufWriter<File>>>>,
    document: MzMLDocument,
    processing: Option<Vec<FilterSpec>>,

    /// The number of spectra written so far. This value will appear in the
    /// `spectrumList` element's count attribute
    pub spectrum_count: u64,
    pub spectrum_offsets: OffsetIndex,
    pub chromatogram_offsets: OffsetIndex,
    pub state: MzMLWriterState,
}

impl<W: Write> MzMLWriter<W> {
    pub fn new(file: W, document: MzMLDocument) -> Result<Self, MzMLWriterError> {
        let spool = tempfile::tempfile()?;
        Ok(Self {
            handle: InnerXMLWriter::new(HashingStream::new(BufWriter::with_capacity(
                BUFFER_SIZE,
                file,
            ))),
            spool: Some(InnerXMLWriter::new(CountingStream::new(
                BufWriter::with_capacity(BUFFER_SIZE, spool),
            ))),
            document,
            processing: None,
            spectrum_count: 0,
            spectrum_offsets: OffsetIndex::new("spectrum".into()),
            chromatogram_offsets: OffsetIndex::new("chromatogram".into()),
            state: MzMLWriterState::Start,
        })
    }

    /// Record the filters applied to the spectra as a processing step of every
    /// `<dataProcessing>` in the header
    pub fn with_processing(mut self, specs: &[FilterSpec]) -> Self {
        self.processing = Some(specs.to_vec());
        self
    }

    /// Replace the events written after the spectrum list. Readers only learn the trailer
    /// once their last spectrum is read, after the writer was created.
    pub fn set_trailer(&mut self, trailer: Vec<Event<'static>>) {
        self.document.trailer = trailer;
    }

    pub fn document(&self) -> &MzMLDocument {
        &self.document
    }

    /// Serialize `spectrum` at the next output position
    pub fn write_spectrum(&mut self, spectrum: &Spectrum) -> WriterResult {
        if self.state > MzMLWriterState::SpectrumList {
            return Err(MzMLWriterError::InvalidActionError(self.state));
        }
        let spool = self
            .spool
            .as_mut()
            .ok_or(MzMLWriterError::InvalidActionError(self.state))?;
        self.state = MzMLWriterState::SpectrumList;
        let offset = spool.write_spectrum(spectrum, self.spectrum_count)?;
        trace!("Spooled {} at {offset}", spectrum.id);
        self.spectrum_offsets.insert(spectrum.id.as_str(), offset);
        self.spectrum_count += 1;
        Ok(())
    }

    fn write_software(&mut self) -> WriterResult {
        let mut tag = bstart!("software");
        attrib!("id", SOFTWARE_ID, tag);
        attrib!("version", env!("CARGO_PKG_VERSION"), tag);
        start_event!(self.handle, tag);
        self.handle.write_param(&ControlledVocabulary::MS.param_val(
            "MS:1000799",
            "custom unreleased software tool",
            SOFTWARE_ID,
        ))?;
        end_event!(self.handle, tag);
        Ok(())
    }

    fn write_processing_method(&mut self, order: i64) -> WriterResult {
        let specs = self.processing.clone().unwrap_or_default();
        let mut tag = bstart!("processingMethod");
        attrib!("order", order.to_string(), tag);
        attrib!("softwareRef", SOFTWARE_ID, tag);
        start_event!(self.handle, tag);
        self.handle
            .write_param(&ControlledVocabulary::MS.param("MS:1001486", "data filtering"))?;
        for spec in specs.iter() {
            self.handle.write_param(&Param::new_key_value(
                spec.name.as_str(),
                spec.args.join(","),
            ))?;
        }
        end_event!(self.handle, tag);
        Ok(())
    }

    fn write_header(&mut self) -> WriterResult {
        self.state = MzMLWriterState::Header;
        let header = mem::take(&mut self.document.header);
        let annotate = self.processing.is_some();
        let add_software = annotate
            && !header.iter().any(|e| {
                matches!(e, Event::Start(t) | Event::Empty(t)
                    if t.name().as_ref() == b"software"
                        && matches!(attribute_of(t, b"id"), Ok(Some(id)) if id == SOFTWARE_ID))
            });
        let mut max_order: Option<i64> = None;

        for event in header.iter() {
            match event {
                Event::Start(e) | Event::Empty(e)
                    if add_software && e.name().as_ref() == b"softwareList" =>
                {
                    let count = attribute_of(e, b"count")?
                        .and_then(|c| c.parse::<u64>().ok())
                        .unwrap_or_default()
                        + 1;
                    let tag = with_attributes(e, &[("count", &count.to_string())])?;
                    start_event!(self.handle, tag);
                    if matches!(event, Event::Empty(_)) {
                        self.write_software()?;
                        end_event!(self.handle, tag);
                    }
                }
                Event::End(e) if add_software && e.name().as_ref() == b"softwareList" => {
                    self.write_software()?;
                    self.handle.write_event(event)?;
                }
                Event::Start(e) if e.name().as_ref() == b"dataProcessing" => {
                    max_order = None;
                    self.handle.write_event(event)?;
                }
                Event::Empty(e) if annotate && e.name().as_ref() == b"dataProcessing" => {
                    let tag = e.clone();
                    start_event!(self.handle, tag);
                    self.write_processing_method(0)?;
                    end_event!(self.handle, tag);
                }
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"processingMethod" => {
                    if let Some(order) =
                        attribute_of(e, b"order")?.and_then(|o| o.parse::<i64>().ok())
                    {
                        max_order = Some(max_order.map_or(order, |m| m.max(order)));
                    }
                    self.handle.write_event(event)?;
                }
                Event::End(e) if annotate && e.name().as_ref() == b"dataProcessing" => {
                    self.write_processing_method(max_order.map_or(0, |m| m + 1))?;
                    self.handle.write_event(event)?;
                }
                _ => self.handle.write_event(event)?,
            }
        }
        self.document.header = header;
        Ok(())
    }

    fn write_spectrum_list(&mut self) -> WriterResult {
        let count = self.spectrum_count.to_string();
        let tag = match self.document.spectrum_list.as_ref() {
            Some(tag) => with_attributes(tag, &[("count", &count)])?,
            None => {
                let mut tag = bstart!("spectrumList");
                attrib!("count", count, tag);
                if let Some(dp) = self.document.default_data_processing.as_deref() {
                    attrib!("defaultDataProcessingRef", dp, tag);
                }
                tag
            }
        };
        start_event!(self.handle, tag);

        let spool = self
            .spool
            .take()
            .ok_or(MzMLWriterError::InvalidActionError(self.state))?;
        let mut file = spool
            .handle
            .into_inner()
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())?;
        if self.spectrum_count > 0 {
            self.handle.handle.get_mut().write_all(b"\n")?;
            let base = self.handle.position();
            file.seek(SeekFrom::Start(0))?;
            let copied = io::copy(&mut file, self.handle.handle.get_mut())?;
            debug!("Copied {copied} bytes of spectra starting at {base}");
            self.spectrum_offsets.shift(base);
        }
        end_event!(self.handle, tag);
        self.state = MzMLWriterState::SpectrumListClosed;
        Ok(())
    }

    fn write_trailer(&mut self) -> WriterResult {
        self.state = MzMLWriterState::Trailer;
        let trailer = mem::take(&mut self.document.trailer);
        if trailer.is_empty() {
            debug!("No trailer was provided, closing the run");
            let run = bstart!("run");
            end_event!(self.handle, run);
            let mzml = bstart!("mzML");
            end_event!(self.handle, mzml);
        }
        for event in trailer.iter() {
            match event {
                Event::Start(e) if e.name().as_ref() == b"chromatogram" => {
                    let offset = self.handle.write_start(e)?;
                    if let Some(id) = attribute_of(e, b"id")? {
                        self.chromatogram_offsets.insert(id, offset);
                    }
                }
                _ => self.handle.write_event(event)?,
            }
        }
        self.document.trailer = trailer;
        Ok(())
    }

    fn write_index_list(&mut self) -> WriterResult {
        self.state = MzMLWriterState::IndexList;
        let indices: Vec<&OffsetIndex> = [&self.spectrum_offsets, &self.chromatogram_offsets]
            .into_iter()
            .filter(|index| !index.is_empty())
            .collect();
        let mut outer = bstart!("indexList");
        attrib!("count", indices.len().to_string(), outer);
        let offset = self.handle.write_start(&outer)?;
        for index in indices {
            self.handle.write_index(index)?;
        }
        end_event!(self.handle, outer);
        self.handle
            .write_text_element("indexListOffset", &offset.to_string())?;

        let tag = bstart!("fileChecksum");
        start_event!(self.handle, tag);
        let digest = self.handle.handle.get_mut().digest_hex();
        self.handle
            .write_event(Event::Text(BytesText::new(&digest)))?;
        end_event!(self.handle, tag);
        Ok(())
    }

    /**
    Write out the document around the spooled spectra. If the document is indexed, this
    also writes the offset indices and the file checksum at its tail.

    Closing an already closed writer does nothing.
    */
    pub fn close(&mut self) -> WriterResult {
        match self.state {
            MzMLWriterState::End => return Ok(()),
            MzMLWriterState::Start | MzMLWriterState::SpectrumList => {}
            state => {
                return Err(MzMLWriterError::StateTransitionError {
                    from_state: state,
                    to_state: MzMLWriterState::End,
                })
            }
        }
        self.write_header()?;
        self.write_spectrum_list()?;
        self.write_trailer()?;
        if self.document.indexed {
            self.write_index_list()?;
            let tag = bstart!("indexedmzML");
            end_event!(self.handle, tag);
        }
        self.handle.flush()?;
        self.state = MzMLWriterState::End;
        debug!("Closed mzML document with {} spectra", self.spectrum_count);
        Ok(())
    }

    /// Close the writer if it is still open and return the underlying stream
    pub fn into_inner(mut self) -> Result<W, MzMLWriterError> {
        self.close()?;
        let stream = self
            .handle
            .handle
            .into_inner()
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())?;
        Ok(stream)
    }
}

impl MzMLWriter<BufWriter<File>> {
    pub fn create_path<P: AsRef<std::path::Path>>(
        path: P,
        document: MzMLDocument,
    ) -> Result<Self, MzMLWriterError> {
        let handle = BufWriter::new(File::create(path.as_ref())?);
        Self::new(handle, document)
    }
}

impl<W: Write> SpectrumWriter for MzMLWriter<W> {
    type Error = MzMLWriterError;

    fn push_spectrum(&mut self, spectrum: Spectrum) -> Result<(), Self::Error> {
        self.write_spectrum(&spectrum)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        MzMLWriter::close(self)
    }
}
