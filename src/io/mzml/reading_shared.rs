use std::io;

use quick_xml::events::BytesStart;
use quick_xml::Error as XMLError;

use thiserror::Error;

use crate::params::{curie_to_num, ControlledVocabulary, Param, Unit};
use crate::spectrum::ArrayRetrievalError;

/**
The different states the [`MzMLReader`](super::MzMLReader) can enter while parsing
different phases of the document. This information is really only
needed by the module consumer to determine where in the document an
error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MzMLParserState {
    Start = 0,

    // Everything ahead of the spectrum list, replayed verbatim
    Header,
    ReferenceParamGroupList,
    ReferenceParamGroup,

    // Spectrum List Elements
    SpectrumList,
    Spectrum,

    BinaryDataArrayList,
    BinaryDataArray,
    Binary,

    ScanList,
    Scan,

    /// Any other element nested within a spectrum
    SpectrumChild,

    SpectrumListDone,

    // Everything after the spectrum list
    Trailer,
    Index,

    EOF,
    ParserError,
}

/**
All the ways that mzML parsing can go wrong
*/
#[derive(Debug, Error)]
pub enum MzMLParserError {
    #[error("An error occurred outside of normal conditions {0:?}")]
    UnknownError(MzMLParserState),
    #[error("An incomplete spectrum was parsed")]
    IncompleteSpectrum,
    #[error("The document ended in {0:?} before it was complete")]
    IncompleteDocument(MzMLParserState),
    #[error("An incomplete element {0} was encountered in {1:?}")]
    IncompleteElementError(String, MzMLParserState),
    #[error("An XML error {1:?} was encountered in {0:?}")]
    XMLError(MzMLParserState, #[source] XMLError),
    #[error("An IO error {1} was encountered in {0:?}")]
    IOError(MzMLParserState, #[source] io::Error),
    #[error("Failed to decode a data array of spectrum {id}: {source}")]
    ArrayDecodingError {
        id: String,
        #[source]
        source: ArrayRetrievalError,
    },
}

impl From<MzMLParserError> for io::Error {
    fn from(value: MzMLParserError) -> Self {
        match value {
            MzMLParserError::IOError(_, ref e) => io::Error::new(e.kind(), value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type ParserResult = Result<MzMLParserState, MzMLParserError>;

/**
Common XML error handling behaviors
*/
pub trait XMLParseBase {
    fn handle_xml_error(&self, error: XMLError, state: MzMLParserState) -> MzMLParserError {
        match error {
            XMLError::Io(e) => MzMLParserError::IOError(
                state,
                io::Error::new(e.kind(), e.to_string()),
            ),
            e => MzMLParserError::XMLError(state, e),
        }
    }
}

/**
Common `cvParam` and `userParam` parsing behaviors
*/
pub trait CVParamParse: XMLParseBase {
    fn handle_param(event: &BytesStart, state: MzMLParserState) -> Result<Param, MzMLParserError> {
        let mut param = Param::new();
        let mut unit_name = None;
        let mut unit_accession = None;

        for attr_parsed in event.attributes() {
            let attr = attr_parsed.map_err(|e| MzMLParserError::XMLError(state, e.into()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| MzMLParserError::XMLError(state, e))?;
            match attr.key.as_ref() {
                b"name" => {
                    param.name = value.to_string();
                }
                b"value" => {
                    param.value = value.to_string();
                }
                b"cvRef" => {
                    param.controlled_vocabulary = value
                        .parse::<ControlledVocabulary>()
                        .ok()
                        .and_then(|cv| cv.as_option());
                }
                b"accession" => {
                    let (cv, acc) = curie_to_num(&value);
                    param.accession = acc;
                    if param.controlled_vocabulary.is_none() {
                        param.controlled_vocabulary = cv;
                    }
                }
                b"unitName" => {
                    unit_name = Some(value.to_string());
                }
                b"unitAccession" => {
                    unit_accession = Some(value.to_string());
                }
                _ => {}
            }
        }

        param.unit = match (unit_accession, unit_name) {
            (Some(acc), name) => match Unit::from_accession(&acc) {
                Unit::Unknown => name.map(|n| Unit::from_name(&n)).unwrap_or_default(),
                unit => unit,
            },
            (None, Some(name)) => Unit::from_name(&name),
            (None, None) => Unit::Unknown,
        };
        Ok(param)
    }
}

/// Read the value of attribute `key` from `event`, if present
pub(crate) fn attribute_value(
    event: &BytesStart,
    key: &[u8],
    state: MzMLParserState,
) -> Result<Option<String>, MzMLParserError> {
    for attr_parsed in event.attributes() {
        let attr = attr_parsed.map_err(|e| MzMLParserError::XMLError(state, e.into()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| MzMLParserError::XMLError(state, e))?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::ParamLike;

    struct ParamReader;
    impl XMLParseBase for ParamReader {}
    impl CVParamParse for ParamReader {}

    #[test]
    fn test_handle_param() {
        let content = r#"cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="2.5" unitCvRef="UO" unitAccession="UO:0000031" unitName="minute""#;
        let event = BytesStart::from_content(content, 7);
        let param = ParamReader::handle_param(&event, MzMLParserState::Scan).unwrap();
        assert_eq!(param.name, "scan start time");
        assert_eq!(param.coerce::<f64>().unwrap(), 2.5);
        assert!(param.is_term("MS:1000016"));
        assert_eq!(param.unit, Unit::Minute);

        let content = r#"userParam name="comment" value="a &amp; b""#;
        let event = BytesStart::from_content(content, 9);
        let param = ParamReader::handle_param(&event, MzMLParserState::Spectrum).unwrap();
        assert_eq!(param.value, "a & b");
        assert!(!param.is_controlled());
    }

    #[test]
    fn test_attribute_value() {
        let event = BytesStart::from_content(r#"spectrum index="3" id="scan=4""#, 8);
        let id = attribute_value(&event, b"id", MzMLParserState::Spectrum).unwrap();
        assert_eq!(id.as_deref(), Some("scan=4"));
        let missing = attribute_value(&event, b"spotID", MzMLParserState::Spectrum).unwrap();
        assert!(missing.is_none());
    }
}
