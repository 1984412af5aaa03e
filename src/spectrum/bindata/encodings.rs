use std::{fmt::Display, io};

use thiserror::{self, Error};

use crate::params::{ControlledVocabulary, Param, ParamLike, Unit};

pub type Bytes = Vec<u8>;

/// The kinds of data arrays found in mass spectrometry data files governed
/// by the PSI-MS controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Hash, Eq, PartialOrd, Ord, Default)]
pub enum ArrayType {
    #[default]
    Unknown,
    MZArray,
    IntensityArray,
    ChargeArray,
    SignalToNoiseArray,
    TimeArray,
    WavelengthArray,
    IonMobilityArray,
    MeanIonMobilityArray,
    BaselineArray,
    ResolutionArray,
    NonStandardDataArray { name: Box<String> },
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ArrayType {
    /// Create a [`ArrayType::NonStandardDataArray`] with the provided name.
    pub fn nonstandard<S: ToString>(name: S) -> ArrayType {
        ArrayType::NonStandardDataArray {
            name: Box::new(name.to_string()),
        }
    }

    /// The unit this kind of array is written with when none was recorded
    pub const fn default_unit(&self) -> Unit {
        match self {
            ArrayType::MZArray => Unit::MZ,
            ArrayType::IntensityArray => Unit::DetectorCounts,
            ArrayType::TimeArray => Unit::Minute,
            _ => Unit::Unknown,
        }
    }

    /// The width an array of this kind is stored at when none was recorded
    pub const fn preferred_dtype(&self) -> BinaryDataArrayType {
        match self {
            ArrayType::IntensityArray | ArrayType::SignalToNoiseArray => {
                BinaryDataArrayType::Float32
            }
            ArrayType::ChargeArray => BinaryDataArrayType::Int32,
            _ => BinaryDataArrayType::Float64,
        }
    }

    /// Create a [`Param`] naming this array type.
    ///
    /// If a unit is provided, that unit will be specified, otherwise a default unit may
    /// be used instead. [`ArrayType::Unknown`] has no controlled name and yields a `userParam`.
    pub fn as_param(&self, unit: Option<Unit>) -> Param {
        const CV: ControlledVocabulary = ControlledVocabulary::MS;
        let unit = unit
            .filter(|u| !matches!(u, Unit::Unknown))
            .unwrap_or_else(|| self.default_unit());
        let param = match self {
            ArrayType::MZArray => CV.param("MS:1000514", "m/z array"),
            ArrayType::IntensityArray => CV.param("MS:1000515", "intensity array"),
            ArrayType::ChargeArray => CV.param("MS:1000516", "charge array"),
            ArrayType::SignalToNoiseArray => CV.param("MS:1000517", "signal to noise array"),
            ArrayType::TimeArray => CV.param("MS:1000595", "time array"),
            ArrayType::WavelengthArray => CV.param("MS:1000617", "wavelength array"),
            ArrayType::IonMobilityArray => CV.param("MS:1002893", "ion mobility array"),
            ArrayType::MeanIonMobilityArray => CV.param("MS:1002816", "mean ion mobility array"),
            ArrayType::BaselineArray => CV.param("MS:1002530", "baseline array"),
            ArrayType::ResolutionArray => CV.param("MS:1002529", "resolution array"),
            ArrayType::NonStandardDataArray { name } => {
                CV.param_val("MS:1000786", "non-standard data array", name.as_str())
            }
            ArrayType::Unknown => Param::new_key_value("unknown array", ""),
        };
        param.with_unit_t(&unit)
    }

    /// Recognize an array type from a controlled vocabulary parameter. The non-standard
    /// data array takes its name from the parameter's value.
    pub fn from_param<P: ParamLike>(param: &P) -> Option<Self> {
        let tp = match param.curie()?.as_str() {
            "MS:1000514" => Self::MZArray,
            "MS:1000515" => Self::IntensityArray,
            "MS:1000516" => Self::ChargeArray,
            "MS:1000517" => Self::SignalToNoiseArray,
            "MS:1000595" => Self::TimeArray,
            "MS:1000617" => Self::WavelengthArray,
            "MS:1002893" | "MS:1002476" => Self::IonMobilityArray,
            "MS:1002816" => Self::MeanIonMobilityArray,
            "MS:1002530" => Self::BaselineArray,
            "MS:1002529" => Self::ResolutionArray,
            "MS:1000786" => Self::nonstandard(param.value()),
            _ => return None,
        };
        Some(tp)
    }
}

/// The canonical primitive data types found in MS data file formats
/// supported by the PSI-MS controlled vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Default)]
pub enum BinaryDataArrayType {
    #[default]
    Unknown,
    Float64,
    Float32,
    Int64,
    Int32,
}

impl Display for BinaryDataArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BinaryDataArrayType {
    /// Get the size in bytes of a single value of this type
    pub const fn size_of(&self) -> usize {
        match self {
            BinaryDataArrayType::Unknown => 1,
            BinaryDataArrayType::Float32 | BinaryDataArrayType::Int32 => 4,
            BinaryDataArrayType::Float64 | BinaryDataArrayType::Int64 => 8,
        }
    }

    pub const fn accession(&self) -> Option<&'static str> {
        match self {
            Self::Float32 => Some("MS:1000521"),
            Self::Float64 => Some("MS:1000523"),
            Self::Int32 => Some("MS:1000519"),
            Self::Int64 => Some("MS:1000522"),
            Self::Unknown => None,
        }
    }

    pub fn as_param(&self) -> Option<Param> {
        let name = match self {
            BinaryDataArrayType::Unknown => return None,
            BinaryDataArrayType::Float64 => "64-bit float",
            BinaryDataArrayType::Float32 => "32-bit float",
            BinaryDataArrayType::Int64 => "64-bit integer",
            BinaryDataArrayType::Int32 => "32-bit integer",
        };
        self.accession()
            .map(|acc| ControlledVocabulary::MS.param(acc, name))
    }

    pub fn from_accession(accession: &str) -> Option<Self> {
        match accession {
            "MS:1000521" => Some(Self::Float32),
            "MS:1000523" => Some(Self::Float64),
            "MS:1000519" => Some(Self::Int32),
            "MS:1000522" => Some(Self::Int64),
            _ => None,
        }
    }

    /// Reduce `value` to the precision this type can store. Casting to an integer type
    /// truncates towards zero and saturates at the type's bounds.
    pub fn reduce_precision(&self, value: f64) -> f64 {
        match self {
            Self::Float32 => value as f32 as f64,
            Self::Int32 => value as i32 as f64,
            Self::Int64 => value as i64 as f64,
            Self::Float64 | Self::Unknown => value,
        }
    }
}

/// The compression and encoding schemes a binary data array may be stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinaryCompressionType {
    #[default]
    NoCompression,
    Zlib,
    NumpressLinear,
    NumpressSLOF,
    NumpressPIC,
    NumpressLinearZlib,
    NumpressSLOFZlib,
    NumpressPICZlib,
    LinearPrediction,
    DeltaPrediction,
}

impl Display for BinaryCompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BinaryCompressionType {
    /// The compression methods this crate can both read and write
    pub const COMPRESSION_METHODS: &'static [Self] = &[
        Self::NoCompression,
        Self::Zlib,
        Self::NumpressLinear,
        Self::NumpressSLOF,
        Self::NumpressPIC,
        Self::NumpressLinearZlib,
        Self::NumpressSLOFZlib,
        Self::NumpressPICZlib,
    ];

    pub const fn accession(&self) -> &'static str {
        match self {
            Self::NoCompression => "MS:1000576",
            Self::Zlib => "MS:1000574",
            Self::NumpressLinear => "MS:1002312",
            Self::NumpressPIC => "MS:1002313",
            Self::NumpressSLOF => "MS:1002314",
            Self::NumpressLinearZlib => "MS:1002746",
            Self::NumpressPICZlib => "MS:1002747",
            Self::NumpressSLOFZlib => "MS:1002748",
            Self::LinearPrediction => "MS:1003090",
            Self::DeltaPrediction => "MS:1003089",
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::NoCompression => "no compression",
            Self::Zlib => "zlib compression",
            Self::NumpressLinear => "MS-Numpress linear prediction compression",
            Self::NumpressPIC => "MS-Numpress positive integer compression",
            Self::NumpressSLOF => "MS-Numpress short logged float compression",
            Self::NumpressLinearZlib => {
                "MS-Numpress linear prediction compression followed by zlib compression"
            }
            Self::NumpressPICZlib => {
                "MS-Numpress positive integer compression followed by zlib compression"
            }
            Self::NumpressSLOFZlib => {
                "MS-Numpress short logged float compression followed by zlib compression"
            }
            Self::LinearPrediction => "truncation, linear prediction and zlib compression",
            Self::DeltaPrediction => "truncation, delta prediction and zlib compression",
        }
    }

    pub fn as_param(&self) -> Param {
        ControlledVocabulary::MS.param(self.accession(), self.name())
    }

    pub fn from_accession(accession: &str) -> Option<Self> {
        let tp = match accession {
            "MS:1000576" => Self::NoCompression,
            "MS:1000574" => Self::Zlib,
            "MS:1002312" => Self::NumpressLinear,
            "MS:1002313" => Self::NumpressPIC,
            "MS:1002314" => Self::NumpressSLOF,
            "MS:1002746" => Self::NumpressLinearZlib,
            "MS:1002747" => Self::NumpressPICZlib,
            "MS:1002748" => Self::NumpressSLOFZlib,
            "MS:1003090" => Self::LinearPrediction,
            "MS:1003089" => Self::DeltaPrediction,
            _ => return None,
        };
        Some(tp)
    }

    /// Whether a zlib stream wraps the payload
    pub const fn is_zlib_wrapped(&self) -> bool {
        matches!(
            self,
            Self::Zlib | Self::NumpressLinearZlib | Self::NumpressPICZlib | Self::NumpressSLOFZlib
        )
    }

    pub const fn is_numpress(&self) -> bool {
        matches!(
            self,
            Self::NumpressLinear
                | Self::NumpressPIC
                | Self::NumpressSLOF
                | Self::NumpressLinearZlib
                | Self::NumpressPICZlib
                | Self::NumpressSLOFZlib
        )
    }

    /// Whether a round trip through this scheme reproduces the input exactly
    pub const fn is_lossless(&self) -> bool {
        matches!(self, Self::NoCompression | Self::Zlib)
    }

    /// The largest absolute error a decode-after-encode round trip of `data`
    /// can introduce under this scheme, not counting precision lost to the
    /// array's data type.
    ///
    /// The bound holds for every array the scheme accepts. [`codec::encode`](super::codec::encode)
    /// refuses the others with [`ArrayRetrievalError::NumpressOutOfRange`].
    ///
    /// For short logged float compression the bound is derived from the
    /// relative error on `x + 1` at the chosen fixed point, taken at the
    /// largest value in `data`.
    pub fn error_bound(&self, data: &[f64]) -> f64 {
        match self {
            Self::NoCompression | Self::Zlib => 0.0,
            Self::NumpressLinear | Self::NumpressLinearZlib => {
                let fp = numpress::optimal_scaling(data);
                if !(fp.is_finite() && fp > 0.0) {
                    0.0
                } else if data.iter().any(|v| *v < 0.0) {
                    // `x * fp + 0.5` truncates towards zero, which rounds negative values up
                    1.5 / fp
                } else {
                    0.5 / fp
                }
            }
            Self::NumpressPIC | Self::NumpressPICZlib => 0.5,
            Self::NumpressSLOF | Self::NumpressSLOFZlib => {
                let fp = numpress::optimal_slof_fixed_point(data);
                let max_val = data.iter().copied().fold(0.0f64, f64::max);
                if fp > 0.0 {
                    (max_val + 1.0) * ((0.5 / fp).exp() - 1.0)
                } else {
                    0.0
                }
            }
            Self::LinearPrediction | Self::DeltaPrediction => f64::INFINITY,
        }
    }

    /// Parse the short names used in filter specifications, like `zlib` or `numpress-pic`.
    ///
    /// `pic` is the short logged scheme (MS-Numpress short logged float, MS:1002314). The
    /// MS-Numpress positive integer scheme (MS:1002313) is named `positive-integer`.
    pub fn from_short_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let name = name.strip_prefix("numpress-").unwrap_or(&name);
        let tp = match name {
            "none" | "no" => Self::NoCompression,
            "zlib" => Self::Zlib,
            "linear" => Self::NumpressLinear,
            "pic" | "slof" | "short-logged" => Self::NumpressSLOF,
            "positive-integer" => Self::NumpressPIC,
            "linear-zlib" | "linear+zlib" => Self::NumpressLinearZlib,
            "pic-zlib" | "pic+zlib" | "slof-zlib" | "slof+zlib" => Self::NumpressSLOFZlib,
            "positive-integer-zlib" | "positive-integer+zlib" => Self::NumpressPICZlib,
            _ => return None,
        };
        Some(tp)
    }
}

/// Errors raised while decoding or encoding a binary data array. Every variant other
/// than `NotFound` and `NumpressOutOfRange` means the bytes do not match their declared
/// encoding, a corrupt stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArrayRetrievalError {
    #[error("Array type {0:?} not found")]
    NotFound(ArrayType),
    #[error("An error occurred while decompressing: {0}")]
    DecompressionError(String),
    #[error("{length} bytes is not a multiple of the {width}-byte data type")]
    DataTypeSizeMismatch { length: usize, width: usize },
    #[error("The data type of the array is not specified")]
    UnknownDataType,
    #[error("Numpress payload is truncated: {0}")]
    NumpressTruncated(String),
    #[error("Compression method {0} is not supported")]
    UnsupportedCompression(BinaryCompressionType),
    #[error("{compression} cannot hold these values within its error bound: {reason}")]
    NumpressOutOfRange {
        compression: BinaryCompressionType,
        reason: String,
    },
}

impl ArrayRetrievalError {
    /// Whether this error means the encoded bytes are unreadable
    pub fn is_corrupt_stream(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::NumpressOutOfRange { .. })
    }
}

impl From<numpress::Error> for ArrayRetrievalError {
    fn from(value: numpress::Error) -> Self {
        match value.kind() {
            numpress::ErrorKind::CorruptInputData => {
                ArrayRetrievalError::NumpressTruncated("corrupt input data".to_string())
            }
            numpress::ErrorKind::OverflowError | numpress::ErrorKind::OutOfRange => {
                ArrayRetrievalError::NumpressOutOfRange {
                    compression: BinaryCompressionType::NumpressLinear,
                    reason: "a residual does not fit in a 32-bit integer".to_string(),
                }
            }
        }
    }
}

impl From<ArrayRetrievalError> for io::Error {
    fn from(value: ArrayRetrievalError) -> Self {
        match value {
            ArrayRetrievalError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, value),
            value => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}
