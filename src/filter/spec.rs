use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::spectrum::{BinaryCompressionType, BinaryDataArrayType};

/// Errors raised while turning filter specification strings into a filter chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterSpecError {
    #[error("Unknown filter {0:?}")]
    UnknownFilter(String),
    #[error("Filter {filter} takes {expected} argument(s), but {found} were given")]
    ArityMismatch {
        filter: String,
        expected: &'static str,
        found: usize,
    },
    #[error("Malformed argument {argument:?} for filter {filter}: {reason}")]
    MalformedArgument {
        filter: String,
        argument: String,
        reason: String,
    },
    #[error("Invalid parameter for filter {filter}: {reason}")]
    InvalidParameter { filter: String, reason: String },
}

impl FilterSpecError {
    /// Whether the specification itself could not be understood, as opposed to naming
    /// parameter values the filter cannot work with
    pub fn is_invalid_spec(&self) -> bool {
        !matches!(self, Self::InvalidParameter { .. })
    }
}

/// The filters that may be named in a specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterName {
    Resample,
    SavitzkyGolay,
    Baseline,
    Index,
    RetentionTime,
    MSLevel,
    Compress,
    ToMinutes,
    Type,
    Electric,
    Float32,
}

impl FilterName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Resample => "resample",
            Self::SavitzkyGolay => "sgolay",
            Self::Baseline => "baseline",
            Self::Index => "index",
            Self::RetentionTime => "rt",
            Self::MSLevel => "mslevel",
            Self::Compress => "compress",
            Self::ToMinutes => "to_minutes",
            Self::Type => "type",
            Self::Electric => "electric",
            Self::Float32 => "f32",
        }
    }

    /// The number of arguments the filter accepts, inclusive
    pub const fn arity(&self) -> (usize, usize) {
        match self {
            Self::Resample => (1, 2),
            Self::SavitzkyGolay => (0, 2),
            Self::Baseline | Self::MSLevel => (1, 1),
            Self::Index | Self::RetentionTime | Self::Compress | Self::Type => (2, 2),
            Self::ToMinutes | Self::Float32 => (0, 0),
            Self::Electric => (0, 1),
        }
    }

    const fn arity_description(&self) -> &'static str {
        match self {
            Self::Resample => "1 or 2",
            Self::SavitzkyGolay => "0 or 2",
            Self::Baseline | Self::MSLevel => "1",
            Self::Index | Self::RetentionTime | Self::Compress | Self::Type => "2",
            Self::ToMinutes | Self::Float32 => "0",
            Self::Electric => "0 or 1",
        }
    }

    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::Electric | Self::Float32)
    }
}

impl Display for FilterName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterName {
    type Err = FilterSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = match s {
            "resample" => Self::Resample,
            "sgolay" => Self::SavitzkyGolay,
            "baseline" => Self::Baseline,
            "index" => Self::Index,
            "rt" => Self::RetentionTime,
            "mslevel" => Self::MSLevel,
            "compress" => Self::Compress,
            "to_minutes" => Self::ToMinutes,
            "type" => Self::Type,
            "electric" => Self::Electric,
            "f32" => Self::Float32,
            _ => return Err(FilterSpecError::UnknownFilter(s.to_string())),
        };
        Ok(name)
    }
}

/// A filter name with its textual arguments, as written `name:arg1,arg2`, or `name`
/// alone when there are no arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub name: FilterName,
    pub args: Vec<String>,
}

impl FilterSpec {
    /// Parse a specification string, checking the filter name and the argument count
    pub fn parse(spec: &str) -> Result<Self, FilterSpecError> {
        let (name, args) = match spec.split_once(':') {
            Some((name, args)) => (name, Some(args)),
            None => (spec, None),
        };
        let name: FilterName = name.trim().parse()?;
        let args: Vec<String> = match args {
            Some(args) if !args.trim().is_empty() => {
                args.split(',').map(|a| a.trim().to_string()).collect()
            }
            _ => Vec::new(),
        };
        let (lo, hi) = name.arity();
        let gap = name == FilterName::SavitzkyGolay && args.len() == 1;
        if args.len() < lo || args.len() > hi || gap {
            return Err(FilterSpecError::ArityMismatch {
                filter: name.to_string(),
                expected: name.arity_description(),
                found: args.len(),
            });
        }
        Ok(Self { name, args })
    }

    /// Parse argument `i` as `T`
    pub fn arg<T: FromStr>(&self, i: usize) -> Result<T, FilterSpecError>
    where
        T::Err: Display,
    {
        let raw = self.args.get(i).map(|s| s.as_str()).unwrap_or_default();
        raw.parse::<T>().map_err(|e| self.malformed(raw, e.to_string()))
    }

    /// Parse argument `i` as `T` if it was given
    pub fn opt_arg<T: FromStr>(&self, i: usize) -> Result<Option<T>, FilterSpecError>
    where
        T::Err: Display,
    {
        if i < self.args.len() {
            self.arg(i).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn compression_arg(&self, i: usize) -> Result<BinaryCompressionType, FilterSpecError> {
        let raw = self.args.get(i).map(|s| s.as_str()).unwrap_or_default();
        BinaryCompressionType::from_short_name(raw)
            .ok_or_else(|| self.malformed(raw, "not a known compression method".to_string()))
    }

    pub fn dtype_arg(&self, i: usize) -> Result<BinaryDataArrayType, FilterSpecError> {
        let raw = self.args.get(i).map(|s| s.as_str()).unwrap_or_default();
        let dtype = match raw.to_ascii_lowercase().as_str() {
            "f32" | "float32" | "32" => BinaryDataArrayType::Float32,
            "f64" | "float64" | "64" => BinaryDataArrayType::Float64,
            "i32" | "int32" => BinaryDataArrayType::Int32,
            "i64" | "int64" => BinaryDataArrayType::Int64,
            _ => return Err(self.malformed(raw, "not a known data type".to_string())),
        };
        Ok(dtype)
    }

    pub fn invalid<S: Into<String>>(&self, reason: S) -> FilterSpecError {
        FilterSpecError::InvalidParameter {
            filter: self.name.to_string(),
            reason: reason.into(),
        }
    }

    fn malformed(&self, argument: &str, reason: String) -> FilterSpecError {
        FilterSpecError::MalformedArgument {
            filter: self.name.to_string(),
            argument: argument.to_string(),
            reason,
        }
    }
}

impl Display for FilterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.args.join(","))
        }
    }
}

impl FromStr for FilterSpec {
    type Err = FilterSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let spec = FilterSpec::parse(" resample : 0.1 , 400 ").unwrap();
        assert_eq!(spec.name, FilterName::Resample);
        assert_eq!(spec.args, vec!["0.1", "400"]);
        assert_eq!(spec.arg::<f64>(0).unwrap(), 0.1);
        assert_eq!(spec.to_string(), "resample:0.1,400");

        let spec = FilterSpec::parse("to_minutes").unwrap();
        assert!(spec.args.is_empty());
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            FilterSpec::parse("smooth:3"),
            Err(FilterSpecError::UnknownFilter("smooth".to_string()))
        );
        assert!(matches!(
            FilterSpec::parse("baseline"),
            Err(FilterSpecError::ArityMismatch { found: 0, .. })
        ));
        assert!(matches!(
            FilterSpec::parse("sgolay:5"),
            Err(FilterSpecError::ArityMismatch { found: 1, .. })
        ));
        let spec = FilterSpec::parse("index:a,4").unwrap();
        let err = spec.arg::<i64>(0).unwrap_err();
        assert!(matches!(err, FilterSpecError::MalformedArgument { .. }));
        assert!(err.is_invalid_spec());
        assert!(!spec.invalid("nope").is_invalid_spec());
    }

    #[test]
    fn test_typed_args() {
        let spec = FilterSpec::parse("compress:numpress-linear,zlib").unwrap();
        assert_eq!(
            spec.compression_arg(0).unwrap(),
            BinaryCompressionType::NumpressLinear
        );
        assert_eq!(spec.compression_arg(1).unwrap(), BinaryCompressionType::Zlib);
        let spec = FilterSpec::parse("type:64,f32").unwrap();
        assert_eq!(spec.dtype_arg(0).unwrap(), BinaryDataArrayType::Float64);
        assert_eq!(spec.dtype_arg(1).unwrap(), BinaryDataArrayType::Float32);
        let spec = FilterSpec::parse("type:f16,f32").unwrap();
        assert!(spec.dtype_arg(0).is_err());
    }
}
