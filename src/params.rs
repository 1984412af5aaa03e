//! Controlled vocabulary parameters as they appear in mzML `cvParam` and
//! `userParam` elements, and the units those parameters may carry.
use std::borrow::Cow;
use std::fmt::Display;
use std::str::{self, FromStr};

/// Split a CURIE like `MS:1000511` into its vocabulary and accession number.
pub fn curie_to_num(curie: &str) -> (Option<ControlledVocabulary>, Option<u32>) {
    let mut parts = curie.split(':');
    let prefix = parts
        .next()
        .and_then(|v| v.parse::<ControlledVocabulary>().ok())
        .and_then(|cv| cv.as_option());
    match parts.next().map(|k| k.parse::<u32>()) {
        Some(Ok(v)) => (prefix, Some(v)),
        _ => (prefix, None),
    }
}

pub trait ParamLike {
    fn name(&self) -> &str;
    fn value(&self) -> &str;
    fn accession(&self) -> Option<u32>;
    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary>;
    fn unit(&self) -> Unit;

    fn coerce<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value().parse::<T>()
    }

    fn is_controlled(&self) -> bool {
        self.accession().is_some()
    }

    fn curie(&self) -> Option<String> {
        let cv = self.controlled_vocabulary()?;
        let acc = self.accession()?;
        Some(format!("{}:{:07}", cv.prefix(), acc))
    }

    /// Test whether this parameter is the controlled term with the given CURIE
    fn is_term(&self, curie: &str) -> bool {
        let (cv, acc) = curie_to_num(curie);
        acc.is_some() && self.accession() == acc && self.controlled_vocabulary() == cv
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl Param {
    pub fn new() -> Param {
        Param {
            ..Default::default()
        }
    }

    pub fn new_key_value<K: Into<String>, V: Into<String>>(name: K, value: V) -> Param {
        Param {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_unit<S: AsRef<str>, A: AsRef<str>>(mut self, accession: S, name: A) -> Param {
        self.unit = Unit::from_accession(accession.as_ref());
        if matches!(self.unit, Unit::Unknown) {
            self.unit = Unit::from_name(name.as_ref());
        }
        self
    }

    pub fn with_unit_t(mut self, unit: &Unit) -> Param {
        self.unit = *unit;
        self
    }
}

impl ParamLike for Param {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<u32> {
        self.accession
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }

    fn unit(&self) -> Unit {
        self.unit
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ControlledVocabulary {
    MS,
    UO,
    Unknown,
}

const MS_CV: &str = "MS";
const UO_CV: &str = "UO";

impl ControlledVocabulary {
    pub fn prefix(&self) -> Cow<'static, str> {
        match &self {
            Self::MS => Cow::Borrowed(MS_CV),
            Self::UO => Cow::Borrowed(UO_CV),
            Self::Unknown => Cow::Borrowed(""),
        }
    }

    pub fn as_option(&self) -> Option<Self> {
        match self {
            Self::Unknown => None,
            _ => Some(*self),
        }
    }

    /// Create a [`Param`] for the term `accession` (a CURIE or a bare number) in this vocabulary
    pub fn param<A: AsRef<str>, S: Into<String>>(&self, accession: A, name: S) -> Param {
        let accession = accession.as_ref();
        let number = accession.rsplit(':').next().unwrap_or(accession);
        Param {
            name: name.into(),
            controlled_vocabulary: Some(*self),
            accession: number.parse().ok(),
            ..Default::default()
        }
    }

    pub fn param_val<S: Into<String>, A: AsRef<str>, V: ToString>(
        &self,
        accession: A,
        name: S,
        value: V,
    ) -> Param {
        let mut param = self.param(accession, name);
        param.value = value.to_string();
        param
    }
}

impl Display for ControlledVocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.prefix())
    }
}

impl FromStr for ControlledVocabulary {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" => Ok(Self::MS),
            "UO" => Ok(Self::UO),
            _ => Ok(Self::Unknown),
        }
    }
}

pub type ParamList = Vec<Param>;

pub trait ParamDescribed {
    fn params(&self) -> &ParamList;
    fn params_mut(&mut self) -> &mut ParamList;

    fn add_param(&mut self, param: Param) {
        self.params_mut().push(param);
    }

    fn get_param_by_name(&self, name: &str) -> Option<&Param> {
        self.params().iter().find(|p| p.name == name)
    }

    fn get_param_by_accession(&self, accession: &str) -> Option<&Param> {
        self.params().iter().find(|p| p.is_term(accession))
    }
}

#[macro_export]
macro_rules! impl_param_described {
    ($($t:ty), +) => {$(

        impl $crate::params::ParamDescribed for $t {
            fn params(&self) -> &$crate::params::ParamList {
                return &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::params::ParamList {
                return &mut self.params
            }
        }
    )+};
}

/// Units that a term's value might have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Unit {
    // Mass
    MZ,
    Mass,

    // Time
    Minute,
    Second,
    Millisecond,

    // Intensity
    DetectorCounts,
    PercentBasePeak,
    CountsPerSecond,

    #[default]
    Unknown,
}

impl Unit {
    pub fn for_param(&self) -> (&'static str, &'static str) {
        match self {
            Self::Millisecond => ("UO:0000028", "millisecond"),
            Self::Second => ("UO:0000010", "second"),
            Self::Minute => ("UO:0000031", "minute"),

            Self::MZ => ("MS:1000040", "m/z"),
            Self::Mass => ("UO:0000221", "dalton"),

            Self::DetectorCounts => ("MS:1000131", "number of detector counts"),
            Self::PercentBasePeak => ("MS:1000132", "percent of base peak"),
            Self::CountsPerSecond => ("MS:1000814", "counts per second"),

            Self::Unknown => ("", ""),
        }
    }

    pub fn from_name(name: &str) -> Unit {
        match name {
            "millisecond" => Self::Millisecond,
            "second" => Self::Second,
            "minute" => Self::Minute,

            "m/z" => Self::MZ,
            "dalton" => Self::Mass,

            "number of detector counts" => Self::DetectorCounts,
            "percent of base peak" => Self::PercentBasePeak,
            "counts per second" => Self::CountsPerSecond,
            _ => Unit::Unknown,
        }
    }

    pub fn from_accession(acc: &str) -> Unit {
        match acc {
            "UO:0000028" => Self::Millisecond,
            "UO:0000010" => Self::Second,
            // Obsolete PSI-MS "minute" term still found in older files
            "UO:0000031" | "MS:1000038" => Self::Minute,

            "MS:1000040" => Self::MZ,
            "UO:0000221" => Self::Mass,

            "MS:1000131" => Self::DetectorCounts,
            "MS:1000132" => Self::PercentBasePeak,
            "MS:1000814" => Self::CountsPerSecond,
            _ => Unit::Unknown,
        }
    }

    /// The number of seconds in one of this unit, if it is a unit of time
    pub fn seconds_per_unit(&self) -> Option<f64> {
        match self {
            Self::Second => Some(1.0),
            Self::Minute => Some(60.0),
            Self::Millisecond => Some(1e-3),
            _ => None,
        }
    }
}
