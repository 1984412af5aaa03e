use quick_xml::events::{BytesStart, Event};

use crate::impl_param_described;
use crate::params::{ParamList, Unit};

use super::bindata::{
    ArrayRetrievalError, ArrayType, BinaryArrayMap, BinaryDataArrayType, DataArray,
};

/// The time a scan started, in the unit it was recorded in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionTime {
    pub value: f64,
    pub unit: Unit,
}

impl RetentionTime {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn seconds(value: f64) -> Self {
        Self::new(value, Unit::Second)
    }

    pub fn minutes(value: f64) -> Self {
        Self::new(value, Unit::Minute)
    }

    /// Express this time in `unit`. Returns `None` if either unit is not a unit of time.
    pub fn convert_to(&self, unit: Unit) -> Option<RetentionTime> {
        if self.unit == unit {
            return Some(*self);
        }
        let from = self.unit.seconds_per_unit()?;
        let to = unit.seconds_per_unit()?;
        Some(RetentionTime::new(self.value * from / to, unit))
    }
}

/// The original markup of a spectrum, minus its `<binaryDataArrayList>`, replayed when
/// the spectrum is written back out
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PassThroughMarkup {
    pub start: BytesStart<'static>,
    pub body: Vec<Event<'static>>,
    /// The position in `body` the data arrays are written at
    pub arrays_at: usize,
    /// When the scan start time came from a `referenceableParamGroupRef` inside `<scan>`,
    /// the position of that reference in `body` and the group's params
    pub scan_time_group: Option<(usize, ParamList)>,
}

/// A single scan: its identity, the few metadata fields the filters act on, its
/// parameters and its decoded data arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    /// The native identifier of the spectrum
    pub id: String,
    /// The ordinal position of the spectrum in its source
    pub index: usize,
    pub ms_level: u8,
    pub retention_time: Option<RetentionTime>,
    pub params: ParamList,
    pub arrays: BinaryArrayMap,
    pub(crate) markup: Option<PassThroughMarkup>,
}

impl_param_described!(Spectrum);

impl Spectrum {
    pub fn new<S: Into<String>>(id: S, index: usize, ms_level: u8) -> Self {
        Self {
            id: id.into(),
            index,
            ms_level,
            ..Default::default()
        }
    }

    pub fn with_retention_time(mut self, value: f64, unit: Unit) -> Self {
        self.retention_time = Some(RetentionTime::new(value, unit));
        self
    }

    /// Replace the m/z and intensity arrays, stored as 64- and 32-bit floats respectively
    pub fn with_mz_intensity(mut self, mzs: Vec<f64>, intensities: Vec<f64>) -> Self {
        self.arrays.add(DataArray::wrap(
            &ArrayType::MZArray,
            BinaryDataArrayType::Float64,
            mzs,
        ));
        self.arrays.add(DataArray::wrap(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float32,
            intensities,
        ));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ms_level(&self) -> u8 {
        self.ms_level
    }

    pub fn mzs(&self) -> Result<&[f64], ArrayRetrievalError> {
        self.arrays.mzs()
    }

    pub fn intensities(&self) -> Result<&[f64], ArrayRetrievalError> {
        self.arrays.intensities()
    }

    /// The retention time expressed in `unit`, if the spectrum has one
    pub fn start_time_in(&self, unit: Unit) -> Option<f64> {
        self.retention_time
            .and_then(|rt| rt.convert_to(unit))
            .map(|rt| rt.value)
    }

    /// Whether this spectrum still carries the markup it was read with
    pub fn has_markup(&self) -> bool {
        self.markup.is_some()
    }
}
