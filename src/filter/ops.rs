use log::debug;

use crate::params::Unit;
use crate::spectrum::{ArrayType, BinaryCompressionType, BinaryDataArrayType, Spectrum};

use super::{FilterOutcome, SpectrumFilter};

/// Remove every point whose intensity is below `threshold` from all arrays of the same
/// length as the intensity array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub threshold: f64,
}

impl SpectrumFilter for Baseline {
    fn apply(&self, mut spectrum: Spectrum) -> FilterOutcome {
        let mask: Vec<bool> = match spectrum.intensities() {
            Ok(intensities) => intensities.iter().map(|v| *v >= self.threshold).collect(),
            Err(_) => {
                debug!("{} has no intensity array to threshold", spectrum.id);
                return FilterOutcome::Kept(spectrum);
            }
        };
        spectrum.arrays.retain_mask(&mask);
        FilterOutcome::Kept(spectrum)
    }
}

/// Keep spectra whose index lies strictly between the bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub from: i64,
    pub to: i64,
}

impl SpectrumFilter for IndexRange {
    fn apply(&self, spectrum: Spectrum) -> FilterOutcome {
        let index = spectrum.index as i64;
        if self.from < index && index < self.to {
            FilterOutcome::Kept(spectrum)
        } else {
            FilterOutcome::Dropped
        }
    }
}

/// Keep spectra whose retention time, expressed in `unit`, lies strictly between the
/// bounds. Spectra without a retention time are dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionTimeRange {
    pub from: f64,
    pub to: f64,
    pub unit: Unit,
}

impl SpectrumFilter for RetentionTimeRange {
    fn apply(&self, spectrum: Spectrum) -> FilterOutcome {
        match spectrum.start_time_in(self.unit) {
            Some(time) if self.from < time && time < self.to => FilterOutcome::Kept(spectrum),
            Some(_) => FilterOutcome::Dropped,
            None => {
                debug!("{} has no usable retention time", spectrum.id);
                FilterOutcome::Dropped
            }
        }
    }
}

/// Keep spectra of exactly one MS level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MSLevel {
    pub level: u8,
}

impl SpectrumFilter for MSLevel {
    fn apply(&self, spectrum: Spectrum) -> FilterOutcome {
        if spectrum.ms_level == self.level {
            FilterOutcome::Kept(spectrum)
        } else {
            FilterOutcome::Dropped
        }
    }
}

/// Retag the compression the m/z and intensity arrays are written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compress {
    pub mz: BinaryCompressionType,
    pub intensity: BinaryCompressionType,
}

impl SpectrumFilter for Compress {
    fn apply(&self, mut spectrum: Spectrum) -> FilterOutcome {
        if let Some(array) = spectrum.arrays.get_mut(&ArrayType::MZArray) {
            array.store_compressed(self.mz);
        }
        if let Some(array) = spectrum.arrays.get_mut(&ArrayType::IntensityArray) {
            array.store_compressed(self.intensity);
        }
        FilterOutcome::Kept(spectrum)
    }
}

/// Express the retention time in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToMinutes;

impl SpectrumFilter for ToMinutes {
    fn apply(&self, mut spectrum: Spectrum) -> FilterOutcome {
        if let Some(rt) = spectrum.retention_time.as_mut() {
            if rt.unit == Unit::Second {
                rt.value /= 60.0;
                rt.unit = Unit::Minute;
            }
        }
        FilterOutcome::Kept(spectrum)
    }
}

/// Change the width the m/z and intensity arrays are stored at, reducing their values to
/// that width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataType {
    pub mz: BinaryDataArrayType,
    pub intensity: BinaryDataArrayType,
}

impl SpectrumFilter for DataType {
    fn apply(&self, mut spectrum: Spectrum) -> FilterOutcome {
        if let Some(array) = spectrum.arrays.get_mut(&ArrayType::MZArray) {
            array.store_as(self.mz);
        }
        if let Some(array) = spectrum.arrays.get_mut(&ArrayType::IntensityArray) {
            array.store_as(self.intensity);
        }
        FilterOutcome::Kept(spectrum)
    }
}
