//! Per-spectrum transformations and the chain that applies them in order.
//!
//! Every filter is a pure function of one spectrum and its own parameters, so a
//! [`FilterChain`] can be shared freely between threads.
pub mod chain;
pub mod ops;
pub mod resample;
pub mod smoothing;
pub mod spec;

use crate::spectrum::Spectrum;

pub use chain::{Filter, FilterChain};
pub use ops::{Baseline, Compress, DataType, IndexRange, MSLevel, RetentionTimeRange, ToMinutes};
pub use resample::Resample;
pub use smoothing::SavitzkyGolay;
pub use spec::{FilterName, FilterSpec, FilterSpecError};

/// What became of a spectrum after a filter was applied
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Kept(Spectrum),
    Dropped,
}

impl FilterOutcome {
    pub fn is_kept(&self) -> bool {
        matches!(self, Self::Kept(_))
    }

    pub fn kept(self) -> Option<Spectrum> {
        match self {
            Self::Kept(spectrum) => Some(spectrum),
            Self::Dropped => None,
        }
    }
}

/// A transformation of a single spectrum which may also decide to discard it
pub trait SpectrumFilter {
    fn apply(&self, spectrum: Spectrum) -> FilterOutcome;
}
