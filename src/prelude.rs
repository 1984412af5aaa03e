//! Common traits and types for building and running a filter pipeline
pub use crate::filter::{FilterChain, FilterOutcome, FilterSpec, SpectrumFilter};
pub use crate::io::{run_pipeline, MzMLReader, MzMLWriter, SpectrumSource, SpectrumWriter};
pub use crate::params::{ParamDescribed, ParamLike};
pub use crate::spectrum::{ArrayType, Spectrum};
