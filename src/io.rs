//! Reading and writing spectra, and the pipeline that connects the two through a
//! [`FilterChain`](crate::filter::FilterChain).
pub mod mzml;
mod offset_index;
pub mod pipeline;
pub mod traits;
mod utils;

pub use crate::io::mzml::{
    scan_mz_range, MzMLDocument, MzMLParserError, MzMLReader, MzMLWriter, MzMLWriterError,
};
pub use crate::io::offset_index::OffsetIndex;
#[cfg(feature = "parallelism")]
pub use crate::io::pipeline::run_pipeline_parallel;
pub use crate::io::pipeline::{run_pipeline, PipelineError, PipelineSummary};
pub use crate::io::traits::{MemorySource, SpectrumIterator, SpectrumSource, SpectrumWriter};
