//! `mzfilter` streams the spectra of an mzML document through an ordered chain of
//! filters and writes the survivors back out, carrying the rest of the document along
//! unchanged.
//!
//! The crate is split into:
//! - [`spectrum`], the in-memory spectrum and its binary array codec
//! - [`filter`], the filters and the [`FilterChain`] that applies them
//! - [`io`], the mzML reader and writer and the pipeline connecting them
//!
//! ```no_run
//! use mzfilter::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = FilterChain::parse(["mslevel:1", "baseline:10"])?;
//! let mut reader = MzMLReader::open_path("test/data/small.mzML")?;
//! let mut writer = MzMLWriter::create_path("filtered.mzML", reader.document().clone())?
//!     .with_processing(chain.specs());
//! run_pipeline(&mut reader, &chain, &mut writer)?;
//! writer.set_trailer(reader.document().trailer.clone());
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
pub mod filter;
pub mod io;
pub mod params;
pub mod prelude;
pub mod spectrum;

pub use crate::filter::{FilterChain, FilterSpec};
pub use crate::io::mzml::{MzMLReader, MzMLWriter};
pub use crate::spectrum::Spectrum;
