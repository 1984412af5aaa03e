//! Drive spectra from a [`SpectrumSource`] through a [`FilterChain`] into a
//! [`SpectrumWriter`].
use std::error::Error;

use log::{debug, info};
#[cfg(feature = "parallelism")]
use rayon::prelude::*;
use thiserror::Error;

use crate::filter::{FilterChain, FilterOutcome, SpectrumFilter};
use crate::spectrum::{ArrayRetrievalError, Spectrum};

use super::mzml::MzMLParserError;
use super::traits::{SpectrumSource, SpectrumWriter};

const PROGRESS_INTERVAL: usize = 10000;

type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// The number of spectra that passed through a pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub read: usize,
    pub written: usize,
    pub dropped: usize,
}

impl PipelineSummary {
    fn record(&mut self, outcome: &FilterOutcome) {
        self.read += 1;
        if outcome.is_kept() {
            self.written += 1;
        } else {
            self.dropped += 1;
        }
        if self.read % PROGRESS_INTERVAL == 0 {
            info!(
                "Processed {} spectra, {} written, {} dropped",
                self.read, self.written, self.dropped
            );
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("The data arrays of spectrum {id} could not be decoded: {source}")]
    CorruptStream {
        id: String,
        #[source]
        source: ArrayRetrievalError,
    },
    #[error("Failed to read a spectrum: {0}")]
    Read(#[source] BoxedError),
    #[error("Failed to write a spectrum: {0}")]
    Write(#[source] BoxedError),
}

impl PipelineError {
    fn from_source<E: Error + Send + Sync + 'static>(error: E) -> Self {
        let boxed: BoxedError = Box::new(error);
        match boxed.downcast::<MzMLParserError>() {
            Ok(inner) => match *inner {
                MzMLParserError::ArrayDecodingError { id, source } => {
                    Self::CorruptStream { id, source }
                }
                other => Self::Read(Box::new(other)),
            },
            Err(boxed) => Self::Read(boxed),
        }
    }

    fn from_sink<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Write(Box::new(error))
    }

    pub fn is_corrupt_stream(&self) -> bool {
        matches!(self, Self::CorruptStream { .. })
    }
}

/**
Pull every spectrum from `source`, apply `chain` to it and push the survivors to `sink`
in source order.

The sink is left open so that the caller may finish the document, e.g. by giving an
[`MzMLWriter`](super::mzml::MzMLWriter) the trailer of the document it read.
*/
pub fn run_pipeline<S: SpectrumSource, W: SpectrumWriter>(
    source: &mut S,
    chain: &FilterChain,
    sink: &mut W,
) -> Result<PipelineSummary, PipelineError> {
    let mut summary = PipelineSummary::default();
    while let Some(spectrum) = source
        .pull_next_spectrum()
        .map_err(PipelineError::from_source)?
    {
        let outcome = chain.apply(spectrum);
        summary.record(&outcome);
        if let FilterOutcome::Kept(spectrum) = outcome {
            sink.push_spectrum(spectrum)
                .map_err(PipelineError::from_sink)?;
        }
    }
    info!(
        "Read {} spectra, wrote {} and dropped {}",
        summary.read, summary.written, summary.dropped
    );
    Ok(summary)
}

/// Like [`run_pipeline`], but pull up to `batch_size` spectra at a time and filter each
/// batch in parallel. The survivors are still written in source order.
#[cfg(feature = "parallelism")]
pub fn run_pipeline_parallel<S: SpectrumSource, W: SpectrumWriter>(
    source: &mut S,
    chain: &FilterChain,
    sink: &mut W,
    batch_size: usize,
) -> Result<PipelineSummary, PipelineError> {
    let batch_size = batch_size.max(1);
    let mut summary = PipelineSummary::default();
    let mut batch: Vec<Spectrum> = Vec::with_capacity(batch_size);
    let mut exhausted = false;
    while !exhausted {
        batch.clear();
        while batch.len() < batch_size {
            match source
                .pull_next_spectrum()
                .map_err(PipelineError::from_source)?
            {
                Some(spectrum) => batch.push(spectrum),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        debug!("Filtering a batch of {} spectra", batch.len());
        let outcomes: Vec<FilterOutcome> = batch
            .par_drain(..)
            .map(|spectrum| chain.apply(spectrum))
            .collect();
        for outcome in outcomes {
            summary.record(&outcome);
            if let FilterOutcome::Kept(spectrum) = outcome {
                sink.push_spectrum(spectrum)
                    .map_err(PipelineError::from_sink)?;
            }
        }
    }
    info!(
        "Read {} spectra, wrote {} and dropped {}",
        summary.read, summary.written, summary.dropped
    );
    Ok(summary)
}

/// Apply `chain` to spectra already in memory, returning the survivors in order
pub fn filter_spectra<I: IntoIterator<Item = Spectrum>>(
    spectra: I,
    chain: &FilterChain,
) -> Vec<Spectrum> {
    spectra
        .into_iter()
        .filter_map(|spectrum| {
            let id = spectrum.id.clone();
            let kept = chain.apply(spectrum).kept();
            if kept.is_none() {
                debug!("Dropped {id}");
            }
            kept
        })
        .collect()
}
