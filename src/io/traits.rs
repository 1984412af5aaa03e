use std::collections::VecDeque;
use std::convert::Infallible;
use std::iter::FusedIterator;

use crate::spectrum::Spectrum;

/// A trait for pulling fully decoded [`Spectrum`]s from a source, one at a time and in
/// source order.
pub trait SpectrumSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the next spectrum, or `None` once the source is exhausted
    fn pull_next_spectrum(&mut self) -> Result<Option<Spectrum>, Self::Error>;

    /// Iterate over the remaining spectra with a [`SpectrumIterator`]
    fn iter(&mut self) -> SpectrumIterator<'_, Self>
    where
        Self: Sized,
    {
        SpectrumIterator::new(self)
    }
}

/// A facade for a [`SpectrumSource`] that is an [`Iterator`] over the spectra it yields.
///
/// The iterator stops after the first error.
#[derive(Debug)]
pub struct SpectrumIterator<'a, R: SpectrumSource> {
    source: &'a mut R,
    done: bool,
}

impl<'a, R: SpectrumSource> SpectrumIterator<'a, R> {
    pub fn new(source: &'a mut R) -> Self {
        Self {
            source,
            done: false,
        }
    }
}

impl<R: SpectrumSource> Iterator for SpectrumIterator<'_, R> {
    type Item = Result<Spectrum, R::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.pull_next_spectrum() {
            Ok(Some(spectrum)) => Some(Ok(spectrum)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: SpectrumSource> FusedIterator for SpectrumIterator<'_, R> {}

/// A trait for sinks that accept spectra in order and finalize their output on
/// [`SpectrumWriter::close`]
pub trait SpectrumWriter {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write out a single spectrum
    fn push_spectrum(&mut self, spectrum: Spectrum) -> Result<(), Self::Error>;

    /// Consume an [`Iterator`] over [`Spectrum`], returning the number written
    fn push_all<T: IntoIterator<Item = Spectrum>>(
        &mut self,
        spectra: T,
    ) -> Result<usize, Self::Error> {
        let mut n = 0;
        for spectrum in spectra {
            self.push_spectrum(spectrum)?;
            n += 1;
        }
        Ok(n)
    }

    /// Finish writing. Nothing may be pushed afterwards.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// A [`SpectrumSource`] over spectra already held in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    spectra: VecDeque<Spectrum>,
}

impl MemorySource {
    pub fn new(spectra: Vec<Spectrum>) -> Self {
        Self {
            spectra: spectra.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

impl From<Vec<Spectrum>> for MemorySource {
    fn from(value: Vec<Spectrum>) -> Self {
        Self::new(value)
    }
}

impl FromIterator<Spectrum> for MemorySource {
    fn from_iter<T: IntoIterator<Item = Spectrum>>(iter: T) -> Self {
        Self {
            spectra: iter.into_iter().collect(),
        }
    }
}

impl SpectrumSource for MemorySource {
    type Error = Infallible;

    fn pull_next_spectrum(&mut self) -> Result<Option<Spectrum>, Self::Error> {
        Ok(self.spectra.pop_front())
    }
}

impl SpectrumWriter for Vec<Spectrum> {
    type Error = Infallible;

    fn push_spectrum(&mut self, spectrum: Spectrum) -> Result<(), Self::Error> {
        self.push(spectrum);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_memory_round_trip() {
        let mut source: MemorySource = (0..3)
            .map(|i| Spectrum::new(format!("scan={i}"), i, 1))
            .collect();
        assert_eq!(source.len(), 3);
        let mut sink: Vec<Spectrum> = Vec::new();
        let n = sink
            .push_all(source.iter().map(|s| s.unwrap()))
            .unwrap();
        sink.close().unwrap();
        assert_eq!(n, 3);
        assert!(source.is_empty());
        let ids: Vec<_> = sink.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["scan=0", "scan=1", "scan=2"]);
        assert!(source.pull_next_spectrum().unwrap().is_none());
    }
}
