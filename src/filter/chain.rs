use log::{debug, warn};

use crate::params::Unit;
use crate::spectrum::Spectrum;

use super::ops::{
    Baseline, Compress, DataType, IndexRange, MSLevel, RetentionTimeRange, ToMinutes,
};
use super::resample::{Resample, DEFAULT_CENTER_MZ};
use super::smoothing::SavitzkyGolay;
use super::spec::{FilterName, FilterSpec, FilterSpecError};
use super::{FilterOutcome, SpectrumFilter};

/// A configured filter, ready to be applied to spectra
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Resample(Resample),
    SavitzkyGolay(SavitzkyGolay),
    Baseline(Baseline),
    IndexRange(IndexRange),
    RetentionTimeRange(RetentionTimeRange),
    MSLevel(MSLevel),
    Compress(Compress),
    ToMinutes(ToMinutes),
    DataType(DataType),
    /// Electric noise removal, no longer performed
    Electric { threshold_multiplier: Option<i64> },
    /// Conversion of both arrays to 32-bit floats, no longer performed
    Float32,
}

impl SpectrumFilter for Filter {
    fn apply(&self, spectrum: Spectrum) -> FilterOutcome {
        match self {
            Filter::Resample(f) => f.apply(spectrum),
            Filter::SavitzkyGolay(f) => f.apply(spectrum),
            Filter::Baseline(f) => f.apply(spectrum),
            Filter::IndexRange(f) => f.apply(spectrum),
            Filter::RetentionTimeRange(f) => f.apply(spectrum),
            Filter::MSLevel(f) => f.apply(spectrum),
            Filter::Compress(f) => f.apply(spectrum),
            Filter::ToMinutes(f) => f.apply(spectrum),
            Filter::DataType(f) => f.apply(spectrum),
            Filter::Electric { .. } | Filter::Float32 => FilterOutcome::Kept(spectrum),
        }
    }
}

impl Filter {
    /// Build a filter from a parsed specification. `minutes` says whether a `to_minutes`
    /// filter precedes this one, which fixes the unit of `rt` bounds.
    fn from_spec(spec: &FilterSpec, minutes: bool) -> Result<Filter, FilterSpecError> {
        let filter = match spec.name {
            FilterName::Resample => {
                let step: f64 = spec.arg(0)?;
                let center_mz = spec.opt_arg::<f64>(1)?.unwrap_or(DEFAULT_CENTER_MZ);
                if !(step.is_finite() && step > 0.0) {
                    return Err(spec.invalid(format!("step must be positive, got {step}")));
                }
                if !center_mz.is_finite() {
                    return Err(spec.invalid("center m/z must be finite"));
                }
                Filter::Resample(Resample::new(step, center_mz))
            }
            FilterName::SavitzkyGolay => {
                let smoother = if spec.args.is_empty() {
                    SavitzkyGolay::default()
                } else {
                    SavitzkyGolay::new(spec.arg(0)?, spec.arg(1)?)
                };
                if smoother.window_length % 2 == 0 {
                    return Err(spec.invalid(format!(
                        "window length must be odd, got {}",
                        smoother.window_length
                    )));
                }
                if smoother.window_length < smoother.poly_order + 1 {
                    return Err(spec.invalid(format!(
                        "window length {} is too short for a polynomial of order {}",
                        smoother.window_length, smoother.poly_order
                    )));
                }
                Filter::SavitzkyGolay(smoother)
            }
            FilterName::Baseline => {
                let threshold: f64 = spec.arg(0)?;
                if threshold.is_nan() {
                    return Err(spec.invalid("threshold must be a number"));
                }
                Filter::Baseline(Baseline { threshold })
            }
            FilterName::Index => {
                let from: i64 = spec.arg(0)?;
                let to: i64 = spec.arg(1)?;
                if from >= to {
                    return Err(spec.invalid(format!("empty range {from} to {to}")));
                }
                Filter::IndexRange(IndexRange { from, to })
            }
            FilterName::RetentionTime => {
                let from: f64 = spec.arg(0)?;
                let to: f64 = spec.arg(1)?;
                if !(from < to) {
                    return Err(spec.invalid(format!("empty range {from} to {to}")));
                }
                let unit = if minutes { Unit::Minute } else { Unit::Second };
                Filter::RetentionTimeRange(RetentionTimeRange { from, to, unit })
            }
            FilterName::MSLevel => {
                let level: u8 = spec.arg(0)?;
                if level == 0 {
                    return Err(spec.invalid("MS level must be at least 1"));
                }
                Filter::MSLevel(MSLevel { level })
            }
            FilterName::Compress => Filter::Compress(Compress {
                mz: spec.compression_arg(0)?,
                intensity: spec.compression_arg(1)?,
            }),
            FilterName::ToMinutes => Filter::ToMinutes(ToMinutes),
            FilterName::Type => Filter::DataType(DataType {
                mz: spec.dtype_arg(0)?,
                intensity: spec.dtype_arg(1)?,
            }),
            FilterName::Electric => Filter::Electric {
                threshold_multiplier: spec.opt_arg(0)?,
            },
            FilterName::Float32 => Filter::Float32,
        };
        Ok(filter)
    }
}

/// An ordered, immutable sequence of filters applied to each spectrum in turn.
///
/// A spectrum dropped by one filter is not seen by the filters after it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    filters: Vec<Filter>,
    specs: Vec<FilterSpec>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate each specification string in order, failing on the first
    /// invalid one
    pub fn parse<I, S>(specs: I) -> Result<Self, FilterSpecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let specs = specs
            .into_iter()
            .map(|s| FilterSpec::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_specs(specs)
    }

    pub fn from_specs(specs: Vec<FilterSpec>) -> Result<Self, FilterSpecError> {
        let mut filters = Vec::with_capacity(specs.len());
        let mut minutes = false;
        for spec in specs.iter() {
            let filter = Filter::from_spec(spec, minutes)?;
            if spec.name.is_deprecated() {
                warn!("The {} filter is deprecated and does nothing", spec.name);
            }
            if matches!(filter, Filter::ToMinutes(_)) {
                minutes = true;
            }
            filters.push(filter);
        }
        Ok(Self { filters, specs })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.filters.iter()
    }

    /// The specifications the chain was built from, in order
    pub fn specs(&self) -> &[FilterSpec] {
        &self.specs
    }
}

impl SpectrumFilter for FilterChain {
    fn apply(&self, spectrum: Spectrum) -> FilterOutcome {
        let mut current = spectrum;
        for (filter, spec) in self.filters.iter().zip(self.specs.iter()) {
            match filter.apply(current) {
                FilterOutcome::Kept(s) => current = s,
                FilterOutcome::Dropped => {
                    debug!("Spectrum dropped by {spec}");
                    return FilterOutcome::Dropped;
                }
            }
        }
        FilterOutcome::Kept(current)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_chain_is_shareable() {
        assert_send_sync::<FilterChain>();
    }

    #[test_log::test]
    fn test_parse_chain() {
        let chain = FilterChain::parse(["resample:0.5", "sgolay", "baseline:10", "f32"]).unwrap();
        assert_eq!(chain.len(), 4);
        let filters: Vec<_> = chain.iter().cloned().collect();
        assert_eq!(filters[0], Filter::Resample(Resample::new(0.5, 800.0)));
        assert_eq!(filters[1], Filter::SavitzkyGolay(SavitzkyGolay::new(11, 4)));
        assert_eq!(filters[3], Filter::Float32);
        assert_eq!(chain.specs()[2].to_string(), "baseline:10");
    }

    #[test]
    fn test_validation() {
        let invalid = |s: &str| match FilterChain::parse([s]) {
            Err(e) => !e.is_invalid_spec(),
            Ok(_) => false,
        };
        assert!(invalid("resample:0"));
        assert!(invalid("resample:-1,400"));
        assert!(invalid("sgolay:4,2"));
        assert!(invalid("sgolay:3,4"));
        assert!(invalid("mslevel:0"));
        assert!(invalid("rt:5,5"));
        assert!(invalid("index:10,2"));

        let malformed = |s: &str| matches!(FilterChain::parse([s]), Err(e) if e.is_invalid_spec());
        assert!(malformed("mslevel:-1"));
        assert!(malformed("electric:1.5"));
        assert!(malformed("compress:gzip,zlib"));
        assert!(malformed("to_minutes:1"));
        assert!(malformed("peaks"));
        assert!(FilterChain::parse(["electric:3", "electric"]).is_ok());
    }

    #[test]
    fn test_fail_fast_on_later_spec() {
        let err = FilterChain::parse(["baseline:10", "mslevel:x"]).unwrap_err();
        assert!(matches!(err, FilterSpecError::MalformedArgument { .. }));
    }

    #[test]
    fn test_rt_unit_follows_to_minutes() {
        let chain = FilterChain::parse(["rt:1,3", "to_minutes", "rt:1,3"]).unwrap();
        let units: Vec<_> = chain
            .iter()
            .filter_map(|f| match f {
                Filter::RetentionTimeRange(r) => Some(r.unit),
                _ => None,
            })
            .collect();
        assert_eq!(units, vec![Unit::Second, Unit::Minute]);
    }

    #[test]
    fn test_rt_ordering_dependency() {
        let spectrum = || Spectrum::new("scan=1", 0, 1).with_retention_time(120.0, Unit::Second);

        let minutes_first = FilterChain::parse(["to_minutes", "rt:1,3"]).unwrap();
        assert!(minutes_first.apply(spectrum()).is_kept());

        let minutes_last = FilterChain::parse(["rt:1,3", "to_minutes"]).unwrap();
        assert!(!minutes_last.apply(spectrum()).is_kept());
    }

    #[test]
    fn test_short_circuit() {
        let chain = FilterChain::parse(["mslevel:2", "to_minutes"]).unwrap();
        let spectrum = Spectrum::new("scan=1", 0, 1).with_retention_time(60.0, Unit::Second);
        assert_eq!(chain.apply(spectrum), FilterOutcome::Dropped);

        let spectrum = Spectrum::new("scan=2", 1, 2).with_retention_time(60.0, Unit::Second);
        let FilterOutcome::Kept(out) = chain.apply(spectrum) else {
            panic!("MS2 spectrum should survive");
        };
        assert_eq!(out.start_time_in(Unit::Minute), Some(1.0));
        assert_eq!(out.retention_time.unwrap().unit, Unit::Minute);
    }

    #[test]
    fn test_end_to_end_baseline() {
        let chain = FilterChain::parse(["baseline:10"]).unwrap();
        let spectrum = Spectrum::new("scan=1", 0, 1)
            .with_mz_intensity(vec![100.0, 200.0, 300.0], vec![5.0, 50.0, 500.0]);
        let FilterOutcome::Kept(out) = chain.apply(spectrum) else {
            panic!("baseline never drops");
        };
        assert_eq!(out.mzs().unwrap(), &[200.0, 300.0]);
        assert_eq!(out.intensities().unwrap(), &[50.0, 500.0]);
    }
}
