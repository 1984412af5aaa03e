use log::debug;

use crate::spectrum::{ArrayType, Spectrum};

use super::{FilterOutcome, SpectrumFilter};

pub const DEFAULT_CENTER_MZ: f64 = 800.0;

/// Re-grid the m/z and intensity arrays onto a uniform lattice `center_mz + k * step`,
/// linearly interpolating intensities. Grid points outside the observed m/z range are
/// omitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resample {
    pub step: f64,
    pub center_mz: f64,
}

impl Resample {
    pub fn new(step: f64, center_mz: f64) -> Self {
        Self { step, center_mz }
    }

    /// The lattice points inside `[low, high]`
    pub fn grid(&self, low: f64, high: f64) -> Vec<f64> {
        if !(high >= low) {
            return Vec::new();
        }
        let k_start = ((low - self.center_mz) / self.step).ceil() as i64;
        let k_end = ((high - self.center_mz) / self.step).floor() as i64;
        (k_start..=k_end)
            .map(|k| self.center_mz + k as f64 * self.step)
            .filter(|x| *x >= low && *x <= high)
            .collect()
    }
}

/// Linearly interpolate `ys` sampled at non-decreasing `xs` at each point of the
/// increasing sequence `grid`, all of which must lie within `[xs[0], xs[xs.len() - 1]]`.
pub fn interpolate(xs: &[f64], ys: &[f64], grid: &[f64]) -> Vec<f64> {
    let mut result = Vec::with_capacity(grid.len());
    let mut j = 0;
    for x in grid.iter().copied() {
        while j + 1 < xs.len() && xs[j + 1] < x {
            j += 1;
        }
        if xs[j] >= x || j + 1 == xs.len() {
            result.push(ys[j]);
            continue;
        }
        let (x0, x1) = (xs[j], xs[j + 1]);
        let (y0, y1) = (ys[j], ys[j + 1]);
        if x1 == x0 {
            result.push(y1);
        } else {
            result.push(y0 + (y1 - y0) * (x - x0) / (x1 - x0));
        }
    }
    result
}

impl SpectrumFilter for Resample {
    fn apply(&self, mut spectrum: Spectrum) -> FilterOutcome {
        let regridded = match (spectrum.mzs(), spectrum.intensities()) {
            (Ok(mzs), Ok(intensities)) if mzs.len() >= 2 && mzs.len() == intensities.len() => {
                let grid = self.grid(mzs[0], mzs[mzs.len() - 1]);
                let resampled = interpolate(mzs, intensities, &grid);
                Some((grid, resampled))
            }
            _ => None,
        };
        let Some((grid, resampled)) = regridded else {
            debug!("{} has too few points to resample", spectrum.id());
            return FilterOutcome::Kept(spectrum);
        };

        spectrum.arrays.retain(|name, _| {
            let keep = matches!(name, ArrayType::MZArray | ArrayType::IntensityArray);
            if !keep {
                debug!("Dropping {name} from {} while resampling", spectrum.id);
            }
            keep
        });
        if let Some(array) = spectrum.arrays.get_mut(&ArrayType::MZArray) {
            array.set_values(grid);
        }
        if let Some(array) = spectrum.arrays.get_mut(&ArrayType::IntensityArray) {
            array.set_values(resampled);
        }
        FilterOutcome::Kept(spectrum)
    }
}
