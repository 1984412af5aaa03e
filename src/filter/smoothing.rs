//! Savitzky-Golay smoothing of intensity arrays.
//!
//! Each output sample is the value at that sample's position of the least squares
//! polynomial fit over the window of samples around it. Near either end of the array the
//! window is truncated at the boundary, making it asymmetric, and the polynomial degree is
//! lowered if the truncated window has too few samples to support it.
use log::debug;

use crate::spectrum::{ArrayType, Spectrum};

use super::{FilterOutcome, SpectrumFilter};

pub const DEFAULT_WINDOW_LENGTH: usize = 11;
pub const DEFAULT_POLY_ORDER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavitzkyGolay {
    pub window_length: usize,
    pub poly_order: usize,
}

impl Default for SavitzkyGolay {
    fn default() -> Self {
        Self {
            window_length: DEFAULT_WINDOW_LENGTH,
            poly_order: DEFAULT_POLY_ORDER,
        }
    }
}

impl SavitzkyGolay {
    pub fn new(window_length: usize, poly_order: usize) -> Self {
        Self {
            window_length,
            poly_order,
        }
    }

    /// Smooth `data`, clipping negative results to zero. The output has the same length as
    /// the input.
    pub fn smooth(&self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        if n == 0 {
            return Vec::new();
        }
        let window = if self.window_length > n {
            if n % 2 == 0 {
                n - 1
            } else {
                n
            }
        } else {
            self.window_length
        };
        let half = window / 2;
        let interior = fit_weights(window, half, self.poly_order);

        (0..n)
            .map(|i| {
                let lo = i.saturating_sub(half);
                let hi = (i + half).min(n - 1);
                let width = hi - lo + 1;
                let value = if width == window {
                    dot(&interior, &data[lo..=hi])
                } else {
                    let weights = fit_weights(width, i - lo, self.poly_order);
                    dot(&weights, &data[lo..=hi])
                };
                value.max(0.0)
            })
            .collect()
    }
}

fn dot(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

/// The weights which, applied to `width` consecutive samples, give the value at sample
/// `at` of the least squares polynomial of degree `degree` through them.
fn fit_weights(width: usize, at: usize, degree: usize) -> Vec<f64> {
    let degree = degree.min(width.saturating_sub(1));
    let scale = ((width.max(2) - 1) as f64) / 2.0;
    let xs: Vec<f64> = (0..width)
        .map(|j| (j as f64 - at as f64) / scale)
        .collect();

    let m = degree + 1;
    let mut power_sums = vec![0.0; 2 * degree + 1];
    for x in xs.iter() {
        let mut p = 1.0;
        for s in power_sums.iter_mut() {
            *s += p;
            p *= x;
        }
    }
    let mut normal: Vec<Vec<f64>> = (0..m)
        .map(|k| power_sums[k..k + m].to_vec())
        .collect();
    let mut rhs = vec![0.0; m];
    rhs[0] = 1.0;

    let Some(z) = solve(&mut normal, &mut rhs) else {
        let mut identity = vec![0.0; width];
        identity[at] = 1.0;
        return identity;
    };

    xs.iter()
        .map(|x| {
            let mut p = 1.0;
            let mut w = 0.0;
            for zl in z.iter() {
                w += zl * p;
                p *= x;
            }
            w
        })
        .collect()
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting
fn solve(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|i, j| a[*i][col].abs().total_cmp(&a[*j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

impl SpectrumFilter for SavitzkyGolay {
    fn apply(&self, mut spectrum: Spectrum) -> FilterOutcome {
        match spectrum.arrays.get_mut(&ArrayType::IntensityArray) {
            Some(array) => {
                let smoothed = self.smooth(array.values());
                array.set_values(smoothed);
            }
            None => {
                debug!("{} has no intensity array to smooth", spectrum.id);
            }
        }
        FilterOutcome::Kept(spectrum)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interior_weights() {
        // The classic 5 point quadratic kernel
        let weights = fit_weights(5, 2, 2);
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0].map(|w| w / 35.0);
        for (w, e) in weights.iter().zip(expected.iter()) {
            assert!((w - e).abs() < 1e-10, "{w} != {e}");
        }
    }

    #[test]
    fn test_preserves_polynomials() {
        let data: Vec<f64> = (0..20).map(|i| (i as f64).powi(2) + 3.0).collect();
        let smoothed = SavitzkyGolay::new(5, 2).smooth(&data);
        for (a, b) in data.iter().zip(smoothed.iter()) {
            assert!((a - b).abs() < 1e-8, "{a} != {b}");
        }
    }

    #[test]
    fn test_length_preserved() {
        let data: Vec<f64> = (0..31)
            .map(|i| ((i as f64) * 0.7).sin().abs() * 100.0)
            .collect();
        for window in (3..=data.len()).step_by(2) {
            let smoothed = SavitzkyGolay::new(window, 2).smooth(&data);
            assert_eq!(smoothed.len(), data.len(), "window {window}");
        }
        let short = SavitzkyGolay::default().smooth(&data[..6]);
        assert_eq!(short.len(), 6);
    }

    #[test]
    fn test_clips_negative() {
        let mut data = vec![0.0; 21];
        data[10] = 100.0;
        let smoothed = SavitzkyGolay::default().smooth(&data);
        assert!(smoothed.iter().all(|v| *v >= 0.0));
        assert!(smoothed[10] > 0.0 && smoothed[10] < 100.0);
    }

    #[test_log::test]
    fn test_apply() {
        let spec = Spectrum::new("scan=3", 2, 1).with_mz_intensity(
            (0..15).map(|i| 500.0 + i as f64).collect(),
            vec![1.0; 15],
        );
        let FilterOutcome::Kept(out) = SavitzkyGolay::default().apply(spec) else {
            panic!("smoothing never drops");
        };
        for v in out.intensities().unwrap() {
            assert!((v - 1.0).abs() < 1e-5);
        }
    }
}
