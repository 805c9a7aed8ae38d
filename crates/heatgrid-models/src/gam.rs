//! Penalized additive model with one cubic B-spline smooth per feature.

use tracing::{debug, instrument};

use crate::{
    ModelError,
    linalg::solve_symmetric,
    validate::{to_columns, validate_prediction, validate_training},
};

/// Ridge added to every spline coefficient, per training sample.
///
/// Each feature block is a partition of unity, so blocks are collinear with
/// the intercept and with each other; this keeps the system definite.
const SPLINE_RIDGE: f64 = 1e-6;

/// Uniform B-spline basis over the training range of one feature.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct SplineBasis {
    lo: f64,
    hi: f64,
    n_splines: usize,
    order: usize,
}

impl SplineBasis {
    fn new(column: &[f64], n_splines: usize, order: usize) -> Self {
        let lo = column.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi <= lo {
            hi = lo + 1.0;
        }
        Self {
            lo,
            hi,
            n_splines,
            order,
        }
    }

    fn n_intervals(&self) -> usize {
        self.n_splines - self.order
    }

    fn knot(&self, k: usize) -> f64 {
        let h = (self.hi - self.lo) / self.n_intervals() as f64;
        self.lo + (k as f64 - self.order as f64) * h
    }

    /// Index of the first non-zero basis function at `x`, and the
    /// `order + 1` non-zero values starting there.
    ///
    /// `x` is clamped to the training range.
    fn eval(&self, x: f64) -> (usize, Vec<f64>) {
        let x = x.clamp(self.lo, self.hi);
        let p = self.order;
        let h = (self.hi - self.lo) / self.n_intervals() as f64;
        let interval = (((x - self.lo) / h).floor() as usize).min(self.n_intervals() - 1);
        let span = interval + p;

        let mut values = vec![0.0; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        values[0] = 1.0;
        for j in 1..=p {
            left[j] = x - self.knot(span + 1 - j);
            right[j] = self.knot(span + j) - x;
            let mut saved = 0.0;
            for r in 0..j {
                let temp = values[r] / (right[r + 1] + left[j - r]);
                values[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            values[j] = saved;
        }
        (span - p, values)
    }
}

/// Configuration for the additive spline model.
///
/// # Defaults
///
/// | Parameter      | Default |
/// |----------------|---------|
/// | `n_splines`    | 10      |
/// | `spline_order` | 3       |
/// | `lam`          | 0.6     |
#[derive(Debug, Clone)]
pub struct GamConfig {
    pub(crate) n_splines: usize,
    pub(crate) spline_order: usize,
    pub(crate) lam: f64,
}

impl GamConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_splines: 10,
            spline_order: 3,
            lam: 0.6,
        }
    }

    /// Set the number of basis functions per feature.
    #[must_use]
    pub fn with_n_splines(mut self, n_splines: usize) -> Self {
        self.n_splines = n_splines;
        self
    }

    /// Set the polynomial degree of the basis.
    #[must_use]
    pub fn with_spline_order(mut self, spline_order: usize) -> Self {
        self.spline_order = spline_order;
        self
    }

    /// Set the weight of the second-difference smoothness penalty.
    #[must_use]
    pub fn with_lam(mut self, lam: f64) -> Self {
        self.lam = lam;
        self
    }

    /// Return the number of basis functions per feature.
    #[must_use]
    pub fn n_splines(&self) -> usize {
        self.n_splines
    }

    /// Return the smoothing weight.
    #[must_use]
    pub fn lam(&self) -> f64 {
        self.lam
    }

    /// Fit by penalized least squares.
    ///
    /// # Errors
    ///
    /// | Variant                            | When                                  |
    /// |------------------------------------|---------------------------------------|
    /// | [`ModelError::InvalidSplineCount`] | `n_splines <= spline_order`           |
    /// | [`ModelError::InvalidPenalty`]     | `lam` negative or non-finite          |
    /// | [`ModelError::SingularMatrix`]     | the penalized system cannot be solved |
    ///
    /// plus any input error from the shared training checks.
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], target: &[f64]) -> Result<Gam, ModelError> {
        if self.n_splines <= self.spline_order {
            return Err(ModelError::InvalidSplineCount {
                n_splines: self.n_splines,
                spline_order: self.spline_order,
            });
        }
        if !self.lam.is_finite() || self.lam < 0.0 {
            return Err(ModelError::InvalidPenalty {
                name: "lam",
                value: self.lam,
            });
        }
        let n_features = validate_training(features, target)?;
        let columns = to_columns(features, n_features);
        let bases: Vec<SplineBasis> = columns
            .iter()
            .map(|c| SplineBasis::new(c, self.n_splines, self.spline_order))
            .collect();

        let k = 1 + n_features * self.n_splines;
        let mut gram = vec![0.0; k * k];
        let mut rhs = vec![0.0; k];

        let mut entries: Vec<(usize, f64)> = Vec::with_capacity(1 + n_features * (self.spline_order + 1));
        for (row, &y) in features.iter().zip(target) {
            entries.clear();
            entries.push((0, 1.0));
            for (feat_idx, basis) in bases.iter().enumerate() {
                let offset = 1 + feat_idx * self.n_splines;
                let (first, values) = basis.eval(row[feat_idx]);
                entries.extend(values.iter().enumerate().map(|(j, &v)| (offset + first + j, v)));
            }
            for &(i, vi) in &entries {
                rhs[i] += vi * y;
                for &(j, vj) in &entries {
                    gram[i * k + j] += vi * vj;
                }
            }
        }

        let ridge = SPLINE_RIDGE * features.len() as f64;
        for feat_idx in 0..n_features {
            let offset = 1 + feat_idx * self.n_splines;
            for i in 0..self.n_splines {
                gram[(offset + i) * k + offset + i] += ridge;
            }
            // lam * D2^T D2, where each row of D2 is [1, -2, 1].
            for r in 0..self.n_splines.saturating_sub(2) {
                let stencil = [(r, 1.0), (r + 1, -2.0), (r + 2, 1.0)];
                for &(a, wa) in &stencil {
                    for &(b, wb) in &stencil {
                        gram[(offset + a) * k + offset + b] += self.lam * wa * wb;
                    }
                }
            }
        }

        let coefficients = solve_symmetric(&gram, &rhs, k).ok_or(ModelError::SingularMatrix {
            family: "gam",
            size: k,
        })?;
        debug!(n_coefficients = k, "gam fitted");

        Ok(Gam {
            bases,
            coefficients,
        })
    }
}

impl Default for GamConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A fitted additive spline model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Gam {
    bases: Vec<SplineBasis>,
    coefficients: Vec<f64>,
}

impl Gam {
    /// Predict every row of `features`. Values outside the training range
    /// of a feature are clamped to it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] on a row of the wrong width.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        validate_prediction(features, self.bases.len())?;
        Ok(features
            .iter()
            .map(|row| {
                let mut total = self.coefficients[0];
                for (feat_idx, basis) in self.bases.iter().enumerate() {
                    let offset = 1 + feat_idx * basis.n_splines;
                    let (first, values) = basis.eval(row[feat_idx]);
                    for (j, v) in values.iter().enumerate() {
                        total += self.coefficients[offset + first + j] * v;
                    }
                }
                total
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_is_partition_of_unity() {
        let basis = SplineBasis::new(&[0.0, 7.0], 10, 3);
        for x in [0.0, 0.3, 1.0, 3.5, 6.99, 7.0] {
            let (first, values) = basis.eval(x);
            let sum: f64 = values.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "x = {x}, sum = {sum}");
            assert!(first + values.len() <= 10);
            assert!(values.iter().all(|&v| v >= -1e-15));
        }
    }

    #[test]
    fn fits_smooth_curve() {
        let features: Vec<Vec<f64>> = (0..120).map(|i| vec![f64::from(i) * 0.05]).collect();
        let target: Vec<f64> = features.iter().map(|r| r[0].sin()).collect();
        let model = GamConfig::new().fit(&features, &target).unwrap();
        let preds = model.predict(&features).unwrap();
        let mae = preds
            .iter()
            .zip(&target)
            .map(|(p, y)| (p - y).abs())
            .sum::<f64>()
            / target.len() as f64;
        assert!(mae < 0.05, "mae = {mae}");
    }

    #[test]
    fn additive_in_two_features() {
        let features: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![f64::from(i % 10), f64::from(i / 10)])
            .collect();
        let target: Vec<f64> = features.iter().map(|r| r[0] + 2.0 * r[1]).collect();
        let model = GamConfig::new().fit(&features, &target).unwrap();
        let pred = model.predict(&[vec![4.0, 5.0]]).unwrap();
        assert!((pred[0] - 14.0).abs() < 0.1, "pred = {}", pred[0]);
    }

    #[test]
    fn constant_feature_does_not_break_fit() {
        let features: Vec<Vec<f64>> = (0..30).map(|i| vec![f64::from(i), 1.0]).collect();
        let target: Vec<f64> = (0..30).map(f64::from).collect();
        let model = GamConfig::new().fit(&features, &target).unwrap();
        let pred = model.predict(&[vec![10.0, 1.0]]).unwrap();
        assert!((pred[0] - 10.0).abs() < 0.1);
    }

    #[test]
    fn too_few_splines_rejected() {
        let err = GamConfig::new()
            .with_n_splines(3)
            .fit(&[vec![0.0], vec![1.0]], &[0.0, 1.0])
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidSplineCount {
                n_splines: 3,
                spline_order: 3
            }
        );
    }
}
