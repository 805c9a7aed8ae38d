//! Ordinary least squares with an intercept.

use tracing::{debug, instrument};

use crate::{
    ModelError,
    linalg::{dot, solve_symmetric_aliased},
    validate::{validate_prediction, validate_training},
};

/// Multiple linear regression fitted by the normal equations.
///
/// Features are centered before forming `X^T X` so the intercept drops
/// out of the system and is recovered from the means. A rank-deficient
/// design still fits: a constant column, or one that is a linear
/// combination of earlier columns, is aliased and gets a zero slope.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinearRegression {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LinearRegression {
    /// Fit by least squares.
    ///
    /// # Errors
    ///
    /// Any input error from the shared training checks.
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit(features: &[Vec<f64>], target: &[f64]) -> Result<Self, ModelError> {
        let p = validate_training(features, target)?;
        let n = features.len() as f64;

        let mut x_mean = vec![0.0; p];
        for row in features {
            for (m, v) in x_mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        x_mean.iter_mut().for_each(|m| *m /= n);
        let y_mean = target.iter().sum::<f64>() / n;

        let mut xtx = vec![0.0; p * p];
        let mut xty = vec![0.0; p];
        let mut centered = vec![0.0; p];
        for (row, &y) in features.iter().zip(target) {
            for ((c, v), m) in centered.iter_mut().zip(row).zip(&x_mean) {
                *c = v - m;
            }
            let yc = y - y_mean;
            for i in 0..p {
                xty[i] += centered[i] * yc;
                for j in 0..=i {
                    xtx[i * p + j] += centered[i] * centered[j];
                }
            }
        }
        for i in 0..p {
            for j in 0..i {
                xtx[j * p + i] = xtx[i * p + j];
            }
        }

        let (coefficients, aliased) = solve_symmetric_aliased(&xtx, &xty, p);
        let intercept = y_mean - dot(&coefficients, &x_mean);
        debug!(intercept, ?aliased, "linear regression fitted");

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    /// Return the intercept.
    #[must_use]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Return the slope for each feature.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Predict every row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] on a row of the wrong width.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        validate_prediction(features, self.coefficients.len())?;
        Ok(features
            .iter()
            .map(|row| self.intercept + dot(&self.coefficients, row))
            .collect())
    }
}
