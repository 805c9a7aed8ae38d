//! Least-squares gradient boosting over shallow regression trees.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    ModelError,
    tree::{RegressionTree, RegressionTreeConfig},
    validate::{to_columns, validate_prediction, validate_training},
};

/// Configuration for gradient-boosted regression trees.
///
/// Each stage fits a tree to the current residuals and adds it to the
/// ensemble scaled by `learning_rate`. The initial prediction is the
/// training mean.
///
/// # Defaults
///
/// | Parameter          | Default |
/// |--------------------|---------|
/// | `n_estimators`     | 500     |
/// | `learning_rate`    | 0.1     |
/// | `max_depth`        | 2       |
/// | `min_samples_leaf` | 1       |
/// | `seed`             | 3201    |
#[derive(Debug, Clone)]
pub struct GradientBoostingConfig {
    pub(crate) n_estimators: usize,
    pub(crate) learning_rate: f64,
    pub(crate) max_depth: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) seed: u64,
}

impl GradientBoostingConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_estimators: 500,
            learning_rate: 0.1,
            max_depth: 2,
            min_samples_leaf: 1,
            seed: crate::DEFAULT_SEED,
        }
    }

    /// Set the number of boosting stages.
    #[must_use]
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set the shrinkage applied to each stage.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the depth of each stage tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the seed for tie-breaking among candidate features.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of boosting stages.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    /// Return the learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Return the stage tree depth.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Return the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fit the ensemble.
    ///
    /// # Errors
    ///
    /// Any input error from [`RegressionTreeConfig::fit`], plus:
    ///
    /// | Variant                               | When                          |
    /// |---------------------------------------|-------------------------------|
    /// | [`ModelError::InvalidEstimatorCount`] | `n_estimators` is zero        |
    /// | [`ModelError::InvalidLearningRate`]   | rate not in `(0.0, 1.0]`      |
    #[instrument(skip_all, fields(n_estimators = self.n_estimators, n_samples = features.len()))]
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        target: &[f64],
    ) -> Result<GradientBoosting, ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidEstimatorCount {
                n_estimators: self.n_estimators,
            });
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ModelError::InvalidLearningRate {
                learning_rate: self.learning_rate,
            });
        }
        let n_features = validate_training(features, target)?;
        let tree_config = RegressionTreeConfig::new()
            .with_max_depth(Some(self.max_depth))
            .with_min_samples_leaf(self.min_samples_leaf);
        let max_features = tree_config.validate(n_features)?;

        let columns = to_columns(features, n_features);
        let n_samples = target.len();
        let sample_indices: Vec<usize> = (0..n_samples).collect();
        let init = target.iter().sum::<f64>() / n_samples as f64;

        let mut current = vec![init; n_samples];
        let mut residual = vec![0.0; n_samples];
        let mut stages = Vec::with_capacity(self.n_estimators);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        for _ in 0..self.n_estimators {
            for ((r, y), f) in residual.iter_mut().zip(target).zip(&current) {
                *r = y - f;
            }
            let tree = tree_config.grow(&columns, &residual, &sample_indices, max_features, &mut rng);
            for (f, row) in current.iter_mut().zip(features) {
                *f += self.learning_rate * tree.predict_row(row);
            }
            stages.push(tree);
        }

        let train_mse = current
            .iter()
            .zip(target)
            .map(|(f, y)| (y - f).powi(2))
            .sum::<f64>()
            / n_samples as f64;
        debug!(train_mse, "gradient boosting fitted");

        Ok(GradientBoosting {
            init,
            learning_rate: self.learning_rate,
            stages,
            n_features,
        })
    }
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A fitted gradient-boosted ensemble.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoosting {
    /// Predict every row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] on a row of the wrong width.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        validate_prediction(features, self.n_features)?;
        Ok(features
            .iter()
            .map(|row| {
                self.init
                    + self.learning_rate
                        * self.stages.iter().map(|t| t.predict_row(row)).sum::<f64>()
            })
            .collect())
    }

    /// Squared-error decrease per feature over all stages, normalized.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.stages {
            tree.accumulate_importances(&mut totals);
        }
        crate::normalize_in_place(&mut totals);
        totals
    }

    /// Return the number of fitted stages.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let features: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![f64::from(i) / 10.0, f64::from((i * 7) % 11)])
            .collect();
        let target: Vec<f64> = features.iter().map(|r| r[0] * r[0]).collect();
        (features, target)
    }

    #[test]
    fn fits_quadratic_closely() {
        let (features, target) = make_data();
        let model = GradientBoostingConfig::new()
            .with_n_estimators(200)
            .fit(&features, &target)
            .unwrap();
        let preds = model.predict(&features).unwrap();
        let mae = preds
            .iter()
            .zip(&target)
            .map(|(p, y)| (p - y).abs())
            .sum::<f64>()
            / target.len() as f64;
        assert!(mae < 0.5, "mae = {mae}");
        assert_eq!(model.n_stages(), 200);
    }

    #[test]
    fn constant_target_predicts_constant() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let model = GradientBoostingConfig::new()
            .with_n_estimators(5)
            .fit(&features, &[7.0; 3])
            .unwrap();
        for p in model.predict(&[vec![0.0], vec![9.0]]).unwrap() {
            assert!((p - 7.0).abs() < 1e-12);
        }
    }

    #[test]
    fn informative_feature_dominates_importance() {
        let (features, target) = make_data();
        let model = GradientBoostingConfig::new()
            .with_n_estimators(50)
            .fit(&features, &target)
            .unwrap();
        let imp = model.feature_importances();
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn invalid_learning_rate_rejected() {
        let (features, target) = make_data();
        let err = GradientBoostingConfig::new()
            .with_learning_rate(0.0)
            .fit(&features, &target)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidLearningRate { .. }));
    }
}
