//! Random forest regression with parallel tree construction.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::{
    ModelError,
    tree::{RegressionTree, RegressionTreeConfig},
    validate::{to_columns, validate_prediction, validate_training},
};

/// Strategy for determining the number of features to consider at each split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// Square root of total features.
    Sqrt,
    /// A fraction of total features, floored, never below one.
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

/// Resolve `MaxFeatures` to a concrete count.
pub(crate) fn resolve_max_features(
    max_features: MaxFeatures,
    n_features: usize,
) -> Result<usize, ModelError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
        MaxFeatures::Fraction(f) if f > 0.0 && f <= 1.0 => {
            ((n_features as f64 * f).floor() as usize).max(1)
        }
        MaxFeatures::Fraction(_) => 0,
        MaxFeatures::Fixed(n) => n,
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(ModelError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Configuration for random forest regression.
///
/// # Defaults
///
/// | Parameter            | Default               |
/// |----------------------|-----------------------|
/// | `n_trees`            | 500                   |
/// | `max_features`       | `Fraction(1.0 / 3.0)` |
/// | `max_depth`          | `None`                |
/// | `min_samples_split`  | 2                     |
/// | `min_samples_leaf`   | 1                     |
/// | `bootstrap_fraction` | 1.0                   |
/// | `seed`               | 3201                  |
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) bootstrap_fraction: f64,
    pub(crate) seed: u64,
}

impl RandomForestConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_trees: 500,
            max_features: MaxFeatures::Fraction(1.0 / 3.0),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap_fraction: 1.0,
            seed: crate::DEFAULT_SEED,
        }
    }

    /// Set the number of trees.
    #[must_use]
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the max features strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the fraction of the training set drawn (with replacement) per tree.
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, fraction: f64) -> Self {
        self.bootstrap_fraction = fraction;
        self
    }

    /// Set the master seed from which per-tree seeds are drawn.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the max features strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train the forest.
    ///
    /// # Errors
    ///
    /// Any input error from [`RegressionTreeConfig::fit`], plus:
    ///
    /// | Variant                                  | When                             |
    /// |------------------------------------------|----------------------------------|
    /// | [`ModelError::InvalidEstimatorCount`]    | `n_trees` is zero                |
    /// | [`ModelError::InvalidBootstrapFraction`] | fraction not in `(0.0, 1.0]`     |
    #[instrument(skip_all, fields(n_trees = self.n_trees, n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], target: &[f64]) -> Result<RandomForest, ModelError> {
        if self.n_trees == 0 {
            return Err(ModelError::InvalidEstimatorCount {
                n_estimators: self.n_trees,
            });
        }
        let n_features = validate_training(features, target)?;
        let max_features = resolve_max_features(self.max_features, n_features)?;
        if !(self.bootstrap_fraction > 0.0 && self.bootstrap_fraction <= 1.0) {
            return Err(ModelError::InvalidBootstrapFraction {
                fraction: self.bootstrap_fraction,
            });
        }

        let tree_config = RegressionTreeConfig::new()
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(Some(max_features));
        tree_config.validate(n_features)?;

        let n_samples = features.len();
        let draw_count = ((n_samples as f64) * self.bootstrap_fraction).ceil() as usize;
        let columns = to_columns(features, n_features);

        debug!(n_features, max_features, draw_count, "training random forest");

        let mut master_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.n_trees).map(|_| master_rng.r#gen()).collect();

        let trees: Vec<RegressionTree> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let bootstrap: Vec<usize> = (0..draw_count)
                    .map(|_| rng.gen_range(0..n_samples))
                    .collect();
                tree_config.grow(&columns, target, &bootstrap, max_features, &mut rng)
            })
            .collect();

        Ok(RandomForest { trees, n_features })
    }
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A fitted random forest; predictions average the trees.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<RegressionTree>,
    pub(crate) n_features: usize,
}

impl RandomForest {
    /// Predict every row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] on a row of the wrong width.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        validate_prediction(features, self.n_features)?;
        let n_trees = self.trees.len() as f64;
        Ok(features
            .iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    /// Mean decrease in squared error per feature, summed over trees and normalized.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.accumulate_importances(&mut totals);
        }
        crate::normalize_in_place(&mut totals);
        totals
    }

    /// Return the fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}
