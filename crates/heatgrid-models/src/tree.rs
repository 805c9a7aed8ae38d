use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    ModelError,
    node::{Node, NodeIndex},
    split::find_best_split,
    validate::{to_columns, validate_prediction, validate_training},
};

/// Configuration for a single least-squares regression tree.
///
/// Construct via [`RegressionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 3201                  |
#[derive(Debug, Clone)]
pub struct RegressionTreeConfig {
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl RegressionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: crate::DEFAULT_SEED,
        }
    }

    /// Set the maximum tree depth (root is depth 0).
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

    /// Set the maximum number of features to consider at each split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed used to shuffle candidate features.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the growth parameters and resolve `max_features` against the data width.
    pub(crate) fn validate(&self, n_features: usize) -> Result<usize, ModelError> {
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(ModelError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(ModelError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(ModelError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(ModelError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }
        Ok(max_features)
    }

    /// Train a regression tree on the provided row-major dataset.
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                        |
    /// |----------------------------------------|---------------------------------------------|
    /// | [`ModelError::EmptyDataset`]           | `features` is empty                         |
    /// | [`ModelError::TargetLengthMismatch`]   | `target.len() != features.len()`            |
    /// | [`ModelError::ZeroFeatures`]           | rows have zero feature columns              |
    /// | [`ModelError::FeatureCountMismatch`]   | rows have inconsistent lengths              |
    /// | [`ModelError::NonFiniteValue`]         | any feature value is NaN or infinite        |
    /// | [`ModelError::NonFiniteTarget`]        | any target value is NaN or infinite         |
    /// | [`ModelError::InvalidMaxFeatures`]     | `max_features` outside `[1, n_features]`    |
    /// | [`ModelError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`                    |
    /// | [`ModelError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                     |
    /// | [`ModelError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                      |
    #[instrument(skip(self, features, target), fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], target: &[f64]) -> Result<RegressionTree, ModelError> {
        let n_features = validate_training(features, target)?;
        let max_features = self.validate(n_features)?;
        let columns = to_columns(features, n_features);
        let sample_indices: Vec<usize> = (0..features.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let tree = self.grow(&columns, target, &sample_indices, max_features, &mut rng);
        debug!(n_nodes = tree.n_nodes(), depth = tree.depth(), "regression tree built");
        Ok(tree)
    }

    /// Grow a tree on already-validated column-major data.
    ///
    /// `sample_indices` may contain duplicates (bootstrap draws).
    pub(crate) fn grow(
        &self,
        columns: &[Vec<f64>],
        target: &[f64],
        sample_indices: &[usize],
        max_features: usize,
        rng: &mut impl Rng,
    ) -> RegressionTree {
        let mut arena: Vec<Node> = Vec::new();
        build_tree(
            columns,
            target,
            sample_indices,
            self,
            0,
            rng,
            &mut arena,
            max_features,
        );
        RegressionTree {
            nodes: arena,
            n_features: columns.len(),
        }
    }
}

impl Default for RegressionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively build the arena-based regression tree.
///
/// Returns the [`NodeIndex`] of the node just created in `arena`.
#[allow(clippy::too_many_arguments)]
fn build_tree(
    columns: &[Vec<f64>],
    target: &[f64],
    sample_indices: &[usize],
    config: &RegressionTreeConfig,
    depth: usize,
    rng: &mut impl Rng,
    arena: &mut Vec<Node>,
    max_features: usize,
) -> NodeIndex {
    let n_samples = sample_indices.len();
    let mean = if n_samples == 0 {
        0.0
    } else {
        sample_indices.iter().map(|&si| target[si]).sum::<f64>() / n_samples as f64
    };

    let make_leaf = |arena: &mut Vec<Node>| -> NodeIndex {
        let idx = arena.len();
        arena.push(Node::Leaf {
            value: mean,
            n_samples,
        });
        NodeIndex::new(idx)
    };

    let depth_exceeded = config.max_depth.is_some_and(|max_d| depth >= max_d);
    if n_samples < config.min_samples_split || depth_exceeded {
        return make_leaf(arena);
    }

    let Some(split) = find_best_split(
        columns,
        target,
        sample_indices,
        max_features,
        config.min_samples_leaf,
        rng,
    ) else {
        return make_leaf(arena);
    };

    // Reserve the slot, recurse, then overwrite with the split.
    let node_idx = arena.len();
    arena.push(Node::Leaf {
        value: mean,
        n_samples,
    });

    let left = build_tree(
        columns,
        target,
        &split.left_indices,
        config,
        depth + 1,
        rng,
        arena,
        max_features,
    );
    let right = build_tree(
        columns,
        target,
        &split.right_indices,
        config,
        depth + 1,
        rng,
        arena,
        max_features,
    );

    arena[node_idx] = Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
        n_samples,
        impurity_decrease: split.impurity_decrease,
    };

    NodeIndex::new(node_idx)
}

/// A fitted least-squares regression tree.
///
/// Stored as an arena-based `Vec<Node>`; the root is at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegressionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl RegressionTree {
    /// Predict every row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] when a row has the
    /// wrong width.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        validate_prediction(features, self.n_features)?;
        Ok(features.iter().map(|row| self.predict_row(row)).collect())
    }

    /// Predict one row of known width.
    pub(crate) fn predict_row(&self, sample: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match self.nodes[idx].route(sample) {
                Ok(value) => return value,
                Err(child) => idx = child.index(),
            }
        }
    }

    /// Accumulate unnormalized squared-error decreases per feature into `totals`.
    pub(crate) fn accumulate_importances(&self, totals: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
    }

    /// Mean decrease in squared error per feature, normalized to sum to 1.0.
    ///
    /// All zeros when the tree is a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        self.accumulate_importances(&mut totals);
        crate::normalize_in_place(&mut totals);
        totals
    }

    /// Return the total number of nodes in the tree.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a single leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));
        while let Some((node_idx, d)) = queue.pop_front() {
            match self.nodes[node_idx].children() {
                None => max_depth = max_depth.max(d),
                Some((left, right)) => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }
        max_depth
    }
}
