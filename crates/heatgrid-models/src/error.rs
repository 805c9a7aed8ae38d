/// Errors from fitting or evaluating a regression model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Returned when n_estimators is zero.
    #[error("n_estimators must be at least 1, got {n_estimators}")]
    InvalidEstimatorCount {
        /// The invalid n_estimators value provided.
        n_estimators: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds n_features.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when the boosting learning rate is not in (0.0, 1.0].
    #[error("learning_rate must be in (0.0, 1.0], got {learning_rate}")]
    InvalidLearningRate {
        /// The invalid learning rate.
        learning_rate: f64,
    },

    /// Returned when bootstrap_fraction is not in (0.0, 1.0].
    #[error("bootstrap_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidBootstrapFraction {
        /// The invalid bootstrap_fraction value provided.
        fraction: f64,
    },

    /// Returned when a spline basis is too small for its polynomial order.
    #[error("n_splines must exceed spline_order ({spline_order}), got {n_splines}")]
    InvalidSplineCount {
        /// Requested number of basis functions per feature.
        n_splines: usize,
        /// Polynomial order of the basis.
        spline_order: usize,
    },

    /// Returned when a smoothing or complexity penalty is negative or not finite.
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidPenalty {
        /// Name of the offending parameter.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },

    /// Returned when an adaptive-spline model is asked for interaction terms.
    #[error("only max_degree = 1 (additive hinge terms) is supported, got {max_degree}")]
    UnsupportedDegree {
        /// The requested interaction degree.
        max_degree: usize,
    },

    /// Returned when max_terms cannot hold the intercept plus one hinge pair.
    #[error("max_terms must be at least 3, got {max_terms}")]
    InvalidTermCount {
        /// The invalid max_terms value.
        max_terms: usize,
    },

    /// Returned when a model family label is not recognised.
    #[error("unknown model family '{label}' (expected one of average, gbrf, mlr, rf, mars, gam)")]
    UnknownFamily {
        /// The label that failed to parse.
        label: String,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when the target length differs from the number of samples.
    #[error("target has {n_targets} values but the feature matrix has {n_samples} rows")]
    TargetLengthMismatch {
        /// Number of feature rows.
        n_samples: usize,
        /// Number of target values.
        n_targets: usize,
    },

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a target value is NaN or infinite.
    #[error("non-finite target at sample {sample_index}")]
    NonFiniteTarget {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the normal equations of a least-squares fit cannot be solved.
    #[error("{family}: design matrix is singular ({size} x {size} system)")]
    SingularMatrix {
        /// Label of the model family that failed.
        family: &'static str,
        /// Dimension of the linear system.
        size: usize,
    },
}
