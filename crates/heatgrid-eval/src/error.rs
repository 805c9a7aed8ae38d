use heatgrid_models::ModelError;

/// Errors from dataset construction and the evaluation drivers.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// A model family failed to fit or predict.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Returned when a dataset would contain zero observations.
    #[error("dataset has zero observations")]
    EmptyDataset,

    /// Returned when an observation's covariate vector has the wrong length.
    #[error("observation {row_index} has {got} covariates, expected {expected}")]
    CovariateCountMismatch {
        /// Zero-based row index.
        row_index: usize,
        /// Number of covariate names in the schema.
        expected: usize,
        /// Number of values on the row.
        got: usize,
    },

    /// Returned when a covariate, coordinate or response value is NaN or infinite.
    #[error("non-finite value in column '{column}' at observation {row_index}")]
    NonFiniteValue {
        /// Zero-based row index.
        row_index: usize,
        /// Name of the offending column.
        column: String,
    },

    /// Returned when two covariates share a name.
    #[error("duplicate covariate name '{name}'")]
    DuplicateCovariate {
        /// The repeated name.
        name: String,
    },

    /// Returned when a covariate uses the name of an identifier or response column.
    #[error("covariate name '{name}' is reserved")]
    ReservedCovariate {
        /// The reserved name.
        name: String,
    },

    /// Returned when a holdout test fraction is outside `[0, 1)`.
    #[error("test_fraction must be in [0, 1), got {test_fraction}")]
    InvalidTestFraction {
        /// The invalid fraction.
        test_fraction: f64,
    },

    /// Returned when the splitter damping factor is outside `(0, 1]`.
    #[error("damping must be in (0, 1], got {damping}")]
    InvalidDamping {
        /// The invalid damping factor.
        damping: f64,
    },

    /// Returned when a partial-dependence grid would have zero points.
    #[error("feature_resolution must be at least 1, got {resolution}")]
    InvalidResolution {
        /// The invalid resolution.
        resolution: usize,
    },

    /// Returned when a driver is asked for zero trials per candidate.
    #[error("holdout_trials must be at least 1, got {trials}")]
    InvalidTrialCount {
        /// The invalid trial count.
        trials: usize,
    },

    /// Returned when a leave-one-city-out or scoped run names a city with no rows.
    #[error("unknown city '{city}'")]
    UnknownCity {
        /// The city that was not found.
        city: String,
    },

    /// Returned when a feature of interest or selected variable is not a covariate.
    #[error("unknown feature '{name}'")]
    UnknownFeature {
        /// The missing feature name.
        name: String,
    },

    /// Returned when train and test feature matrices disagree on columns.
    #[error("train and test feature columns differ: train {train:?}, test {test:?}")]
    SchemaMismatch {
        /// Train column names.
        train: Vec<String>,
        /// Test column names.
        test: Vec<String>,
    },

    /// Returned when a split leaves no rows on one side.
    #[error("split has {n_train} train and {n_test} test rows; both must be non-empty")]
    DegenerateSplit {
        /// Number of train rows.
        n_train: usize,
        /// Number of test rows.
        n_test: usize,
    },

    /// Returned when forward selection has no candidate features to choose from.
    #[error("no candidate features remain after exclusions")]
    NoCandidates,

    /// Returned when the worker pool cannot be built.
    #[error("cannot build worker pool with {n_workers} threads")]
    WorkerPool {
        /// Requested thread count.
        n_workers: usize,
        /// Underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },
}
