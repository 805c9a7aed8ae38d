//! Spatial holdout evaluation of land-surface-temperature models.
//!
//! Splits grid cells by holdout group or by city, scores every model
//! family out of sample, sweeps partial dependence with group-bootstrap
//! replicates, derives swing importance and ranks covariates by greedy
//! forward selection. Independent units run on a bounded [`WorkerPool`].

mod city;
mod dataset;
mod dependence;
mod error;
mod holdout;
mod metrics;
mod pool;
mod prepare;
mod record;
mod scoped;
mod selection;
mod split;
mod swing;

pub use city::{city_holdout_id, city_split, evaluate_leave_one_city_out};
pub use dataset::{CityId, Dataset, HoldoutGroup, Observation, RESERVED_COLUMNS};
pub use dependence::{
    DEFAULT_RESOLUTION, DependenceConfig, GRID_LOWER_PERCENTILE, GRID_UPPER_PERCENTILE,
    GroupResample, bootstrap_partial_dependence, feature_grid, partial_dependence, percentile,
    resample_groups,
};
pub use error::EvalError;
pub use holdout::{HoldoutConfig, evaluate_n, evaluate_once};
pub use metrics::{mean_absolute_error, r2_score};
pub use pool::{CancellationToken, DEFAULT_MAX_WORKERS, WorkerPool};
pub use prepare::{
    FeatureMatrix, FeatureTable, PreparedSplit, ResponseBundle, Targets, drop_non_predictive,
    ensure_aligned, pair_responses, prepare_split, separate_targets,
};
pub use record::{
    BatchReport, ErrorMetric, PdRecord, ResponsePeriod, ResultRecord, SwingRecord, TimeOfDay,
    TrialFailure,
};
pub use scoped::{ScopedModel, fit_scoped_models};
pub use selection::{
    CityScope, SelectionConfig, SelectionStep, SelectionTrace, select_features,
    select_features_for_scopes,
};
pub use split::{DEFAULT_FILL_DAMPING, HoldoutSplitter, Split};
pub use swing::compute_swing;
