//! Partial dependence curves and their group-bootstrap replicates.

use heatgrid_models::{ModelFamily, ModelSuite, Regressor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::{
    EvalError,
    dataset::{Dataset, HoldoutGroup},
    holdout::collect_outcomes,
    pool::{CancellationToken, WorkerPool, unit_seeds},
    prepare::{FeatureMatrix, drop_non_predictive, separate_targets},
    record::{BatchReport, PdRecord, ResponsePeriod},
};

/// Grid points per feature unless overridden.
pub const DEFAULT_RESOLUTION: usize = 25;

/// Percentile of the feature distribution where the grid starts.
pub const GRID_LOWER_PERCENTILE: f64 = 1.0;

/// Percentile of the feature distribution where the grid ends.
pub const GRID_UPPER_PERCENTILE: f64 = 99.0;

/// Configuration for partial dependence.
///
/// # Defaults
///
/// | Parameter    | Default                       |
/// |--------------|-------------------------------|
/// | `features`   | `alb_mean`, `bldg`, `tree_mean` |
/// | `resolution` | 25                            |
/// | `periods`    | day, night                    |
/// | `families`   | the five non-null families    |
/// | `suite`      | [`ModelSuite::default`]       |
#[derive(Debug, Clone)]
pub struct DependenceConfig {
    features: Vec<String>,
    resolution: usize,
    periods: Vec<ResponsePeriod>,
    families: Vec<ModelFamily>,
    suite: ModelSuite,
}

impl DependenceConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            features: ["alb_mean", "bldg", "tree_mean"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            resolution: DEFAULT_RESOLUTION,
            periods: ResponsePeriod::BOTH.to_vec(),
            families: ModelFamily::FITTED.to_vec(),
            suite: ModelSuite::default(),
        }
    }

    /// Set the features of interest.
    #[must_use]
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    /// Set the number of grid points per feature.
    #[must_use]
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the response periods.
    #[must_use]
    pub fn with_periods(mut self, periods: Vec<ResponsePeriod>) -> Self {
        self.periods = periods;
        self
    }

    /// Set the fitted families.
    #[must_use]
    pub fn with_families(mut self, families: Vec<ModelFamily>) -> Self {
        self.families = families;
        self
    }

    /// Replace the model hyperparameters.
    #[must_use]
    pub fn with_suite(mut self, suite: ModelSuite) -> Self {
        self.suite = suite;
        self
    }

    /// Return the features of interest.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Return the grid resolution.
    #[must_use]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Return the response periods.
    #[must_use]
    pub fn periods(&self) -> &[ResponsePeriod] {
        &self.periods
    }

    /// Return the fitted families.
    #[must_use]
    pub fn families(&self) -> &[ModelFamily] {
        &self.families
    }

    /// Check the resolution and that every feature is a covariate of `dataset`.
    ///
    /// # Errors
    ///
    /// | Variant                          | When                               |
    /// |----------------------------------|------------------------------------|
    /// | [`EvalError::InvalidResolution`] | `resolution` is zero               |
    /// | [`EvalError::UnknownFeature`]    | a feature is not a covariate       |
    pub fn validate(&self, dataset: &Dataset) -> Result<(), EvalError> {
        if self.resolution == 0 {
            return Err(EvalError::InvalidResolution {
                resolution: self.resolution,
            });
        }
        for feature in &self.features {
            dataset.covariate_index(feature)?;
        }
        Ok(())
    }
}

impl Default for DependenceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The `q`-th percentile of `values`, `q` in `[0, 100]`.
///
/// Interpolates linearly between the two nearest order statistics.
/// Returns NaN for empty input.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `resolution` evenly spaced points from the 1st to the 99th percentile of `values`.
///
/// A single-point grid sits at the 1st percentile. A constant feature yields
/// `resolution` copies of its value.
#[must_use]
pub fn feature_grid(values: &[f64], resolution: usize) -> Vec<f64> {
    let lo = percentile(values, GRID_LOWER_PERCENTILE);
    let hi = percentile(values, GRID_UPPER_PERCENTILE);
    if resolution <= 1 {
        return vec![lo; resolution];
    }
    let step = (hi - lo) / (resolution - 1) as f64;
    (0..resolution).map(|k| lo + step * k as f64).collect()
}

fn unit_label(boot: Option<usize>, family: ModelFamily, period: ResponsePeriod) -> String {
    match boot {
        Some(b) => format!("boot-{b}/{family}/{period}"),
        None => format!("{family}/{period}"),
    }
}

/// Partial dependence of every configured model on every feature of interest.
///
/// Each (period, family) model is fitted once on all of `dataset`. For each
/// feature and grid point, the feature column is overwritten with the grid
/// value on every row and the mean prediction is recorded. Models run in
/// parallel on the current rayon pool; a model that fails to fit is reported
/// in [`BatchReport::failures`] and contributes no records.
///
/// # Errors
///
/// Fails before fitting anything if [`DependenceConfig::validate`] fails.
#[instrument(skip_all, fields(n_rows = dataset.len(), boot = ?boot))]
pub fn partial_dependence(
    dataset: &Dataset,
    config: &DependenceConfig,
    boot: Option<usize>,
) -> Result<BatchReport<PdRecord>, EvalError> {
    config.validate(dataset)?;
    let (table, targets) = separate_targets(dataset);
    let matrix = drop_non_predictive(table);
    let grids = config
        .features
        .iter()
        .map(|name| {
            let index = matrix.column_index(name)?;
            Ok((index, feature_grid(&matrix.column(index), config.resolution)))
        })
        .collect::<Result<Vec<_>, EvalError>>()?;

    let units: Vec<(ResponsePeriod, ModelFamily)> = config
        .periods
        .iter()
        .flat_map(|&p| config.families.iter().map(move |&f| (p, f)))
        .collect();

    let outcomes: Vec<(String, Result<Vec<PdRecord>, EvalError>)> = units
        .into_par_iter()
        .map(|(period, family)| {
            let outcome = dependence_curves(
                &matrix,
                targets.get(period),
                &grids,
                family,
                period,
                boot,
                &config.suite,
            );
            (unit_label(boot, family, period), outcome)
        })
        .collect();

    Ok(collect_outcomes(outcomes))
}

fn dependence_curves(
    matrix: &FeatureMatrix,
    target: &[f64],
    grids: &[(usize, Vec<f64>)],
    family: ModelFamily,
    period: ResponsePeriod,
    boot: Option<usize>,
    suite: &ModelSuite,
) -> Result<Vec<PdRecord>, EvalError> {
    let model = suite.fit(family, matrix.rows(), target)?;
    let mut scratch = matrix.rows().to_vec();
    let mut records = Vec::with_capacity(grids.iter().map(|(_, g)| g.len()).sum());
    for (index, grid) in grids {
        let name = &matrix.names()[*index];
        for &x in grid {
            scratch.iter_mut().for_each(|row| row[*index] = x);
            let predictions = model.predict(&scratch)?;
            let mean = predictions.iter().sum::<f64>() / predictions.len() as f64;
            records.push(PdRecord {
                model: family,
                dependent: period,
                independent: name.clone(),
                x,
                mean,
                boot,
            });
        }
        for (row, original) in scratch.iter_mut().zip(matrix.rows()) {
            row[*index] = original[*index];
        }
    }
    debug!(%family, %period, n_points = records.len(), "dependence curves computed");
    Ok(records)
}

/// Row indices of a group bootstrap resample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResample {
    groups: Vec<HoldoutGroup>,
    rows: Vec<usize>,
}

impl GroupResample {
    /// Sampled groups, in draw order; repeats allowed.
    #[must_use]
    pub fn groups(&self) -> &[HoldoutGroup] {
        &self.groups
    }

    /// Row indices of every sampled group, concatenated in draw order.
    #[must_use]
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }
}

/// Draw as many holdout groups as `dataset` has, with replacement.
///
/// Each draw contributes all rows of its group, so a group drawn twice
/// appears twice.
pub fn resample_groups(dataset: &Dataset, rng: &mut impl Rng) -> GroupResample {
    let groups: Vec<(HoldoutGroup, Vec<usize>)> = dataset.group_rows().into_iter().collect();
    let mut sampled = Vec::with_capacity(groups.len());
    let mut rows = Vec::with_capacity(dataset.len());
    for _ in 0..groups.len() {
        let (group, group_rows) = &groups[rng.gen_range(0..groups.len())];
        sampled.push(group.clone());
        rows.extend_from_slice(group_rows);
    }
    GroupResample {
        groups: sampled,
        rows,
    }
}

/// Partial dependence on `n_boot` group-bootstrap replicates.
///
/// Replicate `b` resamples groups with a generator seeded from a master
/// generator built from `seed` and tags its records with `boot = Some(b)`.
/// Replicates run in parallel on `pool`. Once `cancel` is set no further
/// replicate starts; the report then holds the replicates that ran.
///
/// # Errors
///
/// Fails before any replicate runs if [`DependenceConfig::validate`] fails.
#[instrument(skip_all, fields(n_boot = n_boot, n_rows = dataset.len()))]
pub fn bootstrap_partial_dependence(
    dataset: &Dataset,
    n_boot: usize,
    config: &DependenceConfig,
    pool: &WorkerPool,
    seed: Option<u64>,
    cancel: &CancellationToken,
) -> Result<BatchReport<PdRecord>, EvalError> {
    config.validate(dataset)?;
    let seeds = unit_seeds(seed, n_boot);

    let replicates: Vec<(usize, Result<BatchReport<PdRecord>, EvalError>)> = pool.install(|| {
        seeds
            .into_par_iter()
            .enumerate()
            .filter_map(|(b, boot_seed)| {
                if cancel.is_cancelled() {
                    return None;
                }
                let mut rng = ChaCha8Rng::seed_from_u64(boot_seed);
                let resample = resample_groups(dataset, &mut rng);
                let outcome = dataset
                    .select(resample.rows())
                    .and_then(|sample| partial_dependence(&sample, config, Some(b)));
                Some((b, outcome))
            })
            .collect()
    });

    let n_run = replicates.len();
    let mut report = BatchReport::new();
    for (b, outcome) in replicates {
        match outcome {
            Ok(replicate) => report.merge(replicate),
            Err(error) => report.merge(collect_outcomes::<PdRecord>([(
                format!("boot-{b}"),
                Err(error),
            )])),
        }
    }
    info!(
        n_run,
        n_skipped = n_boot - n_run,
        n_failed = report.failures.len(),
        "bootstrap replicates complete"
    );
    Ok(report)
}
