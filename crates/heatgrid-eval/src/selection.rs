//! Greedy forward feature selection scored by holdout MAE of boosted trees.

use std::fmt;

use heatgrid_models::GradientBoostingConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::{
    EvalError,
    dataset::{CityId, Dataset},
    metrics::mean_absolute_error,
    pool::{CancellationToken, WorkerPool, unit_seeds},
    prepare::{FeatureMatrix, drop_non_predictive, separate_targets},
    record::ResponsePeriod,
    split::HoldoutSplitter,
};

/// Configuration for forward selection.
///
/// # Defaults
///
/// | Parameter           | Default                          |
/// |---------------------|----------------------------------|
/// | `holdout_trials`    | 25                               |
/// | `test_fraction`     | 0.25                             |
/// | `gradient_boosting` | [`GradientBoostingConfig::new`]  |
/// | `excluded`          | `area`                           |
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    holdout_trials: usize,
    test_fraction: f64,
    gradient_boosting: GradientBoostingConfig,
    excluded: Vec<String>,
}

impl SelectionConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            holdout_trials: 25,
            test_fraction: 0.25,
            gradient_boosting: GradientBoostingConfig::new(),
            excluded: vec!["area".to_owned()],
        }
    }

    /// Set the number of holdout trials averaged per candidate.
    #[must_use]
    pub fn with_holdout_trials(mut self, holdout_trials: usize) -> Self {
        self.holdout_trials = holdout_trials;
        self
    }

    /// Set the holdout test fraction.
    #[must_use]
    pub fn with_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    /// Replace the boosted-tree hyperparameters.
    #[must_use]
    pub fn with_gradient_boosting(mut self, config: GradientBoostingConfig) -> Self {
        self.gradient_boosting = config;
        self
    }

    /// Set covariates that are never candidates.
    #[must_use]
    pub fn with_excluded(mut self, excluded: Vec<String>) -> Self {
        self.excluded = excluded;
        self
    }

    /// Return the trials per candidate.
    #[must_use]
    pub fn holdout_trials(&self) -> usize {
        self.holdout_trials
    }

    /// Return the test fraction.
    #[must_use]
    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    /// Return the boosted-tree hyperparameters.
    #[must_use]
    pub fn gradient_boosting(&self) -> &GradientBoostingConfig {
        &self.gradient_boosting
    }

    /// Return the excluded covariates.
    #[must_use]
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows a selection or scoped fit runs on.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CityScope {
    /// Every city pooled.
    All,
    /// One city's rows.
    City(CityId),
}

impl CityScope {
    /// `All` followed by one scope per city of `dataset`.
    #[must_use]
    pub fn every(dataset: &Dataset) -> Vec<CityScope> {
        std::iter::once(CityScope::All)
            .chain(dataset.cities().into_iter().map(CityScope::City))
            .collect()
    }

    /// The rows of `dataset` inside this scope.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::UnknownCity`] for a city with no rows.
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset, EvalError> {
        match self {
            CityScope::All => Ok(dataset.clone()),
            CityScope::City(city) => dataset.restrict_to_city(city),
        }
    }
}

impl fmt::Display for CityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CityScope::All => f.write_str("all"),
            CityScope::City(city) => city.fmt(f),
        }
    }
}

/// One accepted feature and the mean holdout MAE with it added.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SelectionStep {
    /// Feature added at this step.
    pub feature: String,
    /// Mean MAE over the step's holdout trials.
    pub mae: f64,
}

/// Selection order and MAE trajectory for one scope and period.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SelectionTrace {
    /// Rows the selection ran on.
    pub scope: CityScope,
    /// Response predicted.
    pub period: ResponsePeriod,
    /// Accepted features, in order.
    pub steps: Vec<SelectionStep>,
    /// `false` when cancellation stopped selection before every candidate was ranked.
    pub completed: bool,
}

impl SelectionTrace {
    /// Selected feature names, in order.
    #[must_use]
    pub fn features(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.feature.clone()).collect()
    }
}

/// Rank every candidate covariate by greedy forward selection.
///
/// Starting from no features, each outer step scores every remaining
/// candidate by adding it to the selected set and averaging the test MAE
/// of a boosted-tree model over `holdout_trials` group-respecting splits.
/// All candidates in a step share the same splits. The candidate with the
/// lowest mean MAE is accepted; ties go to the earlier covariate. A
/// candidate whose trials fail is skipped for that step with a warning.
///
/// Candidate trials run in parallel on `pool`. `cancel` is checked before
/// each outer step.
///
/// # Errors
///
/// | Variant                            | When                                     |
/// |------------------------------------|------------------------------------------|
/// | [`EvalError::UnknownCity`]         | `scope` names a city with no rows        |
/// | [`EvalError::InvalidTestFraction`] | fraction outside `[0, 1)`                |
/// | [`EvalError::InvalidTrialCount`]   | `holdout_trials` is zero                 |
/// | [`EvalError::NoCandidates`]        | every covariate is excluded              |
/// | any trial error                    | every remaining candidate failed a step  |
#[instrument(skip_all, fields(scope = %scope, period = %period))]
pub fn select_features(
    dataset: &Dataset,
    scope: &CityScope,
    period: ResponsePeriod,
    config: &SelectionConfig,
    pool: &WorkerPool,
    seed: Option<u64>,
    cancel: &CancellationToken,
) -> Result<SelectionTrace, EvalError> {
    let scoped = scope.apply(dataset)?;
    let splitter = HoldoutSplitter::new(config.test_fraction)?;
    if config.holdout_trials == 0 {
        return Err(EvalError::InvalidTrialCount {
            trials: config.holdout_trials,
        });
    }
    let mut candidates: Vec<String> = scoped
        .covariate_names()
        .iter()
        .filter(|n| !config.excluded.contains(n))
        .cloned()
        .collect();
    if candidates.is_empty() {
        return Err(EvalError::NoCandidates);
    }

    let (table, targets) = separate_targets(&scoped);
    let matrix = drop_non_predictive(table);
    let target = targets.get(period);
    let mut master = match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    };

    let mut selected: Vec<String> = Vec::with_capacity(candidates.len());
    let mut steps = Vec::with_capacity(candidates.len());
    while !candidates.is_empty() {
        if cancel.is_cancelled() {
            info!(n_selected = steps.len(), "selection cancelled");
            break;
        }
        let trial_seeds = unit_seeds(Some(master.r#gen()), config.holdout_trials);

        let scores: Vec<Result<f64, EvalError>> = pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| {
                    let mut columns = selected.clone();
                    columns.push(candidate.clone());
                    let features = matrix.select_columns(&columns)?;
                    mean_holdout_mae(&scoped, &features, target, &splitter, config, &trial_seeds)
                })
                .collect()
        });

        let mut best: Option<(usize, f64)> = None;
        let mut first_error = None;
        for (i, score) in scores.into_iter().enumerate() {
            match score {
                Ok(mae) if best.is_none_or(|(_, b)| mae < b) => best = Some((i, mae)),
                Ok(_) => {}
                Err(error) => {
                    warn!(candidate = %candidates[i], %error, "candidate failed");
                    first_error.get_or_insert(error);
                }
            }
        }
        let Some((index, mae)) = best else {
            return Err(first_error.unwrap_or(EvalError::NoCandidates));
        };
        let feature = candidates.remove(index);
        debug!(%feature, mae, step = steps.len(), "accepted feature");
        selected.push(feature.clone());
        steps.push(SelectionStep { feature, mae });
    }

    let completed = candidates.is_empty();
    info!(n_selected = steps.len(), completed, "selection finished");
    Ok(SelectionTrace {
        scope: scope.clone(),
        period,
        steps,
        completed,
    })
}

fn mean_holdout_mae(
    dataset: &Dataset,
    features: &FeatureMatrix,
    target: &[f64],
    splitter: &HoldoutSplitter,
    config: &SelectionConfig,
    trial_seeds: &[u64],
) -> Result<f64, EvalError> {
    let maes = trial_seeds
        .par_iter()
        .map(|&trial_seed| {
            let split = splitter.split(dataset, &mut ChaCha8Rng::seed_from_u64(trial_seed));
            split.ensure_non_empty()?;
            let train = features.select_rows(split.train());
            let test = features.select_rows(split.test());
            let train_y: Vec<f64> = split.train().iter().map(|&i| target[i]).collect();
            let test_y: Vec<f64> = split.test().iter().map(|&i| target[i]).collect();
            let model = config.gradient_boosting.fit(train.rows(), &train_y)?;
            Ok(mean_absolute_error(&model.predict(test.rows())?, &test_y))
        })
        .collect::<Result<Vec<f64>, EvalError>>()?;
    Ok(maes.iter().sum::<f64>() / maes.len() as f64)
}

/// Run [`select_features`] for `All` and every city, both periods.
///
/// Each (scope, period) run gets its own seed from a master generator built
/// from `seed`. Once `cancel` is set the current run stops early and no
/// further runs start.
///
/// # Errors
///
/// The first error returned by a run.
pub fn select_features_for_scopes(
    dataset: &Dataset,
    config: &SelectionConfig,
    pool: &WorkerPool,
    seed: Option<u64>,
    cancel: &CancellationToken,
) -> Result<Vec<SelectionTrace>, EvalError> {
    let runs: Vec<(CityScope, ResponsePeriod)> = CityScope::every(dataset)
        .into_iter()
        .flat_map(|scope| ResponsePeriod::BOTH.map(|p| (scope.clone(), p)))
        .collect();
    let seeds = unit_seeds(seed, runs.len());

    let mut traces = Vec::with_capacity(runs.len());
    for ((scope, period), run_seed) in runs.into_iter().zip(seeds) {
        if cancel.is_cancelled() {
            break;
        }
        traces.push(select_features(
            dataset,
            &scope,
            period,
            config,
            pool,
            Some(run_seed),
            cancel,
        )?);
    }
    Ok(traces)
}
