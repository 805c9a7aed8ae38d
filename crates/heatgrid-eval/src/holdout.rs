//! Repeated random spatial holdout evaluation.

use heatgrid_models::{ModelFamily, ModelSuite, Regressor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::{
    EvalError,
    dataset::Dataset,
    metrics::{mean_absolute_error, r2_score},
    pool::{WorkerPool, unit_seeds},
    prepare::{PreparedSplit, prepare_split},
    record::{BatchReport, ErrorMetric, ResponsePeriod, ResultRecord, TrialFailure},
    split::{HoldoutSplitter, Split},
};

/// Configuration for holdout evaluation.
///
/// # Defaults
///
/// | Parameter       | Default                      |
/// |-----------------|------------------------------|
/// | `test_fraction` | 0.20                         |
/// | `families`      | all six, null model first    |
/// | `periods`       | day, night                   |
/// | `suite`         | [`ModelSuite::default`]      |
#[derive(Debug, Clone)]
pub struct HoldoutConfig {
    test_fraction: f64,
    families: Vec<ModelFamily>,
    periods: Vec<ResponsePeriod>,
    suite: ModelSuite,
}

impl HoldoutConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            test_fraction: 0.20,
            families: ModelFamily::ALL.to_vec(),
            periods: ResponsePeriod::BOTH.to_vec(),
            suite: ModelSuite::default(),
        }
    }

    /// Set the target share of rows held out per trial.
    #[must_use]
    pub fn with_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    /// Set which families are scored.
    #[must_use]
    pub fn with_families(mut self, families: Vec<ModelFamily>) -> Self {
        self.families = families;
        self
    }

    /// Set which response periods are scored.
    #[must_use]
    pub fn with_periods(mut self, periods: Vec<ResponsePeriod>) -> Self {
        self.periods = periods;
        self
    }

    /// Replace the model hyperparameters.
    #[must_use]
    pub fn with_suite(mut self, suite: ModelSuite) -> Self {
        self.suite = suite;
        self
    }

    /// Return the test fraction.
    #[must_use]
    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    /// Return the scored families.
    #[must_use]
    pub fn families(&self) -> &[ModelFamily] {
        &self.families
    }

    /// Return the scored periods.
    #[must_use]
    pub fn periods(&self) -> &[ResponsePeriod] {
        &self.periods
    }

    /// Return the model hyperparameters.
    #[must_use]
    pub fn suite(&self) -> &ModelSuite {
        &self.suite
    }
}

impl Default for HoldoutConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one random holdout trial labelled `holdout_id`.
///
/// Draws a split, fits every configured family on the train rows for each
/// period and scores R² and MAE on the test rows. Yields
/// `2 * periods * families` records when every family fits. A family that
/// fails to fit or predict is reported in [`BatchReport::failures`] as
/// `<holdout_id>/<family>/<period>` and the other families still score.
///
/// # Errors
///
/// | Variant                          | When                                   |
/// |----------------------------------|----------------------------------------|
/// | [`EvalError::InvalidTestFraction`] | fraction outside `[0, 1)`            |
/// | [`EvalError::DegenerateSplit`]   | the draw left train or test empty      |
pub fn evaluate_once(
    dataset: &Dataset,
    holdout_id: &str,
    config: &HoldoutConfig,
    rng: &mut impl Rng,
) -> Result<BatchReport<ResultRecord>, EvalError> {
    let split = HoldoutSplitter::new(config.test_fraction)?.split(dataset, rng);
    evaluate_split(dataset, &split, holdout_id, config)
}

/// Score every configured family on a fixed split.
pub(crate) fn evaluate_split(
    dataset: &Dataset,
    split: &Split,
    holdout_id: &str,
    config: &HoldoutConfig,
) -> Result<BatchReport<ResultRecord>, EvalError> {
    let prepared = prepare_split(dataset, split)?;
    let mut outcomes = Vec::with_capacity(config.periods.len() * config.families.len());
    for &period in &config.periods {
        for &family in &config.families {
            let outcome = score_family(&prepared, holdout_id, family, period, &config.suite);
            outcomes.push((format!("{holdout_id}/{family}/{period}"), outcome));
        }
    }
    Ok(collect_outcomes(outcomes))
}

fn score_family(
    prepared: &PreparedSplit,
    holdout_id: &str,
    family: ModelFamily,
    period: ResponsePeriod,
    suite: &ModelSuite,
) -> Result<Vec<ResultRecord>, EvalError> {
    let observed = prepared.responses.test(period);
    let model = suite.fit(family, prepared.train.rows(), prepared.responses.train(period))?;
    let predicted = model.predict(prepared.test.rows())?;
    let r2 = r2_score(&predicted, observed);
    let mae = mean_absolute_error(&predicted, observed);
    debug!(holdout_id, %period, %family, r2, mae, "scored");
    Ok([(ErrorMetric::R2, r2), (ErrorMetric::Mae, mae)]
        .into_iter()
        .map(|(error_metric, error)| ResultRecord {
            time_of_day: period.time_of_day(),
            holdout_id: holdout_id.to_owned(),
            model: family,
            error_metric,
            error,
        })
        .collect())
}

/// Run `n_trials` independent holdout trials on `pool`.
///
/// Trial `i` is labelled `"i"` and draws its split from its own generator,
/// seeded from a master generator built from `seed`. A failing trial or
/// family is recorded in [`BatchReport::failures`] and does not stop the
/// others.
///
/// # Errors
///
/// Returns [`EvalError::InvalidTestFraction`] before any trial runs when the
/// configured fraction is out of range.
#[instrument(skip_all, fields(n_trials = n_trials, n_rows = dataset.len()))]
pub fn evaluate_n(
    dataset: &Dataset,
    n_trials: usize,
    config: &HoldoutConfig,
    pool: &WorkerPool,
    seed: Option<u64>,
) -> Result<BatchReport<ResultRecord>, EvalError> {
    HoldoutSplitter::new(config.test_fraction)?;
    let seeds = unit_seeds(seed, n_trials);

    let outcomes: Vec<(usize, Result<BatchReport<ResultRecord>, EvalError>)> = pool.install(|| {
        seeds
            .into_par_iter()
            .enumerate()
            .map(|(trial, trial_seed)| {
                let mut rng = ChaCha8Rng::seed_from_u64(trial_seed);
                (
                    trial,
                    evaluate_once(dataset, &trial.to_string(), config, &mut rng),
                )
            })
            .collect()
    });

    let report = collect_reports(outcomes.into_iter().map(|(t, r)| (t.to_string(), r)));
    info!(
        n_records = report.records.len(),
        n_failed = report.failures.len(),
        "holdout trials complete"
    );
    Ok(report)
}

/// Fold per-unit outcomes into a report, logging each failure.
pub(crate) fn collect_outcomes<R>(
    outcomes: impl IntoIterator<Item = (String, Result<Vec<R>, EvalError>)>,
) -> BatchReport<R> {
    collect_reports(outcomes.into_iter().map(|(unit, outcome)| {
        let partial = outcome.map(|records| BatchReport {
            records,
            failures: Vec::new(),
        });
        (unit, partial)
    }))
}

/// Merge per-unit reports, turning a failed unit into one failure entry.
pub(crate) fn collect_reports<R>(
    outcomes: impl IntoIterator<Item = (String, Result<BatchReport<R>, EvalError>)>,
) -> BatchReport<R> {
    let mut report = BatchReport::new();
    for (unit, outcome) in outcomes {
        match outcome {
            Ok(partial) => report.merge(partial),
            Err(error) => {
                warn!(%unit, %error, "unit failed");
                report.failures.push(TrialFailure { unit, error });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use heatgrid_models::{GradientBoostingConfig, RandomForestConfig};

    use super::*;
    use crate::dataset::{CityId, HoldoutGroup, Observation};

    fn dataset() -> Dataset {
        let observations = (0..60)
            .map(|i| {
                let a = f64::from(i % 10);
                let b = f64::from((i * 7) % 13);
                Observation {
                    city: CityId::new("c"),
                    holdout: HoldoutGroup::new(format!("g{}", i / 5)),
                    x: f64::from(i),
                    y: 0.0,
                    lst_day: 30.0 + a - 0.5 * b,
                    lst_night: 20.0 + 0.2 * a,
                    covariates: vec![a, b],
                }
            })
            .collect();
        Dataset::new(vec!["a".to_owned(), "b".to_owned()], observations).unwrap()
    }

    fn fast_config() -> HoldoutConfig {
        HoldoutConfig::new().with_suite(
            ModelSuite::new()
                .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(20))
                .with_random_forest(RandomForestConfig::new().with_n_trees(10)),
        )
    }

    #[test]
    fn one_trial_yields_full_grid() {
        let report = evaluate_once(
            &dataset(),
            "0",
            &fast_config(),
            &mut ChaCha8Rng::seed_from_u64(3201),
        )
        .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.records.len(), 24);
        assert!(
            report
                .records
                .iter()
                .all(|r| r.holdout_id == "0" && r.error.is_finite())
        );
    }

    #[test]
    fn constant_covariate_keeps_every_family() {
        let observations = (0..40)
            .map(|i| {
                let a = f64::from(i % 10);
                Observation {
                    city: CityId::new("c"),
                    holdout: HoldoutGroup::new(format!("g{}", i / 4)),
                    x: f64::from(i),
                    y: 0.0,
                    lst_day: 30.0 + a,
                    lst_night: 20.0 + 0.5 * a,
                    covariates: vec![a, 3.0],
                }
            })
            .collect();
        let ds = Dataset::new(vec!["a".to_owned(), "flat".to_owned()], observations).unwrap();
        let report =
            evaluate_once(&ds, "0", &fast_config(), &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.records.len(), 24);
        let linear_day_mae = report
            .records
            .iter()
            .find(|r| {
                r.model == ModelFamily::Linear
                    && r.time_of_day == ResponsePeriod::Day.time_of_day()
                    && r.error_metric == ErrorMetric::Mae
            })
            .unwrap();
        assert!(linear_day_mae.error < 1e-6, "{}", linear_day_mae.error);
    }

    #[test]
    fn failing_family_keeps_the_rest_of_the_trial() {
        let config = fast_config().with_suite(
            ModelSuite::new()
                .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(20))
                .with_random_forest(RandomForestConfig::new().with_n_trees(0)),
        );
        let report =
            evaluate_once(&dataset(), "4", &config, &mut ChaCha8Rng::seed_from_u64(3201)).unwrap();
        assert_eq!(report.records.len(), 20);
        assert!(report.records.iter().all(|r| r.model != ModelFamily::RandomForest));
        let units: Vec<&str> = report.failures.iter().map(|f| f.unit.as_str()).collect();
        assert_eq!(units, vec!["4/rf/lst_day_mean", "4/rf/lst_night_mean"]);
    }

    #[test]
    fn zero_fraction_fails_the_trial() {
        let config = fast_config().with_test_fraction(0.0);
        let err = evaluate_once(&dataset(), "0", &config, &mut ChaCha8Rng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, EvalError::DegenerateSplit { n_test: 0, .. }));
    }

    #[test]
    fn invalid_fraction_fails_fast() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let config = fast_config().with_test_fraction(1.2);
        assert!(matches!(
            evaluate_n(&dataset(), 3, &config, &pool, Some(1)),
            Err(EvalError::InvalidTestFraction { .. })
        ));
    }

    #[test]
    fn failures_are_isolated() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let config = fast_config().with_test_fraction(0.0);
        let report = evaluate_n(&dataset(), 3, &config, &pool, Some(1)).unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.failures.len(), 3);
        let units: Vec<&str> = report.failures.iter().map(|f| f.unit.as_str()).collect();
        assert_eq!(units, vec!["0", "1", "2"]);
    }

    #[test]
    fn seeded_batches_repeat() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let config = fast_config().with_families(vec![ModelFamily::Average, ModelFamily::Linear]);
        let a = evaluate_n(&dataset(), 4, &config, &pool, Some(7)).unwrap();
        let b = evaluate_n(&dataset(), 4, &config, &pool, Some(7)).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.records.len(), 4 * 2 * 2 * 2);
    }
}
