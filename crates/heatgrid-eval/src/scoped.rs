//! Boosted-tree fits on every city scope, for inspecting selected variables.

use heatgrid_models::{GradientBoosting, GradientBoostingConfig};
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::{
    EvalError,
    dataset::Dataset,
    metrics::{mean_absolute_error, r2_score},
    pool::WorkerPool,
    prepare::{drop_non_predictive, separate_targets},
    record::ResponsePeriod,
    selection::CityScope,
};

/// A boosted-tree model fitted on all rows of one scope.
#[derive(Debug, Clone)]
pub struct ScopedModel {
    /// Rows the model was fitted on.
    pub scope: CityScope,
    /// Response predicted.
    pub period: ResponsePeriod,
    /// Covariates used, in column order.
    pub features: Vec<String>,
    /// In-sample R².
    pub r2: f64,
    /// In-sample MAE.
    pub mae: f64,
    /// The fitted ensemble.
    pub model: GradientBoosting,
}

impl ScopedModel {
    /// Feature names paired with normalised impurity importances.
    #[must_use]
    pub fn importances(&self) -> Vec<(String, f64)> {
        self.features
            .iter()
            .cloned()
            .zip(self.model.feature_importances())
            .collect()
    }
}

/// Fit day and night models for `All` and every city.
///
/// With `features` set, only those covariates are used; otherwise every
/// covariate is. Fits run in parallel on `pool`.
///
/// # Errors
///
/// | Variant                       | When                                    |
/// |-------------------------------|-----------------------------------------|
/// | [`EvalError::UnknownFeature`] | a listed feature is not a covariate     |
/// | [`EvalError::Model`]          | any fit failed                          |
#[instrument(skip_all, fields(n_rows = dataset.len()))]
pub fn fit_scoped_models(
    dataset: &Dataset,
    features: Option<&[String]>,
    config: &GradientBoostingConfig,
    pool: &WorkerPool,
) -> Result<Vec<ScopedModel>, EvalError> {
    let restricted = match features {
        Some(names) => dataset.with_covariates(names)?,
        None => dataset.clone(),
    };
    let units: Vec<(CityScope, ResponsePeriod)> = CityScope::every(&restricted)
        .into_iter()
        .flat_map(|scope| ResponsePeriod::BOTH.map(|p| (scope.clone(), p)))
        .collect();

    let models = pool.install(|| {
        units
            .into_par_iter()
            .map(|(scope, period)| {
                let scoped = scope.apply(&restricted)?;
                let (table, targets) = separate_targets(&scoped);
                let matrix = drop_non_predictive(table);
                let target = targets.get(period);
                let model = config.fit(matrix.rows(), target)?;
                let fitted = model.predict(matrix.rows())?;
                Ok(ScopedModel {
                    r2: r2_score(&fitted, target),
                    mae: mean_absolute_error(&fitted, target),
                    scope,
                    period,
                    features: matrix.names().to_vec(),
                    model,
                })
            })
            .collect::<Result<Vec<_>, EvalError>>()
    })?;
    info!(n_models = models.len(), "scoped models fitted");
    Ok(models)
}
