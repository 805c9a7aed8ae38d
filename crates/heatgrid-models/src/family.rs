//! Uniform fit/predict surface over every supported model family.

use std::{fmt, str::FromStr};

use tracing::debug;

use crate::{
    ModelError,
    baseline::MeanModel,
    boosting::{GradientBoosting, GradientBoostingConfig},
    forest::{RandomForest, RandomForestConfig},
    gam::{Gam, GamConfig},
    linear::LinearRegression,
    mars::{Mars, MarsConfig},
    tree::RegressionTree,
};

/// The regression families compared by the analyses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ModelFamily {
    /// Null model predicting the training mean.
    #[serde(rename = "average")]
    Average,
    /// Gradient-boosted regression trees.
    #[serde(rename = "gbrf")]
    GradientBoosting,
    /// Multiple linear regression.
    #[serde(rename = "mlr")]
    Linear,
    /// Random forest regression.
    #[serde(rename = "rf")]
    RandomForest,
    /// Additive adaptive regression splines.
    #[serde(rename = "mars")]
    Mars,
    /// Penalized additive spline model.
    #[serde(rename = "gam")]
    Gam,
}

impl ModelFamily {
    /// Every family, null model first.
    pub const ALL: [ModelFamily; 6] = [
        ModelFamily::Average,
        ModelFamily::GradientBoosting,
        ModelFamily::Linear,
        ModelFamily::RandomForest,
        ModelFamily::Mars,
        ModelFamily::Gam,
    ];

    /// The five non-null families.
    pub const FITTED: [ModelFamily; 5] = [
        ModelFamily::GradientBoosting,
        ModelFamily::Linear,
        ModelFamily::RandomForest,
        ModelFamily::Mars,
        ModelFamily::Gam,
    ];

    /// Short label used in result tables.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ModelFamily::Average => "average",
            ModelFamily::GradientBoosting => "gbrf",
            ModelFamily::Linear => "mlr",
            ModelFamily::RandomForest => "rf",
            ModelFamily::Mars => "mars",
            ModelFamily::Gam => "gam",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelFamily {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelFamily::ALL
            .into_iter()
            .find(|family| family.label() == s)
            .ok_or_else(|| ModelError::UnknownFamily {
                label: s.to_owned(),
            })
    }
}

/// A fitted model that maps feature rows to predictions.
pub trait Regressor {
    /// Predict one value per row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] when a row does not
    /// have the width the model was trained on.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError>;
}

macro_rules! impl_regressor {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Regressor for $ty {
                fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
                    <$ty>::predict(self, features)
                }
            }
        )*
    };
}

impl_regressor!(
    MeanModel,
    RegressionTree,
    GradientBoosting,
    LinearRegression,
    RandomForest,
    Mars,
    Gam,
);

/// A fitted model of any family.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum FittedModel {
    /// Null model.
    Average(MeanModel),
    /// Boosted trees.
    GradientBoosting(GradientBoosting),
    /// Linear regression.
    Linear(LinearRegression),
    /// Random forest.
    RandomForest(RandomForest),
    /// Adaptive regression splines.
    Mars(Mars),
    /// Additive spline model.
    Gam(Gam),
}

impl FittedModel {
    /// Return the family this model belongs to.
    #[must_use]
    pub fn family(&self) -> ModelFamily {
        match self {
            FittedModel::Average(_) => ModelFamily::Average,
            FittedModel::GradientBoosting(_) => ModelFamily::GradientBoosting,
            FittedModel::Linear(_) => ModelFamily::Linear,
            FittedModel::RandomForest(_) => ModelFamily::RandomForest,
            FittedModel::Mars(_) => ModelFamily::Mars,
            FittedModel::Gam(_) => ModelFamily::Gam,
        }
    }
}

impl Regressor for FittedModel {
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        match self {
            FittedModel::Average(m) => m.predict(features),
            FittedModel::GradientBoosting(m) => m.predict(features),
            FittedModel::Linear(m) => m.predict(features),
            FittedModel::RandomForest(m) => m.predict(features),
            FittedModel::Mars(m) => m.predict(features),
            FittedModel::Gam(m) => m.predict(features),
        }
    }
}

/// Hyperparameters for every family, used to fit any of them by label.
///
/// Defaults are the per-family config defaults; [`ModelSuite::with_seed`]
/// reseeds the two stochastic families together.
#[derive(Debug, Clone, Default)]
pub struct ModelSuite {
    gradient_boosting: GradientBoostingConfig,
    random_forest: RandomForestConfig,
    mars: MarsConfig,
    gam: GamConfig,
}

impl ModelSuite {
    /// Create a suite with default hyperparameters for every family.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the gradient boosting config.
    #[must_use]
    pub fn with_gradient_boosting(mut self, config: GradientBoostingConfig) -> Self {
        self.gradient_boosting = config;
        self
    }

    /// Replace the random forest config.
    #[must_use]
    pub fn with_random_forest(mut self, config: RandomForestConfig) -> Self {
        self.random_forest = config;
        self
    }

    /// Replace the MARS config.
    #[must_use]
    pub fn with_mars(mut self, config: MarsConfig) -> Self {
        self.mars = config;
        self
    }

    /// Replace the GAM config.
    #[must_use]
    pub fn with_gam(mut self, config: GamConfig) -> Self {
        self.gam = config;
        self
    }

    /// Set the seed of both tree ensembles.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.gradient_boosting = self.gradient_boosting.with_seed(seed);
        self.random_forest = self.random_forest.with_seed(seed);
        self
    }

    /// Return the gradient boosting config.
    #[must_use]
    pub fn gradient_boosting(&self) -> &GradientBoostingConfig {
        &self.gradient_boosting
    }

    /// Return the random forest config.
    #[must_use]
    pub fn random_forest(&self) -> &RandomForestConfig {
        &self.random_forest
    }

    /// Return the MARS config.
    #[must_use]
    pub fn mars(&self) -> &MarsConfig {
        &self.mars
    }

    /// Return the GAM config.
    #[must_use]
    pub fn gam(&self) -> &GamConfig {
        &self.gam
    }

    /// Fit `family` on row-major `features` and `target`.
    ///
    /// # Errors
    ///
    /// Whatever the chosen family's `fit` returns.
    pub fn fit(
        &self,
        family: ModelFamily,
        features: &[Vec<f64>],
        target: &[f64],
    ) -> Result<FittedModel, ModelError> {
        debug!(%family, n_samples = features.len(), "fitting model");
        Ok(match family {
            ModelFamily::Average => FittedModel::Average(MeanModel::fit(features, target)?),
            ModelFamily::GradientBoosting => {
                FittedModel::GradientBoosting(self.gradient_boosting.fit(features, target)?)
            }
            ModelFamily::Linear => FittedModel::Linear(LinearRegression::fit(features, target)?),
            ModelFamily::RandomForest => {
                FittedModel::RandomForest(self.random_forest.fit(features, target)?)
            }
            ModelFamily::Mars => FittedModel::Mars(self.mars.fit(features, target)?),
            ModelFamily::Gam => FittedModel::Gam(self.gam.fit(features, target)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_str() {
        for family in ModelFamily::ALL {
            assert_eq!(family.label().parse::<ModelFamily>().unwrap(), family);
        }
        assert!(matches!(
            "xgb".parse::<ModelFamily>(),
            Err(ModelError::UnknownFamily { .. })
        ));
    }

    #[test]
    fn fitted_excludes_null_model() {
        assert!(!ModelFamily::FITTED.contains(&ModelFamily::Average));
        assert_eq!(ModelFamily::FITTED.len() + 1, ModelFamily::ALL.len());
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&ModelFamily::GradientBoosting).unwrap();
        assert_eq!(json, "\"gbrf\"");
    }

    #[test]
    fn suite_fits_every_family() {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![f64::from(i), f64::from((i * 5) % 9)])
            .collect();
        let target: Vec<f64> = features.iter().map(|r| 0.5 * r[0] + r[1]).collect();
        let suite = ModelSuite::new()
            .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(20))
            .with_random_forest(RandomForestConfig::new().with_n_trees(10));
        for family in ModelFamily::ALL {
            let model = suite.fit(family, &features, &target).unwrap();
            assert_eq!(model.family(), family);
            assert_eq!(model.predict(&features[..3]).unwrap().len(), 3);
        }
    }
}
