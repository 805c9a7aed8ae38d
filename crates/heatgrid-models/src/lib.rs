//! Regression model families behind one fit/predict contract.
//!
//! Provides a null mean model, least-squares gradient boosting over shallow
//! trees, ordinary least squares, random forest regression with parallel
//! tree construction, additive MARS and a penalized additive spline model.
//! [`ModelSuite`] fits any of them by [`ModelFamily`].

mod baseline;
mod boosting;
mod error;
mod family;
mod forest;
mod gam;
mod linalg;
mod linear;
mod mars;
mod node;
mod split;
mod tree;
mod validate;

pub use baseline::MeanModel;
pub use boosting::{GradientBoosting, GradientBoostingConfig};
pub use error::ModelError;
pub use family::{FittedModel, ModelFamily, ModelSuite, Regressor};
pub use forest::{MaxFeatures, RandomForest, RandomForestConfig};
pub use gam::{Gam, GamConfig};
pub use linear::LinearRegression;
pub use mars::{BasisTerm, Mars, MarsConfig};
pub use node::{FeatureIndex, Node, NodeIndex};
pub use tree::{RegressionTree, RegressionTreeConfig};

/// Seed used by the stochastic families unless overridden.
pub const DEFAULT_SEED: u64 = 3201;

/// Scale `values` in place so they sum to one; leaves all-zero input untouched.
pub(crate) fn normalize_in_place(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}
