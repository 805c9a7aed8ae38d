//! Accuracy regression tests for heatgrid-models.
//!
//! Every family is fitted on the same deterministic synthetic surface and
//! scored on a held-out slice, so algorithmic changes that degrade fit
//! quality show up here.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use heatgrid_models::{
    GradientBoostingConfig, ModelFamily, ModelSuite, RandomForestConfig, Regressor,
};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic regression dataset
// ---------------------------------------------------------------------------

/// Generate a 400-sample, 3-feature regression dataset.
///
/// The response is `30 - 8 * f0 + 5 * f1^2 + noise`; feature f2 is pure
/// noise in [0, 1]. Noise on the response is uniform in [-0.25, 0.25].
fn make_regression() -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(3201);
    let mut features = Vec::with_capacity(400);
    let mut target = Vec::with_capacity(400);
    for _ in 0..400 {
        let row: Vec<f64> = (0..3).map(|_| rng.r#gen::<f64>()).collect();
        target.push(30.0 - 8.0 * row[0] + 5.0 * row[1] * row[1] + rng.gen_range(-0.25..0.25));
        features.push(row);
    }
    (features, target)
}

fn mae(predicted: &[f64], observed: &[f64]) -> f64 {
    predicted
        .iter()
        .zip(observed)
        .map(|(p, o)| (p - o).abs())
        .sum::<f64>()
        / observed.len() as f64
}

fn suite() -> ModelSuite {
    ModelSuite::new()
        .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(200))
        .with_random_forest(RandomForestConfig::new().with_n_trees(100))
}

// ---------------------------------------------------------------------------
// a) every_fitted_family_beats_the_null_model
// ---------------------------------------------------------------------------

/// On held-out rows every non-null family must cut the null MAE by 40%.
#[test]
fn every_fitted_family_beats_the_null_model() {
    let (features, target) = make_regression();
    let (train_x, test_x) = features.split_at(300);
    let (train_y, test_y) = target.split_at(300);
    let suite = suite();

    let null = suite
        .fit(ModelFamily::Average, train_x, train_y)
        .unwrap()
        .predict(test_x)
        .unwrap();
    let null_mae = mae(&null, test_y);

    for family in ModelFamily::FITTED {
        let preds = suite
            .fit(family, train_x, train_y)
            .unwrap()
            .predict(test_x)
            .unwrap();
        let family_mae = mae(&preds, test_y);
        assert!(
            family_mae < 0.6 * null_mae,
            "{family}: mae {family_mae} vs null {null_mae}"
        );
    }
}

// ---------------------------------------------------------------------------
// b) smooth_families_are_accurate
// ---------------------------------------------------------------------------

/// The additive spline families capture the smooth surface to within 0.5.
#[test]
fn smooth_families_are_accurate() {
    let (features, target) = make_regression();
    let (train_x, test_x) = features.split_at(300);
    let (train_y, test_y) = target.split_at(300);

    for family in [ModelFamily::Mars, ModelFamily::Gam, ModelFamily::GradientBoosting] {
        let preds = suite()
            .fit(family, train_x, train_y)
            .unwrap()
            .predict(test_x)
            .unwrap();
        let family_mae = mae(&preds, test_y);
        assert!(family_mae < 0.5, "{family}: mae {family_mae}");
    }
}

// ---------------------------------------------------------------------------
// c) deterministic_predictions
// ---------------------------------------------------------------------------

/// The same suite and seed produce identical predictions on independent fits.
#[test]
fn deterministic_predictions() {
    let (features, target) = make_regression();
    let suite = suite().with_seed(17);
    for family in [ModelFamily::GradientBoosting, ModelFamily::RandomForest] {
        let a = suite.fit(family, &features, &target).unwrap().predict(&features).unwrap();
        let b = suite.fit(family, &features, &target).unwrap().predict(&features).unwrap();
        assert_eq!(a, b, "{family} predictions differ across runs");
    }
}
