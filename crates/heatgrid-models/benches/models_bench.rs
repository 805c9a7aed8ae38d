//! Criterion benchmarks for heatgrid-models: fitting and predicting each family.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use heatgrid_models::{
    GradientBoostingConfig, ModelFamily, ModelSuite, RandomForestConfig, Regressor,
};

fn make_regression(n_samples: usize, n_features: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_samples);
    let mut target = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let row: Vec<f64> = (0..n_features).map(|_| rng.r#gen::<f64>()).collect();
        target.push(row.iter().take(3).sum::<f64>() + rng.r#gen::<f64>() * 0.1);
        features.push(row);
    }
    (features, target)
}

fn bench_fit_families(c: &mut Criterion) {
    let (features, target) = make_regression(500, 10, 42);
    let suite = ModelSuite::new()
        .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(100))
        .with_random_forest(RandomForestConfig::new().with_n_trees(50));

    for family in ModelFamily::FITTED {
        c.bench_function(&format!("{family}_fit_500x10"), |b| {
            b.iter(|| suite.fit(family, &features, &target).unwrap());
        });
    }
}

fn bench_predict_gbrf(c: &mut Criterion) {
    let (features, target) = make_regression(500, 10, 42);
    let model = ModelSuite::new()
        .fit(ModelFamily::GradientBoosting, &features, &target)
        .unwrap();

    c.bench_function("gbrf_predict_500x10_500stages", |b| {
        b.iter(|| model.predict(&features).unwrap());
    });
}

criterion_group!(benches, bench_fit_families, bench_predict_gbrf);
criterion_main!(benches);
