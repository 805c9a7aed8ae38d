//! End-to-end scenarios for the evaluation drivers.
//!
//! Each scenario builds a small synthetic city dataset whose expected
//! behaviour is known analytically, then runs a public driver on it.

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use heatgrid_eval::{
    CancellationToken, CityId, CityScope, Dataset, DependenceConfig, ErrorMetric, HoldoutConfig,
    HoldoutGroup, Observation, ResponsePeriod, ResultRecord, SelectionConfig, TimeOfDay,
    WorkerPool, city_split, compute_swing, evaluate_leave_one_city_out, evaluate_n,
    partial_dependence, resample_groups, select_features,
};
use heatgrid_models::{GradientBoostingConfig, ModelFamily, ModelSuite, RandomForestConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Two cities, ten groups of five rows each.
///
/// Covariate `c` runs 0..100. The day response is `2c + 5`. The night
/// response repeats `[1, -1, 0, -1, 1]` within each group, which is
/// symmetric about the group centre, so it has zero covariance with `c`
/// on any union of whole groups.
fn scenario_a() -> Dataset {
    const NIGHT: [f64; 5] = [1.0, -1.0, 0.0, -1.0, 1.0];
    let observations = (0..100)
        .map(|k: usize| {
            let c = k as f64;
            Observation {
                city: CityId::new(if k < 50 { "austin" } else { "boston" }),
                holdout: HoldoutGroup::new(format!("g{:02}", k / 5)),
                x: c,
                y: -c,
                lst_day: 2.0 * c + 5.0,
                lst_night: NIGHT[k % 5],
                covariates: vec![c],
            }
        })
        .collect();
    Dataset::new(vec!["c".to_owned()], observations).unwrap()
}

/// Three cities with disjoint groups of varying size and two covariates.
fn three_cities() -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(3201);
    let mut observations = Vec::new();
    for (city, n_groups) in [("austin", 4), ("boston", 5), ("chicago", 3)] {
        for g in 0..n_groups {
            for _ in 0..(2 + g) {
                let a: f64 = rng.gen_range(0.0..1.0);
                let b: f64 = rng.gen_range(0.0..1.0);
                observations.push(Observation {
                    city: CityId::new(city),
                    holdout: HoldoutGroup::new(format!("{city}-{g}")),
                    x: 0.0,
                    y: 0.0,
                    lst_day: 30.0 + 4.0 * a - 2.0 * b,
                    lst_night: 20.0 + a,
                    covariates: vec![a, b],
                });
            }
        }
    }
    Dataset::new(vec!["a".to_owned(), "b".to_owned()], observations).unwrap()
}

fn scores(
    records: &[ResultRecord],
    model: ModelFamily,
    time_of_day: TimeOfDay,
    metric: ErrorMetric,
) -> Vec<f64> {
    records
        .iter()
        .filter(|r| r.model == model && r.time_of_day == time_of_day && r.error_metric == metric)
        .map(|r| r.error)
        .collect()
}

// ---------------------------------------------------------------------------
// a) linear_model_recovers_day_and_matches_null_at_night
// ---------------------------------------------------------------------------

#[test]
fn linear_model_recovers_day_and_matches_null_at_night() {
    let dataset = scenario_a();
    let pool = WorkerPool::new(Some(4)).unwrap();
    let config =
        HoldoutConfig::new().with_families(vec![ModelFamily::Average, ModelFamily::Linear]);
    let report = evaluate_n(&dataset, 6, &config, &pool, Some(3201)).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.records.len(), 6 * 2 * 2 * 2);

    let ids: BTreeSet<&str> = report.records.iter().map(|r| r.holdout_id.as_str()).collect();
    assert_eq!(ids, ["0", "1", "2", "3", "4", "5"].into_iter().collect::<BTreeSet<_>>());

    for mae in scores(&report.records, ModelFamily::Linear, TimeOfDay::Diurnal, ErrorMetric::Mae) {
        assert!(mae < 1e-6, "diurnal linear mae {mae}");
    }
    let null_r2 = scores(&report.records, ModelFamily::Average, TimeOfDay::Nocturnal, ErrorMetric::R2);
    let linear_r2 = scores(&report.records, ModelFamily::Linear, TimeOfDay::Nocturnal, ErrorMetric::R2);
    for (null, linear) in null_r2.iter().zip(&linear_r2) {
        assert!((null - linear).abs() < 1e-6, "null {null} vs linear {linear}");
    }
}

// ---------------------------------------------------------------------------
// b) leave_one_city_out_uses_whole_cities
// ---------------------------------------------------------------------------

#[test]
fn leave_one_city_out_uses_whole_cities() {
    let dataset = three_cities();
    let cities = dataset.cities();
    assert_eq!(cities.len(), 3);

    for city in &cities {
        let split = city_split(&dataset, city).unwrap();
        for &row in split.test() {
            assert_eq!(&dataset.observations()[row].city, city);
        }
        for &row in split.train() {
            assert_ne!(&dataset.observations()[row].city, city);
        }
        assert_eq!(split.test().len() + split.train().len(), dataset.len());
    }

    let pool = WorkerPool::new(Some(3)).unwrap();
    let config =
        HoldoutConfig::new().with_families(vec![ModelFamily::Average, ModelFamily::Linear]);
    let report = evaluate_leave_one_city_out(&dataset, &cities, &config, &pool).unwrap();
    assert!(report.is_complete());
    let ids: BTreeSet<&str> = report.records.iter().map(|r| r.holdout_id.as_str()).collect();
    assert_eq!(
        ids,
        ["hold-austin", "hold-boston", "hold-chicago"].into_iter().collect::<BTreeSet<_>>()
    );
}

// ---------------------------------------------------------------------------
// c) group_bootstrap_keeps_groups_whole
// ---------------------------------------------------------------------------

#[test]
fn group_bootstrap_keeps_groups_whole() {
    let dataset = three_cities();
    let sizes = dataset.group_rows();
    for seed in 0..10 {
        let resample = resample_groups(&dataset, &mut ChaCha8Rng::seed_from_u64(seed));
        let sample = dataset.select(resample.rows()).unwrap();
        let expected: usize = resample.groups().iter().map(|g| sizes[g].len()).sum();
        assert_eq!(sample.len(), expected);
        for obs in sample.observations() {
            assert!(resample.groups().contains(&obs.holdout));
        }
    }
}

// ---------------------------------------------------------------------------
// d) constant_feature_gives_flat_dependence
// ---------------------------------------------------------------------------

#[test]
fn constant_feature_gives_flat_dependence() {
    let observations = (0..40)
        .map(|i| {
            let a = f64::from(i % 8);
            Observation {
                city: CityId::new("austin"),
                holdout: HoldoutGroup::new(format!("g{}", i / 4)),
                x: 0.0,
                y: 0.0,
                lst_day: 28.0 + a,
                lst_night: 18.0 + 0.5 * a,
                covariates: vec![a, 3.0],
            }
        })
        .collect();
    let dataset = Dataset::new(vec!["a".to_owned(), "bldg".to_owned()], observations).unwrap();
    let config = DependenceConfig::new()
        .with_features(vec!["bldg".to_owned()])
        .with_suite(
            ModelSuite::new()
                .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(30))
                .with_random_forest(RandomForestConfig::new().with_n_trees(20)),
        );
    assert_eq!(config.families(), &ModelFamily::FITTED);

    let report = partial_dependence(&dataset, &config, None).unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.records.len(), 5 * 2 * 25);
    for family in ModelFamily::FITTED {
        assert_eq!(
            report.records.iter().filter(|r| r.model == family).count(),
            2 * 25,
            "{family}"
        );
    }
    for chunk in report.records.chunks(25) {
        assert!(chunk.iter().all(|r| r.x == 3.0));
        assert!(chunk.iter().all(|r| r.mean == chunk[0].mean));
    }

    let swings = compute_swing(&report.records);
    assert!(swings.iter().all(|s| s.swing.is_nan()));
}

// ---------------------------------------------------------------------------
// e) swings_sum_to_one
// ---------------------------------------------------------------------------

#[test]
fn swings_sum_to_one() {
    let dataset = three_cities();
    let config = DependenceConfig::new()
        .with_features(vec!["a".to_owned(), "b".to_owned()])
        .with_families(vec![ModelFamily::Linear, ModelFamily::RandomForest])
        .with_resolution(10)
        .with_suite(ModelSuite::new().with_random_forest(RandomForestConfig::new().with_n_trees(20)));
    let report = partial_dependence(&dataset, &config, None).unwrap();
    let swings = compute_swing(&report.records);
    assert_eq!(swings.len(), 2 * 2 * 2);

    for period in ResponsePeriod::BOTH {
        for model in [ModelFamily::Linear, ModelFamily::RandomForest] {
            let total: f64 = swings
                .iter()
                .filter(|s| s.dependent == period && s.model == model)
                .map(|s| s.swing)
                .sum();
            assert!((total - 1.0).abs() < 1e-9, "{model}/{period}: {total}");
        }
    }
    let night_linear_b = swings
        .iter()
        .find(|s| {
            s.dependent == ResponsePeriod::Night
                && s.model == ModelFamily::Linear
                && s.independent == "b"
        })
        .unwrap();
    assert!(night_linear_b.swing < 1e-6);
}

// ---------------------------------------------------------------------------
// f) forward_selection_ranks_by_signal
// ---------------------------------------------------------------------------

/// Day response `3a + 2b` plus small noise; `noise` carries no signal.
fn signal_and_noise() -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let observations = (0..120)
        .map(|i| {
            let a: f64 = rng.gen_range(0.0..1.0);
            let b: f64 = rng.gen_range(0.0..1.0);
            let n: f64 = rng.gen_range(0.0..1.0);
            Observation {
                city: CityId::new("austin"),
                holdout: HoldoutGroup::new(format!("g{}", i / 4)),
                x: 0.0,
                y: 0.0,
                lst_day: 3.0 * a + 2.0 * b + rng.gen_range(-0.05..0.05),
                lst_night: 0.0,
                covariates: vec![n, b, a],
            }
        })
        .collect();
    Dataset::new(
        vec!["noise".to_owned(), "b".to_owned(), "a".to_owned()],
        observations,
    )
    .unwrap()
}

#[test]
fn forward_selection_ranks_by_signal() {
    let dataset = signal_and_noise();
    let pool = WorkerPool::new(Some(4)).unwrap();
    let config = SelectionConfig::new()
        .with_holdout_trials(5)
        .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(100));

    let trace = select_features(
        &dataset,
        &CityScope::All,
        ResponsePeriod::Day,
        &config,
        &pool,
        Some(3201),
        &CancellationToken::new(),
    )
    .unwrap();

    assert!(trace.completed);
    assert_eq!(trace.features(), vec!["a", "b", "noise"]);
    assert!(trace.steps[1].mae < trace.steps[0].mae);
}

// ---------------------------------------------------------------------------
// g) averaged_selection_trace_does_not_worsen
// ---------------------------------------------------------------------------

#[test]
fn averaged_selection_trace_does_not_worsen() {
    let dataset = signal_and_noise();
    let pool = WorkerPool::new(Some(4)).unwrap();
    let config = SelectionConfig::new()
        .with_holdout_trials(30)
        .with_gradient_boosting(GradientBoostingConfig::new().with_n_estimators(60));
    let seeds = [1u64, 2, 3, 4];

    let mut summed = vec![0.0; dataset.covariate_names().len()];
    for seed in seeds {
        let trace = select_features(
            &dataset,
            &CityScope::All,
            ResponsePeriod::Day,
            &config,
            &pool,
            Some(seed),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(trace.completed);
        assert_eq!(trace.steps.len(), summed.len());
        for (total, step) in summed.iter_mut().zip(&trace.steps) {
            *total += step.mae;
        }
    }
    let averaged: Vec<f64> = summed.iter().map(|t| t / seeds.len() as f64).collect();

    // Adding the signal-free covariate last may cost a little, never much.
    for pair in averaged.windows(2) {
        assert!(pair[1] <= pair[0] * 1.1, "averaged trace {averaged:?}");
    }
    assert!(averaged[1] < 0.5 * averaged[0], "averaged trace {averaged:?}");
}
