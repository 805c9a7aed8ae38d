//! Leave-one-city-out evaluation.

use rayon::prelude::*;
use tracing::{info, instrument};

use crate::{
    EvalError,
    dataset::{CityId, Dataset},
    holdout::{HoldoutConfig, collect_reports, evaluate_split},
    pool::WorkerPool,
    record::{BatchReport, ResultRecord},
    split::Split,
};

/// Hold out every row of `city` and train on all other cities.
///
/// # Errors
///
/// Returns [`EvalError::UnknownCity`] if the city has no rows.
pub fn city_split(dataset: &Dataset, city: &CityId) -> Result<Split, EvalError> {
    let test = dataset.city_rows(city);
    if test.is_empty() {
        return Err(EvalError::UnknownCity {
            city: city.to_string(),
        });
    }
    Ok(Split::from_test_rows(dataset.len(), test, Vec::new()))
}

/// Label of the holdout that leaves `city` out.
#[must_use]
pub fn city_holdout_id(city: &CityId) -> String {
    format!("hold-{city}")
}

/// Score every configured family once per city, training on the others.
///
/// Records carry holdout id `hold-<city>`. A city whose trial fails, for
/// example because it is the only city and leaves nothing to train on, is
/// reported in [`BatchReport::failures`]; so is a single family that fails
/// within a city, as `hold-<city>/<family>/<period>`.
///
/// # Errors
///
/// Returns [`EvalError::UnknownCity`] before any trial runs if a listed
/// city has no rows.
#[instrument(skip_all, fields(n_cities = cities.len(), n_rows = dataset.len()))]
pub fn evaluate_leave_one_city_out(
    dataset: &Dataset,
    cities: &[CityId],
    config: &HoldoutConfig,
    pool: &WorkerPool,
) -> Result<BatchReport<ResultRecord>, EvalError> {
    let splits = cities
        .iter()
        .map(|city| city_split(dataset, city).map(|split| (city_holdout_id(city), split)))
        .collect::<Result<Vec<_>, _>>()?;

    let outcomes: Vec<(String, Result<BatchReport<ResultRecord>, EvalError>)> = pool.install(|| {
        splits
            .into_par_iter()
            .map(|(holdout_id, split)| {
                let outcome = evaluate_split(dataset, &split, &holdout_id, config);
                (holdout_id, outcome)
            })
            .collect()
    });

    let report = collect_reports(outcomes);
    info!(
        n_records = report.records.len(),
        n_failed = report.failures.len(),
        "city holdouts complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use heatgrid_models::ModelFamily;

    use super::*;
    use crate::dataset::{HoldoutGroup, Observation};

    fn two_cities() -> Dataset {
        let observations = (0..40)
            .map(|i| {
                let v = f64::from(i % 8);
                Observation {
                    city: CityId::new(if i < 20 { "austin" } else { "boston" }),
                    holdout: HoldoutGroup::new(format!("g{}", i / 4)),
                    x: 0.0,
                    y: 0.0,
                    lst_day: 25.0 + 2.0 * v,
                    lst_night: 15.0 + v,
                    covariates: vec![v],
                }
            })
            .collect();
        Dataset::new(vec!["v".to_owned()], observations).unwrap()
    }

    #[test]
    fn city_split_isolates_one_city() {
        let ds = two_cities();
        let split = city_split(&ds, &CityId::new("boston")).unwrap();
        assert_eq!(split.test(), (20..40).collect::<Vec<_>>().as_slice());
        assert_eq!(split.train().len(), 20);
        assert!(city_split(&ds, &CityId::new("denver")).is_err());
    }

    #[test]
    fn each_city_gets_its_own_holdout_id() {
        let ds = two_cities();
        let pool = WorkerPool::new(Some(2)).unwrap();
        let config =
            HoldoutConfig::new().with_families(vec![ModelFamily::Average, ModelFamily::Linear]);
        let report = evaluate_leave_one_city_out(&ds, &ds.cities(), &config, &pool).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.records.len(), 2 * 2 * 2 * 2);
        assert!(report.records.iter().any(|r| r.holdout_id == "hold-austin"));
        assert!(report.records.iter().any(|r| r.holdout_id == "hold-boston"));
    }

    #[test]
    fn unknown_city_fails_fast() {
        let ds = two_cities();
        let pool = WorkerPool::new(Some(1)).unwrap();
        let err = evaluate_leave_one_city_out(
            &ds,
            &[CityId::new("denver")],
            &HoldoutConfig::new(),
            &pool,
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::UnknownCity { .. }));
    }

    #[test]
    fn single_city_dataset_reports_failure() {
        let ds = two_cities().restrict_to_city(&CityId::new("austin")).unwrap();
        let pool = WorkerPool::new(Some(1)).unwrap();
        let report =
            evaluate_leave_one_city_out(&ds, &ds.cities(), &HoldoutConfig::new(), &pool).unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.failures[0].unit, "hold-austin");
    }
}
