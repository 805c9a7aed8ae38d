//! Turning dataset rows into model-ready feature matrices and response vectors.

use crate::{
    EvalError,
    dataset::{CityId, Dataset, HoldoutGroup},
    record::ResponsePeriod,
    split::Split,
};

/// Dataset rows with the two response columns removed.
///
/// Identifier and coordinate columns are still present; they are dropped
/// by [`drop_non_predictive`].
#[derive(Debug, Clone)]
pub struct FeatureTable {
    cities: Vec<CityId>,
    holdouts: Vec<HoldoutGroup>,
    coordinates: Vec<(f64, f64)>,
    covariate_names: Vec<String>,
    covariates: Vec<Vec<f64>>,
}

impl FeatureTable {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.covariates.len()
    }

    /// `true` when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.covariates.is_empty()
    }

    /// City of each row.
    #[must_use]
    pub fn cities(&self) -> &[CityId] {
        &self.cities
    }

    /// Holdout group of each row.
    #[must_use]
    pub fn holdouts(&self) -> &[HoldoutGroup] {
        &self.holdouts
    }

    /// `(x, y)` of each row.
    #[must_use]
    pub fn coordinates(&self) -> &[(f64, f64)] {
        &self.coordinates
    }
}

/// The two response vectors of a set of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Targets {
    day: Vec<f64>,
    night: Vec<f64>,
}

impl Targets {
    /// Response vector for `period`.
    #[must_use]
    pub fn get(&self, period: ResponsePeriod) -> &[f64] {
        match period {
            ResponsePeriod::Day => &self.day,
            ResponsePeriod::Night => &self.night,
        }
    }
}

/// Row-major numeric covariates with their column names.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Column names, in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Rows, each with one value per column.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Position of column `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::UnknownFeature`] if no column has that name.
    pub fn column_index(&self, name: &str) -> Result<usize, EvalError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| EvalError::UnknownFeature {
                name: name.to_owned(),
            })
    }

    /// Values of column `index`.
    #[must_use]
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[index]).collect()
    }

    /// Keep only the named columns, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::UnknownFeature`] for a name that is not a column.
    pub fn select_columns(&self, names: &[String]) -> Result<FeatureMatrix, EvalError> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FeatureMatrix {
            names: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i]).collect())
                .collect(),
        })
    }

    /// Keep only the rows at `indices`, in order.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            names: self.names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Split `dataset` into its response vectors and everything else.
#[must_use]
pub fn separate_targets(dataset: &Dataset) -> (FeatureTable, Targets) {
    let obs = dataset.observations();
    let table = FeatureTable {
        cities: obs.iter().map(|o| o.city.clone()).collect(),
        holdouts: obs.iter().map(|o| o.holdout.clone()).collect(),
        coordinates: obs.iter().map(|o| (o.x, o.y)).collect(),
        covariate_names: dataset.covariate_names().to_vec(),
        covariates: obs.iter().map(|o| o.covariates.clone()).collect(),
    };
    let targets = Targets {
        day: obs.iter().map(|o| o.response(ResponsePeriod::Day)).collect(),
        night: obs.iter().map(|o| o.response(ResponsePeriod::Night)).collect(),
    };
    (table, targets)
}

/// Drop the city, holdout and coordinate columns, leaving the covariates.
#[must_use]
pub fn drop_non_predictive(table: FeatureTable) -> FeatureMatrix {
    FeatureMatrix {
        names: table.covariate_names,
        rows: table.covariates,
    }
}

/// Fail unless `train` and `test` have the same columns in the same order.
///
/// # Errors
///
/// Returns [`EvalError::SchemaMismatch`] when the column lists differ.
pub fn ensure_aligned(train: &FeatureMatrix, test: &FeatureMatrix) -> Result<(), EvalError> {
    if train.names != test.names {
        return Err(EvalError::SchemaMismatch {
            train: train.names.clone(),
            test: test.names.clone(),
        });
    }
    Ok(())
}

/// Day and night responses for both sides of a split.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBundle {
    /// Diurnal train responses.
    pub day_train: Vec<f64>,
    /// Nocturnal train responses.
    pub night_train: Vec<f64>,
    /// Diurnal test responses.
    pub day_test: Vec<f64>,
    /// Nocturnal test responses.
    pub night_test: Vec<f64>,
}

impl ResponseBundle {
    /// Train responses for `period`.
    #[must_use]
    pub fn train(&self, period: ResponsePeriod) -> &[f64] {
        match period {
            ResponsePeriod::Day => &self.day_train,
            ResponsePeriod::Night => &self.night_train,
        }
    }

    /// Test responses for `period`.
    #[must_use]
    pub fn test(&self, period: ResponsePeriod) -> &[f64] {
        match period {
            ResponsePeriod::Day => &self.day_test,
            ResponsePeriod::Night => &self.night_test,
        }
    }
}

/// Pair the train and test targets into one bundle.
#[must_use]
pub fn pair_responses(train: Targets, test: Targets) -> ResponseBundle {
    ResponseBundle {
        day_train: train.day,
        night_train: train.night,
        day_test: test.day,
        night_test: test.night,
    }
}

/// Aligned train and test matrices plus their responses.
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    /// Train covariates.
    pub train: FeatureMatrix,
    /// Test covariates.
    pub test: FeatureMatrix,
    /// Responses for both sides.
    pub responses: ResponseBundle,
}

/// Run the preparation steps for both sides of `split`.
///
/// # Errors
///
/// | Variant                           | When                          |
/// |-----------------------------------|-------------------------------|
/// | [`EvalError::DegenerateSplit`]    | either side of `split` is empty |
/// | [`EvalError::SchemaMismatch`]     | the sides disagree on columns |
pub fn prepare_split(dataset: &Dataset, split: &Split) -> Result<PreparedSplit, EvalError> {
    split.ensure_non_empty()?;
    let (train_table, train_targets) = separate_targets(&dataset.select(split.train())?);
    let (test_table, test_targets) = separate_targets(&dataset.select(split.test())?);
    let train = drop_non_predictive(train_table);
    let test = drop_non_predictive(test_table);
    ensure_aligned(&train, &test)?;
    Ok(PreparedSplit {
        train,
        test,
        responses: pair_responses(train_targets, test_targets),
    })
}
