//! Typed grid-cell records and the dataset that holds them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::{EvalError, record::ResponsePeriod};

/// Column names with a fixed role; never usable as covariates.
pub const RESERVED_COLUMNS: [&str; 6] = [
    "city",
    "holdout",
    "x",
    "y",
    "lst_day_mean",
    "lst_night_mean",
];

/// A city identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct CityId(String);

impl CityId {
    /// Wrap a city name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the city name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A spatial holdout-group identifier.
///
/// Rows sharing a group always land on the same side of a split.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct HoldoutGroup(String);

impl HoldoutGroup {
    /// Wrap a group id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the group id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HoldoutGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One spatial grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// City the cell belongs to.
    pub city: CityId,
    /// Holdout group used for splitting only.
    pub holdout: HoldoutGroup,
    /// Easting of the cell centre.
    pub x: f64,
    /// Northing of the cell centre.
    pub y: f64,
    /// Mean diurnal land-surface temperature.
    pub lst_day: f64,
    /// Mean nocturnal land-surface temperature.
    pub lst_night: f64,
    /// Covariate values, ordered as [`Dataset::covariate_names`].
    pub covariates: Vec<f64>,
}

impl Observation {
    /// Return the response for `period`.
    #[must_use]
    pub fn response(&self, period: ResponsePeriod) -> f64 {
        match period {
            ResponsePeriod::Day => self.lst_day,
            ResponsePeriod::Night => self.lst_night,
        }
    }
}

/// An ordered collection of observations sharing one covariate schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    covariate_names: Vec<String>,
    observations: Vec<Observation>,
}

impl Dataset {
    /// Build a dataset, validating the schema and every row.
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                             |
    /// |----------------------------------------|--------------------------------------------------|
    /// | [`EvalError::EmptyDataset`]            | `observations` is empty                          |
    /// | [`EvalError::DuplicateCovariate`]      | a covariate name repeats                         |
    /// | [`EvalError::ReservedCovariate`]       | a covariate uses a [`RESERVED_COLUMNS`] name     |
    /// | [`EvalError::CovariateCountMismatch`]  | a row's covariates differ in length from names   |
    /// | [`EvalError::NonFiniteValue`]          | any numeric field is NaN or infinite             |
    pub fn new(
        covariate_names: Vec<String>,
        observations: Vec<Observation>,
    ) -> Result<Self, EvalError> {
        if observations.is_empty() {
            return Err(EvalError::EmptyDataset);
        }
        let mut seen = HashSet::new();
        for name in &covariate_names {
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                return Err(EvalError::ReservedCovariate { name: name.clone() });
            }
            if !seen.insert(name.as_str()) {
                return Err(EvalError::DuplicateCovariate { name: name.clone() });
            }
        }
        for (row_index, obs) in observations.iter().enumerate() {
            if obs.covariates.len() != covariate_names.len() {
                return Err(EvalError::CovariateCountMismatch {
                    row_index,
                    expected: covariate_names.len(),
                    got: obs.covariates.len(),
                });
            }
            let fixed = [
                ("x", obs.x),
                ("y", obs.y),
                ("lst_day_mean", obs.lst_day),
                ("lst_night_mean", obs.lst_night),
            ];
            let bad = fixed
                .into_iter()
                .chain(
                    covariate_names
                        .iter()
                        .map(String::as_str)
                        .zip(obs.covariates.iter().copied()),
                )
                .find(|(_, v)| !v.is_finite());
            if let Some((column, _)) = bad {
                return Err(EvalError::NonFiniteValue {
                    row_index,
                    column: column.to_owned(),
                });
            }
        }
        Ok(Self {
            covariate_names,
            observations,
        })
    }

    /// Return the covariate names in column order.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Return the observations in row order.
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Return the number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Always `false`; construction rejects empty datasets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Return the column position of covariate `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::UnknownFeature`] if no covariate has that name.
    pub fn covariate_index(&self, name: &str) -> Result<usize, EvalError> {
        self.covariate_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| EvalError::UnknownFeature {
                name: name.to_owned(),
            })
    }

    /// Return every covariate value in column `index`.
    #[must_use]
    pub fn covariate_column(&self, index: usize) -> Vec<f64> {
        self.observations
            .iter()
            .map(|o| o.covariates[index])
            .collect()
    }

    /// Return the distinct cities in sorted order.
    #[must_use]
    pub fn cities(&self) -> Vec<CityId> {
        self.observations
            .iter()
            .map(|o| o.city.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Map each holdout group to the row indices it contains, in sorted group order.
    #[must_use]
    pub fn group_rows(&self) -> BTreeMap<HoldoutGroup, Vec<usize>> {
        let mut groups: BTreeMap<HoldoutGroup, Vec<usize>> = BTreeMap::new();
        for (i, obs) in self.observations.iter().enumerate() {
            groups.entry(obs.holdout.clone()).or_default().push(i);
        }
        groups
    }

    /// Materialise the rows at `indices`, in order; duplicates are kept.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::EmptyDataset`] when `indices` is empty.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Result<Dataset, EvalError> {
        if indices.is_empty() {
            return Err(EvalError::EmptyDataset);
        }
        Ok(Self {
            covariate_names: self.covariate_names.clone(),
            observations: indices
                .iter()
                .map(|&i| self.observations[i].clone())
                .collect(),
        })
    }

    /// Keep only the rows of `city`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::UnknownCity`] if the city has no rows.
    pub fn restrict_to_city(&self, city: &CityId) -> Result<Dataset, EvalError> {
        let rows = self.city_rows(city);
        if rows.is_empty() {
            return Err(EvalError::UnknownCity {
                city: city.to_string(),
            });
        }
        self.select(&rows)
    }

    /// Row indices belonging to `city`, ascending.
    #[must_use]
    pub fn city_rows(&self, city: &CityId) -> Vec<usize> {
        self.observations
            .iter()
            .enumerate()
            .filter(|(_, o)| &o.city == city)
            .map(|(i, _)| i)
            .collect()
    }

    /// Keep only the named covariates, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::UnknownFeature`] for a name that is not a covariate.
    pub fn with_covariates(&self, names: &[String]) -> Result<Dataset, EvalError> {
        let indices = names
            .iter()
            .map(|n| self.covariate_index(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            covariate_names: names.to_vec(),
            observations: self
                .observations
                .iter()
                .map(|o| Observation {
                    covariates: indices.iter().map(|&i| o.covariates[i]).collect(),
                    ..o.clone()
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(city: &str, group: &str, cov: Vec<f64>) -> Observation {
        Observation {
            city: CityId::new(city),
            holdout: HoldoutGroup::new(group),
            x: 0.0,
            y: 0.0,
            lst_day: 30.0,
            lst_night: 20.0,
            covariates: cov,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn response_follows_period() {
        let o = obs("c", "g", vec![1.0]);
        assert_eq!(o.response(ResponsePeriod::Day), 30.0);
        assert_eq!(o.response(ResponsePeriod::Night), 20.0);
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            Dataset::new(names(&["a"]), vec![]),
            Err(EvalError::EmptyDataset)
        ));
    }

    #[test]
    fn rejects_reserved_and_duplicate_names() {
        let rows = vec![obs("c", "g", vec![1.0, 2.0])];
        assert!(matches!(
            Dataset::new(names(&["a", "holdout"]), rows.clone()),
            Err(EvalError::ReservedCovariate { .. })
        ));
        assert!(matches!(
            Dataset::new(names(&["a", "a"]), rows),
            Err(EvalError::DuplicateCovariate { .. })
        ));
    }

    #[test]
    fn rejects_ragged_and_non_finite_rows() {
        let err = Dataset::new(names(&["a"]), vec![obs("c", "g", vec![])]).unwrap_err();
        assert!(matches!(
            err,
            EvalError::CovariateCountMismatch {
                row_index: 0,
                expected: 1,
                got: 0
            }
        ));
        let err = Dataset::new(names(&["a"]), vec![obs("c", "g", vec![f64::NAN])]).unwrap_err();
        assert!(matches!(err, EvalError::NonFiniteValue { ref column, .. } if column == "a"));
    }

    #[test]
    fn groups_cities_and_restriction() {
        let ds = Dataset::new(
            names(&["a", "b"]),
            vec![
                obs("north", "g2", vec![1.0, 10.0]),
                obs("south", "g1", vec![2.0, 20.0]),
                obs("north", "g1", vec![3.0, 30.0]),
            ],
        )
        .unwrap();
        assert_eq!(ds.cities(), vec![CityId::new("north"), CityId::new("south")]);
        let groups = ds.group_rows();
        assert_eq!(groups[&HoldoutGroup::new("g1")], vec![1, 2]);
        assert_eq!(groups[&HoldoutGroup::new("g2")], vec![0]);

        let north = ds.restrict_to_city(&CityId::new("north")).unwrap();
        assert_eq!(north.len(), 2);
        assert!(matches!(
            ds.restrict_to_city(&CityId::new("east")),
            Err(EvalError::UnknownCity { .. })
        ));

        let only_b = ds.with_covariates(&names(&["b"])).unwrap();
        assert_eq!(only_b.covariate_column(0), vec![10.0, 20.0, 30.0]);
        assert!(ds.with_covariates(&names(&["z"])).is_err());
    }

    #[test]
    fn select_keeps_duplicates() {
        let ds = Dataset::new(names(&["a"]), vec![obs("c", "g", vec![1.0]), obs("c", "h", vec![2.0])])
            .unwrap();
        let picked = ds.select(&[1, 1, 0]).unwrap();
        assert_eq!(picked.covariate_column(0), vec![2.0, 2.0, 1.0]);
    }
}
