//! Group-respecting random train/test splits.

use rand::Rng;
use tracing::debug;

use crate::{
    EvalError,
    dataset::{Dataset, HoldoutGroup},
};

/// Share of the requested test size that must be reached before drawing stops.
pub const DEFAULT_FILL_DAMPING: f64 = 0.95;

/// Draws whole holdout groups into the test set until it is large enough.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `damping` | 0.95    |
#[derive(Debug, Clone, Copy)]
pub struct HoldoutSplitter {
    test_fraction: f64,
    damping: f64,
}

impl HoldoutSplitter {
    /// Create a splitter targeting `test_fraction` of the rows.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidTestFraction`] unless `0.0 <= test_fraction < 1.0`.
    pub fn new(test_fraction: f64) -> Result<Self, EvalError> {
        if !(0.0..1.0).contains(&test_fraction) {
            return Err(EvalError::InvalidTestFraction { test_fraction });
        }
        Ok(Self {
            test_fraction,
            damping: DEFAULT_FILL_DAMPING,
        })
    }

    /// Replace the fill damping factor.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidDamping`] unless `0.0 < damping <= 1.0`.
    pub fn with_damping(mut self, damping: f64) -> Result<Self, EvalError> {
        if !(damping > 0.0 && damping <= 1.0) {
            return Err(EvalError::InvalidDamping { damping });
        }
        self.damping = damping;
        Ok(self)
    }

    /// Return the target test fraction.
    #[must_use]
    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    /// Return the fill damping factor.
    #[must_use]
    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Partition `dataset` into train and test rows.
    ///
    /// Groups are drawn uniformly without replacement until the test rows
    /// reach `len * test_fraction * damping`, or no groups remain. Every row
    /// of a drawn group is a test row; every other row is a train row.
    pub fn split(&self, dataset: &Dataset, rng: &mut impl Rng) -> Split {
        let required = dataset.len() as f64 * self.test_fraction * self.damping;
        let mut remaining: Vec<(HoldoutGroup, Vec<usize>)> = dataset.group_rows().into_iter().collect();

        let mut held_out = Vec::new();
        let mut test = Vec::new();
        while (test.len() as f64) < required && !remaining.is_empty() {
            let pick = rng.gen_range(0..remaining.len());
            let (group, rows) = remaining.swap_remove(pick);
            test.extend(rows);
            held_out.push(group);
        }

        let split = Split::from_test_rows(dataset.len(), test, held_out);
        debug!(
            n_train = split.train.len(),
            n_test = split.test.len(),
            n_groups = split.held_out.len(),
            "drew holdout split"
        );
        split
    }
}

/// Disjoint train and test row indices covering a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    train: Vec<usize>,
    test: Vec<usize>,
    held_out: Vec<HoldoutGroup>,
}

impl Split {
    /// Build a split from explicit test rows of a dataset with `n_rows` rows.
    ///
    /// Train rows are every index in `0..n_rows` not listed in `test`. Both
    /// sides are sorted ascending; duplicate test indices collapse.
    ///
    /// # Panics
    ///
    /// Panics if a test index is not below `n_rows`.
    #[must_use]
    pub fn from_test_rows(n_rows: usize, mut test: Vec<usize>, held_out: Vec<HoldoutGroup>) -> Self {
        test.sort_unstable();
        test.dedup();
        let mut is_test = vec![false; n_rows];
        for &i in &test {
            is_test[i] = true;
        }
        let train = (0..n_rows).filter(|&i| !is_test[i]).collect();
        Self {
            train,
            test,
            held_out,
        }
    }

    /// Train row indices, ascending.
    #[must_use]
    pub fn train(&self) -> &[usize] {
        &self.train
    }

    /// Test row indices, ascending.
    #[must_use]
    pub fn test(&self) -> &[usize] {
        &self.test
    }

    /// Groups drawn into the test set, in draw order.
    #[must_use]
    pub fn held_out(&self) -> &[HoldoutGroup] {
        &self.held_out
    }

    /// Fail unless both sides have at least one row.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::DegenerateSplit`] when either side is empty.
    pub fn ensure_non_empty(&self) -> Result<(), EvalError> {
        if self.train.is_empty() || self.test.is_empty() {
            return Err(EvalError::DegenerateSplit {
                n_train: self.train.len(),
                n_test: self.test.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::dataset::{CityId, Observation};

    fn grouped(sizes: &[usize]) -> Dataset {
        let observations = sizes
            .iter()
            .enumerate()
            .flat_map(|(g, &n)| {
                (0..n).map(move |i| Observation {
                    city: CityId::new("c"),
                    holdout: HoldoutGroup::new(format!("g{g}")),
                    x: i as f64,
                    y: g as f64,
                    lst_day: 30.0,
                    lst_night: 20.0,
                    covariates: vec![i as f64],
                })
            })
            .collect();
        Dataset::new(vec!["v".to_owned()], observations).unwrap()
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(HoldoutSplitter::new(1.0).is_err());
        assert!(HoldoutSplitter::new(-0.1).is_err());
        assert!(HoldoutSplitter::new(0.2).unwrap().with_damping(0.0).is_err());
        assert!(HoldoutSplitter::new(0.2).unwrap().with_damping(1.5).is_err());
    }

    #[test]
    fn zero_fraction_keeps_everything_in_train() {
        let ds = grouped(&[3, 3, 3]);
        let split = HoldoutSplitter::new(0.0)
            .unwrap()
            .split(&ds, &mut ChaCha8Rng::seed_from_u64(1));
        assert!(split.test().is_empty());
        assert_eq!(split.train().len(), 9);
        assert!(split.ensure_non_empty().is_err());
    }

    #[test]
    fn groups_never_straddle_and_partition_is_complete() {
        let ds = grouped(&[5, 1, 7, 2, 4, 6, 3]);
        let splitter = HoldoutSplitter::new(0.3).unwrap();
        for seed in 0..20 {
            let split = splitter.split(&ds, &mut ChaCha8Rng::seed_from_u64(seed));
            assert_eq!(split.train().len() + split.test().len(), ds.len());
            let required = ds.len() as f64 * 0.3 * DEFAULT_FILL_DAMPING;
            assert!(split.test().len() as f64 >= required);
            for (group, rows) in ds.group_rows() {
                let in_test = rows.iter().filter(|r| split.test().contains(r)).count();
                assert!(in_test == 0 || in_test == rows.len(), "{group} straddles");
                assert_eq!(in_test > 0, split.held_out().contains(&group));
            }
        }
    }

    #[test]
    fn oversized_request_takes_every_group() {
        let ds = grouped(&[2, 2]);
        let split = HoldoutSplitter::new(0.99)
            .unwrap()
            .with_damping(1.0)
            .unwrap()
            .split(&ds, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(split.test().len(), 4);
        assert!(split.train().is_empty());
    }

    #[test]
    fn same_seed_same_split() {
        let ds = grouped(&[4, 4, 4, 4, 4]);
        let splitter = HoldoutSplitter::new(0.4).unwrap();
        let a = splitter.split(&ds, &mut ChaCha8Rng::seed_from_u64(9));
        let b = splitter.split(&ds, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_test_rows_collapse_duplicates() {
        let split = Split::from_test_rows(5, vec![3, 1, 3], Vec::new());
        assert_eq!(split.test(), &[1, 3]);
        assert_eq!(split.train(), &[0, 2, 4]);
    }

    #[test]
    #[should_panic]
    fn explicit_test_row_out_of_range_panics() {
        let _ = Split::from_test_rows(3, vec![3], Vec::new());
    }
}
