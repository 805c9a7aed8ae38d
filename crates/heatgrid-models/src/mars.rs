//! Additive multivariate adaptive regression splines.
//!
//! The forward pass greedily adds mirrored hinge pairs `max(0, x - t)` and
//! `max(0, t - x)` that most reduce the residual sum of squares. The
//! backward pass drops one term at a time and keeps the subset with the
//! lowest generalized cross-validation score.

use tracing::{debug, instrument};

use crate::{
    ModelError,
    linalg::{dot, solve_symmetric},
    node::FeatureIndex,
    validate::{to_columns, validate_prediction, validate_training},
};

/// Residual sum of squares, relative to `y^T y`, treated as an exact fit.
const RSS_FLOOR: f64 = 1e-12;

/// A single basis function of a fitted MARS model.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BasisTerm {
    /// Constant term.
    Intercept,
    /// `max(0, x - knot)`, or `max(0, knot - x)` when `reflected`.
    Hinge {
        /// Feature the hinge reads.
        feature: FeatureIndex,
        /// Knot location.
        knot: f64,
        /// Whether the hinge opens to the left of the knot.
        reflected: bool,
    },
}

impl BasisTerm {
    fn value(&self, x: f64) -> f64 {
        match *self {
            BasisTerm::Intercept => 1.0,
            BasisTerm::Hinge {
                knot, reflected, ..
            } => {
                if reflected {
                    (knot - x).max(0.0)
                } else {
                    (x - knot).max(0.0)
                }
            }
        }
    }

    fn eval_row(&self, row: &[f64]) -> f64 {
        match self {
            BasisTerm::Intercept => 1.0,
            BasisTerm::Hinge { feature, .. } => self.value(row[feature.index()]),
        }
    }

    fn eval_column(&self, columns: &[Vec<f64>], n_samples: usize) -> Vec<f64> {
        match self {
            BasisTerm::Intercept => vec![1.0; n_samples],
            BasisTerm::Hinge { feature, .. } => columns[feature.index()]
                .iter()
                .map(|&x| self.value(x))
                .collect(),
        }
    }
}

/// Configuration for additive MARS.
///
/// # Defaults
///
/// | Parameter    | Default |
/// |--------------|---------|
/// | `max_degree` | 1       |
/// | `max_terms`  | 21      |
/// | `penalty`    | 1.0     |
/// | `endspan`    | 5       |
/// | `max_knots`  | 40      |
/// | `thresh`     | 0.001   |
#[derive(Debug, Clone)]
pub struct MarsConfig {
    pub(crate) max_degree: usize,
    pub(crate) max_terms: usize,
    pub(crate) penalty: f64,
    pub(crate) endspan: usize,
    pub(crate) max_knots: usize,
    pub(crate) thresh: f64,
}

impl MarsConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_degree: 1,
            max_terms: 21,
            penalty: 1.0,
            endspan: 5,
            max_knots: 40,
            thresh: 1e-3,
        }
    }

    /// Set the interaction degree. Only 1 is accepted by [`MarsConfig::fit`].
    #[must_use]
    pub fn with_max_degree(mut self, max_degree: usize) -> Self {
        self.max_degree = max_degree;
        self
    }

    /// Set the cap on basis terms (intercept included) in the forward pass.
    #[must_use]
    pub fn with_max_terms(mut self, max_terms: usize) -> Self {
        self.max_terms = max_terms;
        self
    }

    /// Set the per-knot GCV penalty.
    #[must_use]
    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    /// Set how many extreme values on each side are never used as knots.
    #[must_use]
    pub fn with_endspan(mut self, endspan: usize) -> Self {
        self.endspan = endspan;
        self
    }

    /// Set the maximum number of candidate knots per feature.
    #[must_use]
    pub fn with_max_knots(mut self, max_knots: usize) -> Self {
        self.max_knots = max_knots;
        self
    }

    /// Set the relative RSS improvement below which the forward pass stops.
    #[must_use]
    pub fn with_thresh(mut self, thresh: f64) -> Self {
        self.thresh = thresh;
        self
    }

    /// Return the GCV penalty.
    #[must_use]
    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Return the endspan.
    #[must_use]
    pub fn endspan(&self) -> usize {
        self.endspan
    }

    /// Fit the model.
    ///
    /// # Errors
    ///
    /// | Variant                          | When                                         |
    /// |----------------------------------|----------------------------------------------|
    /// | [`ModelError::UnsupportedDegree`]| `max_degree != 1`                            |
    /// | [`ModelError::InvalidTermCount`] | `max_terms < 3`                              |
    /// | [`ModelError::InvalidPenalty`]   | `penalty` or `thresh` negative or non-finite |
    /// | [`ModelError::SingularMatrix`]   | the pruned design cannot be solved           |
    ///
    /// plus any input error from the shared training checks.
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], target: &[f64]) -> Result<Mars, ModelError> {
        if self.max_degree != 1 {
            return Err(ModelError::UnsupportedDegree {
                max_degree: self.max_degree,
            });
        }
        if self.max_terms < 3 {
            return Err(ModelError::InvalidTermCount {
                max_terms: self.max_terms,
            });
        }
        for (name, value) in [("penalty", self.penalty), ("thresh", self.thresh)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ModelError::InvalidPenalty { name, value });
            }
        }
        let n_features = validate_training(features, target)?;
        let columns = to_columns(features, n_features);

        let design = self.forward_pass(&columns, target);
        let (terms, coefficients) = self.backward_pass(&design, target.len())?;

        debug!(
            forward_terms = design.terms.len(),
            kept_terms = terms.len(),
            "mars fitted"
        );

        Ok(Mars {
            terms,
            coefficients,
            n_features,
        })
    }

    fn candidate_knots(&self, column: &[f64]) -> Vec<f64> {
        let mut unique = column.to_vec();
        unique.sort_unstable_by(f64::total_cmp);
        unique.dedup();
        if unique.len() < 2 {
            return Vec::new();
        }
        let interior = if unique.len() > 2 * self.endspan {
            &unique[self.endspan..unique.len() - self.endspan]
        } else {
            &unique[..unique.len() - 1]
        };
        if interior.len() <= self.max_knots || self.max_knots < 2 {
            return interior.to_vec();
        }
        let last = interior.len() - 1;
        let mut picked: Vec<f64> = (0..self.max_knots)
            .map(|i| interior[(i * last + (self.max_knots - 1) / 2) / (self.max_knots - 1)])
            .collect();
        picked.dedup();
        picked
    }

    fn forward_pass(&self, columns: &[Vec<f64>], target: &[f64]) -> Design {
        let n_samples = target.len();
        let mut design = Design::new(target);
        let yty = design.yty;
        let floor = RSS_FLOOR * yty;
        let mut rss = design.rss().unwrap_or(yty);

        let knots: Vec<Vec<f64>> = columns.iter().map(|c| self.candidate_knots(c)).collect();

        while design.terms.len() < self.max_terms && rss > floor {
            let room = self.max_terms - design.terms.len();
            let mut best: Option<(f64, Vec<BasisTerm>)> = None;

            for (feat_idx, feat_knots) in knots.iter().enumerate() {
                let feature = FeatureIndex::new(feat_idx);
                for &knot in feat_knots {
                    let up = BasisTerm::Hinge {
                        feature,
                        knot,
                        reflected: false,
                    };
                    let down = BasisTerm::Hinge {
                        feature,
                        knot,
                        reflected: true,
                    };
                    if design.terms.contains(&up) && design.terms.contains(&down) {
                        continue;
                    }
                    let up_col = up.eval_column(columns, n_samples);
                    let down_col = down.eval_column(columns, n_samples);

                    let pair = if room >= 2 {
                        design.augmented_rss(&[up_col.as_slice(), down_col.as_slice()], target)
                    } else {
                        None
                    };
                    let candidates: Vec<(Option<f64>, Vec<BasisTerm>)> = match pair {
                        Some(r) => vec![(Some(r), vec![up, down])],
                        None => vec![
                            (design.augmented_rss(&[up_col.as_slice()], target), vec![up]),
                            (design.augmented_rss(&[down_col.as_slice()], target), vec![down]),
                        ],
                    };
                    for (candidate_rss, terms) in candidates {
                        if let Some(r) = candidate_rss
                            && best.as_ref().is_none_or(|(b, _)| r < *b)
                        {
                            best = Some((r, terms));
                        }
                    }
                }
            }

            let Some((new_rss, new_terms)) = best else {
                break;
            };
            if (rss - new_rss) / rss < self.thresh {
                break;
            }
            for term in new_terms {
                let col = term.eval_column(columns, n_samples);
                design.push(term, col, target);
            }
            rss = new_rss;
        }
        design
    }

    fn backward_pass(
        &self,
        design: &Design,
        n_samples: usize,
    ) -> Result<(Vec<BasisTerm>, Vec<f64>), ModelError> {
        let n = n_samples as f64;
        let gcv = |rss: f64, n_terms: usize| -> f64 {
            let m = n_terms as f64;
            let c = m + self.penalty * (m - 1.0) / 2.0;
            if c >= n {
                f64::INFINITY
            } else {
                (rss / n) / (1.0 - c / n).powi(2)
            }
        };
        let mut current: Vec<usize> = (0..design.terms.len()).collect();
        let full_rss = design
            .subset_solve(&current)
            .map(|(_, r)| r)
            .unwrap_or(f64::INFINITY);
        let mut best_subset = current.clone();
        let mut best_gcv = gcv(full_rss, current.len());

        while current.len() > 1 {
            let mut best_removal: Option<(usize, f64)> = None;
            for pos in 1..current.len() {
                let mut subset = current.clone();
                subset.remove(pos);
                if let Some((_, r)) = design.subset_solve(&subset)
                    && best_removal.is_none_or(|(_, b)| r < b)
                {
                    best_removal = Some((pos, r));
                }
            }
            let Some((pos, r)) = best_removal else {
                break;
            };
            current.remove(pos);
            let g = gcv(r, current.len());
            if g < best_gcv {
                best_gcv = g;
                best_subset = current.clone();
            }
        }

        let (coefficients, _) =
            design
                .subset_solve(&best_subset)
                .ok_or(ModelError::SingularMatrix {
                    family: "mars",
                    size: best_subset.len(),
                })?;
        let terms = best_subset.iter().map(|&i| design.terms[i]).collect();
        Ok((terms, coefficients))
    }
}

impl Default for MarsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward-pass state: basis columns with their Gram matrix and `B^T y`.
struct Design {
    terms: Vec<BasisTerm>,
    cols: Vec<Vec<f64>>,
    gram: Vec<Vec<f64>>,
    bty: Vec<f64>,
    yty: f64,
}

impl Design {
    fn new(target: &[f64]) -> Self {
        let mut design = Self {
            terms: Vec::new(),
            cols: Vec::new(),
            gram: Vec::new(),
            bty: Vec::new(),
            yty: dot(target, target),
        };
        design.push(BasisTerm::Intercept, vec![1.0; target.len()], target);
        design
    }

    fn push(&mut self, term: BasisTerm, col: Vec<f64>, target: &[f64]) {
        let cross: Vec<f64> = self.cols.iter().map(|c| dot(c, &col)).collect();
        for (row, &v) in self.gram.iter_mut().zip(&cross) {
            row.push(v);
        }
        let mut new_row = cross;
        new_row.push(dot(&col, &col));
        self.gram.push(new_row);
        self.bty.push(dot(&col, target));
        self.terms.push(term);
        self.cols.push(col);
    }

    fn rss(&self) -> Option<f64> {
        let all: Vec<usize> = (0..self.terms.len()).collect();
        self.subset_solve(&all).map(|(_, r)| r)
    }

    /// Least-squares coefficients and RSS using only the terms in `subset`.
    fn subset_solve(&self, subset: &[usize]) -> Option<(Vec<f64>, f64)> {
        let k = subset.len();
        let mut a = vec![0.0; k * k];
        let mut b = vec![0.0; k];
        for (i, &si) in subset.iter().enumerate() {
            for (j, &sj) in subset.iter().enumerate() {
                a[i * k + j] = self.gram[si][sj];
            }
            b[i] = self.bty[si];
        }
        let beta = solve_symmetric(&a, &b, k)?;
        let rss = (self.yty - dot(&beta, &b)).max(0.0);
        Some((beta, rss))
    }

    /// RSS after appending `extra` columns to the current design.
    fn augmented_rss(&self, extra: &[&[f64]], target: &[f64]) -> Option<f64> {
        let m = self.terms.len();
        let k = m + extra.len();
        let mut a = vec![0.0; k * k];
        let mut b = vec![0.0; k];
        for i in 0..m {
            a[i * k..i * k + m].copy_from_slice(&self.gram[i]);
            b[i] = self.bty[i];
        }
        for (e, col) in extra.iter().enumerate() {
            let r = m + e;
            for i in 0..m {
                let v = dot(&self.cols[i], col);
                a[r * k + i] = v;
                a[i * k + r] = v;
            }
            for (e2, col2) in extra.iter().enumerate().take(e + 1) {
                let v = dot(col, col2);
                a[r * k + m + e2] = v;
                a[(m + e2) * k + r] = v;
            }
            b[r] = dot(col, target);
        }
        let beta = solve_symmetric(&a, &b, k)?;
        Some((self.yty - dot(&beta, &b)).max(0.0))
    }
}

/// A fitted additive MARS model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Mars {
    terms: Vec<BasisTerm>,
    coefficients: Vec<f64>,
    n_features: usize,
}

impl Mars {
    /// Predict every row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] on a row of the wrong width.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        validate_prediction(features, self.n_features)?;
        Ok(features
            .iter()
            .map(|row| {
                self.terms
                    .iter()
                    .zip(&self.coefficients)
                    .map(|(t, c)| c * t.eval_row(row))
                    .sum()
            })
            .collect())
    }

    /// Return the basis terms kept after pruning.
    #[must_use]
    pub fn terms(&self) -> &[BasisTerm] {
        &self.terms
    }

    /// Return the coefficient of each kept term.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}
