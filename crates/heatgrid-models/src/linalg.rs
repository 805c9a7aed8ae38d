//! Dense symmetric solves for the least-squares families.

/// Relative pivot tolerance below which a system is treated as singular.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `A x = b` for a symmetric positive-definite `A` (row-major, `n x n`).
///
/// Returns `None` when a Cholesky pivot falls below
/// `PIVOT_TOLERANCE * max(1, max |A_ii|)`, i.e. the system is singular or
/// numerically rank deficient.
pub(crate) fn solve_symmetric(a: &[f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    debug_assert_eq!(a.len(), n * n);
    debug_assert_eq!(b.len(), n);

    let scale = (0..n).map(|i| a[i * n + i].abs()).fold(1.0f64, f64::max);
    let tol = PIVOT_TOLERANCE * scale;

    let mut l = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= tol {
                    return None;
                }
                l[i * n + i] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    // Forward L y = b
    let mut y = vec![0.0f64; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * y[j];
        }
        y[i] = sum / l[i * n + i];
    }

    // Backward L^T x = y
    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    Some(x)
}

/// Share of a column's own sum of squares that must survive elimination
/// against the earlier kept columns for it to count as independent.
const ALIAS_TOLERANCE: f64 = 1e-9;

/// Least-squares solve of the normal equations `A x = b` that tolerates a
/// rank-deficient `A` (row-major, `n x n`, symmetric positive semi-definite).
///
/// Columns are taken in order; a column whose residual pivot after
/// eliminating the earlier kept columns falls to `ALIAS_TOLERANCE` of its
/// diagonal is aliased and gets a zero coefficient. Returns the solution and
/// the aliased column indices.
pub(crate) fn solve_symmetric_aliased(a: &[f64], b: &[f64], n: usize) -> (Vec<f64>, Vec<usize>) {
    debug_assert_eq!(a.len(), n * n);
    debug_assert_eq!(b.len(), n);

    let mut kept: Vec<usize> = Vec::with_capacity(n);
    let mut aliased = Vec::new();
    // Row t of the Cholesky factor of the kept block, padded to `n`.
    let mut l: Vec<Vec<f64>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = vec![0.0f64; n];
        for (t, &k) in kept.iter().enumerate() {
            let sum = a[i * n + k] - dot(&row[..t], &l[t][..t]);
            row[t] = sum / l[t][t];
        }
        let t = kept.len();
        let pivot = a[i * n + i] - dot(&row[..t], &row[..t]);
        if pivot <= ALIAS_TOLERANCE * a[i * n + i] {
            aliased.push(i);
            continue;
        }
        row[t] = pivot.sqrt();
        l.push(row);
        kept.push(i);
    }

    let m = kept.len();
    let mut y = vec![0.0f64; m];
    for t in 0..m {
        y[t] = (b[kept[t]] - dot(&l[t][..t], &y[..t])) / l[t][t];
    }
    let mut reduced = vec![0.0f64; m];
    for t in (0..m).rev() {
        let mut sum = y[t];
        for s in (t + 1)..m {
            sum -= l[s][t] * reduced[s];
        }
        reduced[t] = sum / l[t][t];
    }

    let mut x = vec![0.0f64; n];
    for (&k, value) in kept.iter().zip(reduced) {
        x[k] = value;
    }
    (x, aliased)
}

/// Dot product of two equal-length slices.
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
