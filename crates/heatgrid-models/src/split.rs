use rand::Rng;

use crate::node::FeatureIndex;

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Decrease in the sum of squared errors from this split.
    pub(crate) impurity_decrease: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Sum of squared deviations from the mean, from running sums.
pub(crate) fn sse(sum: f64, sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (sum_sq - sum * sum / n as f64).max(0.0)
}

/// Find the variance-reducing split among a random subset of features.
///
/// For each of `max_features` randomly chosen features, sorts the
/// `(value, target)` pairs, scans left-to-right with running sums and
/// keeps the split with the largest decrease in squared error.
///
/// Returns `None` when no split reduces the error (constant features,
/// constant target, or `min_samples_leaf` cannot be honoured).
///
/// `columns` is column-major: `columns[feature_idx][sample_idx]`.
/// `sample_indices` may contain duplicates (bootstrap draws).
pub(crate) fn find_best_split(
    columns: &[Vec<f64>],
    target: &[f64],
    sample_indices: &[usize],
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = columns.len();
    let n_samples = sample_indices.len();

    if n_samples < 2 || n_features == 0 {
        return None;
    }

    let (total_sum, total_sq) = sample_indices.iter().fold((0.0, 0.0), |(s, q), &si| {
        (s + target[si], q + target[si] * target[si])
    });
    let parent_sse = sse(total_sum, total_sq, n_samples);

    // Partial Fisher-Yates: shuffle only the first `max_features` positions.
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }

    let mut best_decrease = 0.0f64;
    let mut best: Option<(FeatureIndex, f64)> = None;
    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n_samples);

    for &feat_idx in &feature_order[..take] {
        let col = &columns[feat_idx];

        sorted.clear();
        sorted.extend(sample_indices.iter().map(|&si| (col[si], target[si])));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for i in 0..(n_samples - 1) {
            let (val_i, y_i) = sorted[i];
            left_sum += y_i;
            left_sq += y_i * y_i;

            let n_left = i + 1;
            let n_right = n_samples - n_left;

            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let decrease = parent_sse
                - sse(left_sum, left_sq, n_left)
                - sse(total_sum - left_sum, total_sq - left_sq, n_right);

            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((FeatureIndex::new(feat_idx), (val_i + val_next) / 2.0));
            }
        }
    }

    let (feature, threshold) = best?;

    let col = &columns[feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
        sample_indices.iter().partition(|&&si| col[si] <= threshold);

    Some(SplitResult {
        feature,
        threshold,
        impurity_decrease: best_decrease,
        left_indices,
        right_indices,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{find_best_split, sse};

    #[test]
    fn sse_of_constant_is_zero() {
        assert!(sse(15.0, 75.0, 3).abs() < 1e-12);
    }

    #[test]
    fn step_function_finds_correct_split() {
        let columns = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let target = vec![0.0, 0.0, 0.0, 5.0, 5.0, 5.0];
        let samples: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = find_best_split(&columns, &target, &samples, 1, 1, &mut rng)
            .expect("should find a split");
        assert_eq!(split.feature.index(), 0);
        assert!(split.threshold > 3.0 && split.threshold < 10.0);
        assert_eq!(split.left_indices.len(), 3);
        assert_eq!(split.right_indices.len(), 3);
        assert!((split.impurity_decrease - 37.5).abs() < 1e-9);
    }

    #[test]
    fn constant_feature_returns_none() {
        let columns = vec![vec![5.0, 5.0, 5.0, 5.0]];
        let target = vec![0.0, 1.0, 2.0, 3.0];
        let samples: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(find_best_split(&columns, &target, &samples, 1, 1, &mut rng).is_none());
    }

    #[test]
    fn constant_target_returns_none() {
        let columns = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let target = vec![2.0; 4];
        let samples: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(find_best_split(&columns, &target, &samples, 1, 1, &mut rng).is_none());
    }

    #[test]
    fn min_samples_leaf_enforced() {
        let columns = vec![vec![1.0, 10.0]];
        let target = vec![0.0, 1.0];
        let samples: Vec<usize> = (0..2).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(find_best_split(&columns, &target, &samples, 1, 2, &mut rng).is_none());
    }

    #[test]
    fn duplicated_samples_are_counted() {
        let columns = vec![vec![0.0, 1.0]];
        let target = vec![0.0, 4.0];
        let samples = vec![0, 0, 0, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let split = find_best_split(&columns, &target, &samples, 1, 1, &mut rng).unwrap();
        assert_eq!(split.left_indices, vec![0, 0, 0]);
        assert_eq!(split.right_indices, vec![1]);
    }
}
