//! Out-of-sample error metrics.

/// Mean absolute error between `predicted` and `observed`.
///
/// Returns NaN for empty input.
#[must_use]
pub fn mean_absolute_error(predicted: &[f64], observed: &[f64]) -> f64 {
    debug_assert_eq!(predicted.len(), observed.len());
    if observed.is_empty() {
        return f64::NAN;
    }
    predicted
        .iter()
        .zip(observed)
        .map(|(p, o)| (p - o).abs())
        .sum::<f64>()
        / observed.len() as f64
}

/// Coefficient of determination of `predicted` against `observed`.
///
/// `1 - SS_res / SS_tot` with `SS_tot` taken around the mean of `observed`.
/// A constant `observed` scores 1.0 when predictions are exact and 0.0
/// otherwise. Returns NaN for empty input.
#[must_use]
pub fn r2_score(predicted: &[f64], observed: &[f64]) -> f64 {
    debug_assert_eq!(predicted.len(), observed.len());
    if observed.is_empty() {
        return f64::NAN;
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let ss_tot: f64 = observed.iter().map(|o| (o - mean).powi(2)).sum();
    let ss_res: f64 = predicted
        .iter()
        .zip(observed)
        .map(|(p, o)| (o - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mae_of_known_errors() {
        let mae = mean_absolute_error(&[1.0, 2.0, 3.0], &[2.0, 2.0, 1.0]);
        assert!((mae - 1.0).abs() < 1e-12);
    }

    #[test]
    fn r2_perfect_and_mean_predictor() {
        let obs = [1.0, 2.0, 3.0, 4.0];
        assert!((r2_score(&obs, &obs) - 1.0).abs() < 1e-12);
        assert!(r2_score(&[2.5; 4], &obs).abs() < 1e-12);
        assert!(r2_score(&[4.0, 3.0, 2.0, 1.0], &obs) < 0.0);
    }

    #[test]
    fn r2_constant_observed() {
        assert_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2_score(&[5.0, 6.0], &[5.0, 5.0]), 0.0);
    }

    #[test]
    fn empty_input_is_nan() {
        assert!(mean_absolute_error(&[], &[]).is_nan());
        assert!(r2_score(&[], &[]).is_nan());
    }
}
