//! Shared input validation for every model family.

use crate::error::ModelError;

/// Validate a row-major training matrix and its target.
///
/// Returns the number of feature columns on success.
pub(crate) fn validate_training(
    features: &[Vec<f64>],
    target: &[f64],
) -> Result<usize, ModelError> {
    if features.is_empty() {
        return Err(ModelError::EmptyDataset);
    }
    if features.len() != target.len() {
        return Err(ModelError::TargetLengthMismatch {
            n_samples: features.len(),
            n_targets: target.len(),
        });
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(ModelError::ZeroFeatures);
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(ModelError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }
    if let Some(sample_index) = target.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::NonFiniteTarget { sample_index });
    }
    Ok(n_features)
}

/// Check that every prediction row has the trained width.
pub(crate) fn validate_prediction(
    features: &[Vec<f64>],
    n_features: usize,
) -> Result<(), ModelError> {
    match features.iter().find(|row| row.len() != n_features) {
        Some(row) => Err(ModelError::PredictionFeatureMismatch {
            expected: n_features,
            got: row.len(),
        }),
        None => Ok(()),
    }
}

/// Transpose a validated row-major matrix into columns.
pub(crate) fn to_columns(features: &[Vec<f64>], n_features: usize) -> Vec<Vec<f64>> {
    (0..n_features)
        .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
        .collect()
}
