use crate::{
    ModelError,
    validate::{validate_prediction, validate_training},
};

/// Null model: predicts the training mean for every row.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MeanModel {
    mean: f64,
    n_features: usize,
}

impl MeanModel {
    /// Fit the mean of `target`. Features are validated but otherwise ignored.
    ///
    /// # Errors
    ///
    /// Any input error from the shared training checks.
    pub fn fit(features: &[Vec<f64>], target: &[f64]) -> Result<Self, ModelError> {
        let n_features = validate_training(features, target)?;
        let mean = target.iter().sum::<f64>() / target.len() as f64;
        Ok(Self { mean, n_features })
    }

    /// Return the fitted mean.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Predict the mean for each row.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PredictionFeatureMismatch`] on a row of the wrong width.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        validate_prediction(features, self.n_features)?;
        Ok(vec![self.mean; features.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::MeanModel;

    #[test]
    fn predicts_training_mean() {
        let model = MeanModel::fit(&[vec![0.0], vec![1.0], vec![2.0]], &[1.0, 2.0, 6.0]).unwrap();
        assert!((model.mean() - 3.0).abs() < 1e-12);
        assert_eq!(model.predict(&[vec![10.0], vec![-4.0]]).unwrap(), vec![3.0, 3.0]);
    }
}
