//! Constant predictors: the weighted mean regressor and the class-prior classifier.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::weighted_mean;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanRegressor {
    value: f64,
}

impl MeanRegressor {
    pub fn fit(y: &[f64], weights: Option<&[f64]>) -> Result<Self, AppError> {
        if y.is_empty() {
            return Err(AppError::data("Mean regressor: no rows to fit."));
        }
        let value = weighted_mean(y, weights);
        if !value.is_finite() {
            return Err(AppError::data("Mean regressor: non-finite mean (check weights and targets)."));
        }
        Ok(Self { value })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn predict(&self, n_rows: usize) -> Vec<f64> {
        vec![self.value; n_rows]
    }
}

/// Predicts the observed positive-class rate for every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorClassifier {
    p_one: f64,
}

impl PriorClassifier {
    pub fn fit(labels: &[f64]) -> Result<Self, AppError> {
        if labels.is_empty() {
            return Err(AppError::data("Prior classifier: no rows to fit."));
        }
        let ones = labels.iter().filter(|v| **v == 1.0).count();
        Ok(Self {
            p_one: ones as f64 / labels.len() as f64,
        })
    }

    pub fn p_one(&self) -> f64 {
        self.p_one
    }

    pub fn predict_proba(&self, n_rows: usize) -> Vec<f64> {
        vec![self.p_one; n_rows]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_matches_label_share() {
        let prior = PriorClassifier::fit(&[1.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!((prior.p_one() - 0.6).abs() < 1e-12);
        assert_eq!(prior.predict_proba(2), vec![0.6, 0.6]);
    }

    #[test]
    fn weighted_mean_regressor() {
        let m = MeanRegressor::fit(&[1.0, 3.0], Some(&[3.0, 1.0])).unwrap();
        assert!((m.value() - 1.5).abs() < 1e-12);
        assert!(MeanRegressor::fit(&[], None).is_err());
    }
}
