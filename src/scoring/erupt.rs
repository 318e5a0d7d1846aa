//! ERUPT: expected response under proposed treatments.
//!
//! An inverse-propensity estimate of the policy value: rows whose observed
//! treatment matches the policy are reweighted by `1 / P(t_i | x_i)`, the
//! weights are rescaled to sum to `n`, and the score is `mean(w · y)`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{ClassifierModel, ClassifierSpec};

/// Propensity model used by the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EruptPropensity {
    /// Observed treatment share for every row.
    #[default]
    Prior,
    Logistic,
}

#[derive(Debug, Clone)]
pub struct Erupt {
    propensity: ClassifierModel,
}

impl Erupt {
    pub fn fit(x: &DMatrix<f64>, treatment: &[f64], kind: EruptPropensity) -> Result<Self, AppError> {
        let spec = match kind {
            EruptPropensity::Prior => ClassifierSpec::Prior,
            EruptPropensity::Logistic => ClassifierSpec::Logistic { c: 1.0 },
        };
        Ok(Self {
            propensity: spec.fit(x, treatment, 0)?,
        })
    }

    /// `P(t = 1 | x)` per row.
    pub fn propensity(&self, x: &DMatrix<f64>) -> Vec<f64> {
        self.propensity.predict_proba(x)
    }

    /// Normalized policy weights. All zero when no row follows the policy.
    pub fn weights(&self, x: &DMatrix<f64>, treatment: &[f64], policy: &[bool]) -> Result<Vec<f64>, AppError> {
        let n = treatment.len();
        if policy.len() != n || x.nrows() != n {
            return Err(AppError::data(format!(
                "ERUPT: {n} treatments, {} policy entries, {} feature rows.",
                policy.len(),
                x.nrows()
            )));
        }
        let p = self.propensity(x);
        let raw: Vec<f64> = (0..n)
            .map(|i| {
                let treated = treatment[i] == 1.0;
                if treated != policy[i] {
                    return 0.0;
                }
                let p_actual = if treated { p[i] } else { 1.0 - p[i] };
                if p_actual > 0.0 { 1.0 / p_actual } else { 0.0 }
            })
            .collect();
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return Ok(vec![0.0; n]);
        }
        Ok(raw.iter().map(|w| w * n as f64 / total).collect())
    }

    /// Policy value; NaN when no row's treatment agrees with the policy.
    pub fn score(&self, x: &DMatrix<f64>, treatment: &[f64], outcome: &[f64], policy: &[bool]) -> Result<f64, AppError> {
        if outcome.len() != treatment.len() {
            return Err(AppError::data("ERUPT: outcome and treatment lengths differ."));
        }
        let w = self.weights(x, treatment, policy)?;
        if w.iter().all(|v| *v == 0.0) {
            return Ok(f64::NAN);
        }
        Ok(w.iter().zip(outcome).map(|(w, y)| w * y).sum::<f64>() / outcome.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn treat_everyone_policy_scores_treated_mean() {
        let x = DMatrix::zeros(4, 0);
        let t = [1.0, 1.0, 0.0, 0.0];
        let y = [3.0, 5.0, 1.0, 1.0];
        let erupt = Erupt::fit(&x, &t, EruptPropensity::Prior).unwrap();
        let score = erupt.score(&x, &t, &y, &[true; 4]).unwrap();
        assert!((score - 4.0).abs() < 1e-12);
    }

    #[test]
    fn weights_sum_to_row_count() {
        let x = DMatrix::zeros(5, 0);
        let t = [1.0, 0.0, 0.0, 0.0, 1.0];
        let erupt = Erupt::fit(&x, &t, EruptPropensity::Prior).unwrap();
        let w = erupt.weights(&x, &t, &[true, true, false, false, false]).unwrap();
        assert!((w.iter().sum::<f64>() - 5.0).abs() < 1e-12);
        assert_eq!(w[1], 0.0);
        assert_eq!(w[4], 0.0);
    }

    #[test]
    fn no_agreement_is_undefined() {
        let x = DMatrix::zeros(2, 0);
        let t = [1.0, 0.0];
        let erupt = Erupt::fit(&x, &t, EruptPropensity::Prior).unwrap();
        assert!(erupt.score(&x, &t, &[1.0, 2.0], &[false, true]).unwrap().is_nan());
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let x = DMatrix::zeros(2, 0);
        let erupt = Erupt::fit(&x, &[1.0, 0.0], EruptPropensity::Prior).unwrap();
        assert!(erupt.weights(&x, &[1.0, 0.0], &[true]).is_err());
    }
}
