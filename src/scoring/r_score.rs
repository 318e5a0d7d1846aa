//! R-loss scoring against cross-fitted residuals.
//!
//! With `ỹ = y - E[y | X, W]` and `t̃ = t - P(t = 1 | X, W)` cross-fitted once
//! per split, the R-loss of a CATE vector is `mean((ỹ - τ t̃)²)`. The score is
//! `1 - L(τ) / L(θ̂)`, where `θ̂` is the best constant effect, so a model that
//! explains no heterogeneity scores about zero.

use tracing::debug;

use crate::causal::estimators::crossfit::crossfit_residuals;
use crate::causal::{EstimationData, IdentifiedEstimand};
use crate::data::Frame;
use crate::domain::Split;
use crate::error::AppError;
use crate::models::ComponentFactory;

pub const DEFAULT_CV: usize = 3;

/// Scores a CATE vector for the rows it was fitted on.
pub trait ReferenceScorer: Send + Sync {
    fn score(&self, cate: &[f64]) -> Result<f64, AppError>;
}

#[derive(Debug, Clone)]
pub struct RScorer {
    y_res: Vec<f64>,
    t_res: Vec<f64>,
    base_loss: f64,
}

impl RScorer {
    pub fn fit(frame: &Frame, estimand: &IdentifiedEstimand, factory: &ComponentFactory, cv: usize) -> Result<Self, AppError> {
        let data = EstimationData::from_frame(frame, estimand)?;
        let res = crossfit_residuals(&data, factory, cv.max(2), 1, 0x5c0e)?;
        Ok(Self::from_residuals(res.y_res, res.t_res))
    }

    pub fn from_residuals(y_res: Vec<f64>, t_res: Vec<f64>) -> Self {
        let tt: f64 = t_res.iter().map(|t| t * t).sum();
        let theta = if tt > 0.0 {
            y_res.iter().zip(&t_res).map(|(y, t)| y * t).sum::<f64>() / tt
        } else {
            0.0
        };
        let mut scorer = Self {
            y_res,
            t_res,
            base_loss: 0.0,
        };
        scorer.base_loss = scorer.loss_with(|_| theta);
        debug!(theta, base_loss = scorer.base_loss, "R-scorer baseline");
        scorer
    }

    pub fn n_rows(&self) -> usize {
        self.y_res.len()
    }

    pub fn base_loss(&self) -> f64 {
        self.base_loss
    }

    fn loss_with(&self, tau: impl Fn(usize) -> f64) -> f64 {
        let n = self.y_res.len();
        if n == 0 {
            return f64::NAN;
        }
        (0..n)
            .map(|i| {
                let r = self.y_res[i] - tau(i) * self.t_res[i];
                r * r
            })
            .sum::<f64>()
            / n as f64
    }
}

impl ReferenceScorer for RScorer {
    fn score(&self, cate: &[f64]) -> Result<f64, AppError> {
        if cate.len() != self.y_res.len() {
            return Err(AppError::data(format!(
                "R-score: {} effects for {} rows.",
                cate.len(),
                self.y_res.len()
            )));
        }
        if self.base_loss <= 0.0 || !self.base_loss.is_finite() {
            return Ok(f64::NAN);
        }
        Ok(1.0 - self.loss_with(|i| cate[i]) / self.base_loss)
    }
}

/// One scorer per split, built once per run.
#[derive(Debug, Clone)]
pub struct RScoreWrapper {
    pub train: RScorer,
    pub test: RScorer,
}

impl RScoreWrapper {
    pub fn build(
        train: &Frame,
        test: &Frame,
        estimand: &IdentifiedEstimand,
        factory: &ComponentFactory,
    ) -> Result<Self, AppError> {
        Ok(Self {
            train: RScorer::fit(train, estimand, factory, DEFAULT_CV)?,
            test: RScorer::fit(test, estimand, factory, DEFAULT_CV)?,
        })
    }

    pub fn for_split(&self, split: Split) -> &RScorer {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::{fast_factory, synthetic};
    use crate::data::true_cate;

    #[test]
    fn constant_best_effect_scores_zero() {
        let scorer = RScorer::from_residuals(vec![1.0, -1.0, 2.0, 0.5], vec![0.5, -0.5, 0.5, -0.5]);
        // Σ ỹ t̃ = 1.75, Σ t̃² = 1.
        let theta = 1.75;
        let s = scorer.score(&[theta; 4]).unwrap();
        assert!(s.abs() < 1e-12);
    }

    #[test]
    fn true_effect_scores_above_constant() {
        let (frame, estimand) = synthetic(800, 3);
        let scorer = RScorer::fit(&frame, &estimand, &fast_factory(), 3).unwrap();
        let x1 = frame.column("x1").unwrap();
        let x2 = frame.column("x2").unwrap();
        let truth: Vec<f64> = x1.iter().zip(x2).map(|(a, b)| true_cate(*a, *b, 1.0)).collect();
        let mean = truth.iter().sum::<f64>() / truth.len() as f64;
        assert!(scorer.score(&truth).unwrap() > scorer.score(&vec![mean; truth.len()]).unwrap());
    }

    #[test]
    fn length_mismatch_errors() {
        let scorer = RScorer::from_residuals(vec![1.0, 2.0], vec![0.5, -0.5]);
        assert!(scorer.score(&[1.0]).is_err());
    }
}
