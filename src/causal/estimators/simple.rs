//! Baseline estimators: transformed outcome and difference in means.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::causal::estimators::{ensure_components, EstimationData};
use crate::error::AppError;
use crate::fit::space::CleanedConfig;
use crate::models::{ComponentFactory, RegressorModel};

/// Regress `Y* = y (t - e) / (e (1 - e))` on `X`; `E[Y* | X] = τ(X)` when `e` is
/// the true propensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedOutcome {
    model: RegressorModel,
}

impl TransformedOutcome {
    pub fn fit(data: &EstimationData, config: &CleanedConfig, factory: &ComponentFactory) -> Result<Self, AppError> {
        config.estimator.ensure_known("TransformedOutcome", &["min_propensity"])?;
        ensure_components(config, "TransformedOutcome", &[])?;
        data.require_both_arms("TransformedOutcome")?;
        let clip = config.estimator.f64_or("min_propensity", 0.01)?.clamp(1e-6, 0.49);

        let e = factory.propensity_model(&data.nuisance, &data.t, 81)?.predict_proba(&data.nuisance);
        let transformed: Vec<f64> = (0..data.n_rows())
            .map(|i| {
                let e = e[i].clamp(clip, 1.0 - clip);
                data.y[i] * (data.t[i] - e) / (e * (1.0 - e))
            })
            .collect();
        let model = factory.effect_model(&data.x, &transformed, None, 82)?;
        Ok(Self { model })
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        self.model.predict(x)
    }
}

/// Constant effect: mean treated outcome minus mean control outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceInMeans {
    ate: f64,
}

impl DifferenceInMeans {
    pub fn fit(data: &EstimationData, config: &CleanedConfig) -> Result<Self, AppError> {
        config.estimator.ensure_known("Dummy", &[])?;
        ensure_components(config, "Dummy", &[])?;
        let (treated, control) = data.require_both_arms("Dummy")?;
        let mean = |rows: &[usize]| rows.iter().map(|&r| data.y[r]).sum::<f64>() / rows.len() as f64;
        Ok(Self {
            ate: mean(&treated) - mean(&control),
        })
    }

    pub fn ate(&self) -> f64 {
        self.ate
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        vec![self.ate; x.nrows()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::*;
    use crate::domain::Config;
    use crate::fit::space::clean_config;

    #[test]
    fn difference_in_means_is_exact() {
        let (frame, estimand) = synthetic(200, 1);
        let mut data = EstimationData::from_frame(&frame, &estimand).unwrap();
        data.t = (0..200).map(|i| (i % 2) as f64).collect();
        data.y = (0..200).map(|i| if i % 2 == 1 { 3.0 } else { 1.0 }).collect();
        let est = DifferenceInMeans::fit(&data, &clean_config(&Config::new(), &Config::new())).unwrap();
        assert_eq!(est.ate(), 2.0);
        assert_eq!(est.effect(&data.x), vec![2.0; 200]);
    }

    #[test]
    fn transformed_outcome_has_roughly_correct_average() {
        let (frame, estimand) = synthetic(4000, 6);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let est = TransformedOutcome::fit(&data, &clean_config(&Config::new(), &Config::new()), &fast_factory()).unwrap();
        let effect = est.effect(&data.x);
        let mean = effect.iter().sum::<f64>() / effect.len() as f64;
        let truth = frame.column("true_effect").unwrap();
        let true_mean = truth.iter().sum::<f64>() / truth.len() as f64;
        assert!((mean - true_mean).abs() < 0.6, "{mean} vs {true_mean}");
    }
}
