//! Meta-learners: S, T, X and domain adaptation.
//!
//! All meta-learners model the outcome as a function of the effect modifiers
//! `X` only; common causes are ignored.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::causal::estimators::{ensure_components, rows_of, values_of, EstimationData};
use crate::error::AppError;
use crate::fit::space::CleanedConfig;
use crate::models::{ClassifierModel, ComponentFactory, RegressorModel};

fn no_params(config: &CleanedConfig, who: &str) -> Result<(), AppError> {
    config.estimator.ensure_known(who, &[])?;
    ensure_components(config, who, &[])
}

fn with_treatment_column(x: &DMatrix<f64>, t: impl Fn(usize) -> f64) -> DMatrix<f64> {
    let p = x.ncols();
    DMatrix::from_fn(x.nrows(), p + 1, |r, c| if c < p { x[(r, c)] } else { t(r) })
}

/// One outcome model `μ(x, t)`; `τ(x) = μ(x, 1) - μ(x, 0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SLearner {
    model: RegressorModel,
}

impl SLearner {
    pub fn fit(data: &EstimationData, config: &CleanedConfig, factory: &ComponentFactory) -> Result<Self, AppError> {
        no_params(config, "SLearner")?;
        data.require_both_arms("SLearner")?;
        let design = with_treatment_column(&data.x, |r| data.t[r]);
        let model = factory.outcome_model(&design, &data.y, None, 11)?;
        Ok(Self { model })
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let treated = self.model.predict(&with_treatment_column(x, |_| 1.0));
        let control = self.model.predict(&with_treatment_column(x, |_| 0.0));
        treated.iter().zip(&control).map(|(a, b)| a - b).collect()
    }
}

/// Separate outcome models per arm; `τ(x) = μ1(x) - μ0(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TLearner {
    model_control: RegressorModel,
    model_treated: RegressorModel,
}

impl TLearner {
    pub fn fit(data: &EstimationData, config: &CleanedConfig, factory: &ComponentFactory) -> Result<Self, AppError> {
        no_params(config, "TLearner")?;
        let (treated, control) = data.require_both_arms("TLearner")?;
        let model_treated = factory.outcome_model(&rows_of(&data.x, &treated), &values_of(&data.y, &treated), None, 21)?;
        let model_control = factory.outcome_model(&rows_of(&data.x, &control), &values_of(&data.y, &control), None, 22)?;
        Ok(Self {
            model_control,
            model_treated,
        })
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let m1 = self.model_treated.predict(x);
        let m0 = self.model_control.predict(x);
        m1.iter().zip(&m0).map(|(a, b)| a - b).collect()
    }
}

/// Imputed-effect learner: per-arm effect models blended by the propensity,
/// `τ(x) = g(x) τ0(x) + (1 - g(x)) τ1(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XLearner {
    effect_control: RegressorModel,
    effect_treated: RegressorModel,
    propensity: ClassifierModel,
}

impl XLearner {
    pub fn fit(data: &EstimationData, config: &CleanedConfig, factory: &ComponentFactory) -> Result<Self, AppError> {
        no_params(config, "XLearner")?;
        let (treated, control) = data.require_both_arms("XLearner")?;
        let x1 = rows_of(&data.x, &treated);
        let x0 = rows_of(&data.x, &control);
        let y1 = values_of(&data.y, &treated);
        let y0 = values_of(&data.y, &control);

        let m1 = factory.outcome_model(&x1, &y1, None, 31)?;
        let m0 = factory.outcome_model(&x0, &y0, None, 32)?;

        let d1: Vec<f64> = y1.iter().zip(m0.predict(&x1)).map(|(y, m)| y - m).collect();
        let d0: Vec<f64> = m1.predict(&x0).iter().zip(&y0).map(|(m, y)| m - y).collect();
        let effect_treated = factory.effect_model(&x1, &d1, None, 33)?;
        let effect_control = factory.effect_model(&x0, &d0, None, 34)?;
        let propensity = factory.propensity_model(&data.x, &data.t, 35)?;

        Ok(Self {
            effect_control,
            effect_treated,
            propensity,
        })
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let g = self.propensity.predict_proba(x);
        let t0 = self.effect_control.predict(x);
        let t1 = self.effect_treated.predict(x);
        (0..x.nrows()).map(|i| g[i] * t0[i] + (1.0 - g[i]) * t1[i]).collect()
    }
}

/// Outcome models trained with propensity-odds importance weights, imputed
/// effects pooled into one final model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAdaptationLearner {
    final_model: RegressorModel,
}

impl DomainAdaptationLearner {
    pub fn fit(data: &EstimationData, config: &CleanedConfig, factory: &ComponentFactory) -> Result<Self, AppError> {
        no_params(config, "DomainAdaptationLearner")?;
        let (treated, control) = data.require_both_arms("DomainAdaptationLearner")?;
        let propensity = factory.propensity_model(&data.x, &data.t, 41)?;
        let g: Vec<f64> = propensity
            .predict_proba(&data.x)
            .into_iter()
            .map(|p| p.clamp(1e-3, 1.0 - 1e-3))
            .collect();

        let x1 = rows_of(&data.x, &treated);
        let x0 = rows_of(&data.x, &control);
        let w1: Vec<f64> = treated.iter().map(|&r| (1.0 - g[r]) / g[r]).collect();
        let w0: Vec<f64> = control.iter().map(|&r| g[r] / (1.0 - g[r])).collect();
        let m1 = factory.outcome_model(&x1, &values_of(&data.y, &treated), Some(&w1), 42)?;
        let m0 = factory.outcome_model(&x0, &values_of(&data.y, &control), Some(&w0), 43)?;

        let mu0_on_treated = m0.predict(&x1);
        let mu1_on_control = m1.predict(&x0);
        let mut imputed = vec![0.0; data.n_rows()];
        for (i, &r) in treated.iter().enumerate() {
            imputed[r] = data.y[r] - mu0_on_treated[i];
        }
        for (i, &r) in control.iter().enumerate() {
            imputed[r] = mu1_on_control[i] - data.y[r];
        }
        let final_model = factory.effect_model(&data.x, &imputed, None, 44)?;
        Ok(Self { final_model })
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        self.final_model.predict(x)
    }
}
