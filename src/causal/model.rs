//! `CausalModel::estimate_effect`: the single entry point trials use to fit a
//! causal estimator against an identified estimand.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::causal::estimators::{fit_estimator, EstimationData, FittedEstimator};
use crate::causal::identify::IdentifiedEstimand;
use crate::data::Frame;
use crate::domain::Config;
use crate::error::AppError;
use crate::fit::space::clean_config;
use crate::models::ComponentFactory;
use crate::registry::EstimatorId;

/// Population the reported point estimate averages over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetUnits {
    Ate,
}

/// Estimator parameters: fixed `init_params` plus the trial's configuration
/// (`fit_params`), which wins on conflicting keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodParams {
    pub init_params: Config,
    pub fit_params: Config,
}

/// A fitted causal estimate. Owns every trained sub-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalEstimate {
    pub estimator: EstimatorId,
    /// Average effect over the estimation data.
    pub value: f64,
    pub target_units: TargetUnits,
    /// Merged configuration the estimator was fitted with.
    pub params: Config,
    pub effect_modifiers: Vec<String>,
    fitted: FittedEstimator,
    #[serde(skip)]
    in_sample_cate: Option<Vec<f64>>,
}

impl CausalEstimate {
    pub fn fitted(&self) -> &FittedEstimator {
        &self.fitted
    }

    /// Per-unit effects on the estimation data, if the estimator exposes them.
    pub fn in_sample_cate(&self) -> Option<&[f64]> {
        self.in_sample_cate.as_deref()
    }

    /// Per-unit effects for the rows of `frame`.
    pub fn effect(&self, frame: &Frame) -> Result<Vec<f64>, AppError> {
        let x = frame.matrix(&self.effect_modifiers)?;
        self.fitted.effect(&x)
    }
}

impl fmt::Display for CausalEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ATE = {:.4}", self.estimator.short_name(), self.value)
    }
}

/// Training data and estimand shared by every estimation in a run.
pub struct CausalModel<'a> {
    frame: &'a Frame,
    estimand: &'a IdentifiedEstimand,
    factory: &'a ComponentFactory,
}

impl<'a> CausalModel<'a> {
    pub fn new(frame: &'a Frame, estimand: &'a IdentifiedEstimand, factory: &'a ComponentFactory) -> Self {
        Self {
            frame,
            estimand,
            factory,
        }
    }

    pub fn estimand(&self) -> &IdentifiedEstimand {
        self.estimand
    }

    /// Fit `estimator` for the contrast `treatment_value` vs `control_value`.
    ///
    /// Only the binary contrast `1` vs `0` is supported.
    pub fn estimate_effect(
        &self,
        estimator: EstimatorId,
        control_value: f64,
        treatment_value: f64,
        target_units: TargetUnits,
        params: &MethodParams,
    ) -> Result<CausalEstimate, AppError> {
        if control_value != 0.0 || treatment_value != 1.0 {
            return Err(AppError::config(format!(
                "Only the binary contrast treatment=1 vs control=0 is supported, got {treatment_value} vs {control_value}."
            )));
        }
        let data = EstimationData::from_frame(self.frame, self.estimand)?;
        let cleaned = clean_config(&params.init_params, &params.fit_params);
        let mut merged = params.init_params.clone();
        merged.extend(params.fit_params.clone());

        let (fitted, in_sample_cate) = fit_estimator(estimator, &data, &cleaned, self.factory)?;
        let value = match &in_sample_cate {
            Some(cate) => cate.iter().sum::<f64>() / cate.len().max(1) as f64,
            None => {
                let cate = fitted.effect(&data.x)?;
                cate.iter().sum::<f64>() / cate.len().max(1) as f64
            }
        };
        debug!(estimator = %estimator, ate = value, "estimate_effect finished");

        Ok(CausalEstimate {
            estimator,
            value,
            target_units,
            params: merged,
            effect_modifiers: self.estimand.effect_modifiers.clone(),
            fitted,
            in_sample_cate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::*;

    #[test]
    fn estimate_exposes_ate_and_effects() {
        let (frame, estimand) = synthetic(300, 3);
        let factory = fast_factory();
        let model = CausalModel::new(&frame, &estimand, &factory);
        let est = model
            .estimate_effect(EstimatorId::TLearner, 0.0, 1.0, TargetUnits::Ate, &MethodParams::default())
            .unwrap();
        let cate = est.in_sample_cate().unwrap();
        let mean = cate.iter().sum::<f64>() / cate.len() as f64;
        assert!((est.value - mean).abs() < 1e-12);
        assert_eq!(est.effect(&frame).unwrap().len(), 300);
    }

    #[test]
    fn non_binary_contrast_is_rejected() {
        let (frame, estimand) = synthetic(50, 3);
        let factory = fast_factory();
        let model = CausalModel::new(&frame, &estimand, &factory);
        let err = model
            .estimate_effect(EstimatorId::Dummy, 0.0, 2.0, TargetUnits::Ate, &MethodParams::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn ortho_forest_has_no_in_sample_cate() {
        let (frame, estimand) = synthetic(200, 3);
        let factory = fast_factory();
        let mut params = MethodParams::default();
        params.fit_params.insert("n_trees".into(), crate::domain::ParamValue::Int(3));
        let est = CausalModel::new(&frame, &estimand, &factory)
            .estimate_effect(EstimatorId::DmlOrthoForest, 0.0, 1.0, TargetUnits::Ate, &params)
            .unwrap();
        assert!(est.in_sample_cate().is_none());
        assert!(est.value.is_finite());
    }
}
