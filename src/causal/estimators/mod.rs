//! Native causal (CATE) estimators.
//!
//! Every estimator is fitted by [`fit_estimator`] from an [`EstimationData`]
//! view, its cleaned configuration and a [`ComponentFactory`], and yields a
//! [`FittedEstimator`] that maps effect-modifier rows `X` to per-unit effects.
//!
//! Estimator families:
//!
//! - meta-learners (S, T, X, domain adaptation): `X` only
//! - DML and DR learners: cross-fitted nuisances on `X ∪ W`, final stage on `X`
//! - orthogonal forests: local kernel-weighted final stage, no in-sample CATE
//! - transformed outcome and difference-in-means baselines

pub mod crossfit;
pub mod dml;
pub mod dr;
pub mod metalearners;
pub mod orthoforest;
pub mod simple;

pub use crossfit::*;
pub use dml::*;
pub use dr::*;
pub use metalearners::*;
pub use orthoforest::*;
pub use simple::*;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::causal::identify::IdentifiedEstimand;
use crate::data::Frame;
use crate::error::AppError;
use crate::fit::space::CleanedConfig;
use crate::models::ComponentFactory;
use crate::registry::EstimatorId;

/// Matrices and vectors an estimator trains on.
#[derive(Debug, Clone)]
pub struct EstimationData {
    /// Effect modifiers.
    pub x: DMatrix<f64>,
    /// Nuisance features `X ∪ W`.
    pub nuisance: DMatrix<f64>,
    pub t: Vec<f64>,
    pub y: Vec<f64>,
}

impl EstimationData {
    pub fn from_frame(frame: &Frame, estimand: &IdentifiedEstimand) -> Result<Self, AppError> {
        let t = frame.column(&estimand.treatment)?.to_vec();
        let y = frame.column(&estimand.outcome)?.to_vec();
        if let Some(bad) = t.iter().find(|v| **v != 0.0 && **v != 1.0) {
            return Err(AppError::config(format!(
                "Treatment column '{}' must be binary 0/1, found value {bad}.",
                estimand.treatment
            )));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(AppError::data(format!("Outcome column '{}' has non-finite values.", estimand.outcome)));
        }
        let x = frame.matrix(&estimand.effect_modifiers)?;
        let nuisance = frame.matrix(&estimand.nuisance_features())?;
        if x.iter().chain(nuisance.iter()).any(|v| !v.is_finite()) {
            return Err(AppError::data("Feature columns have non-finite values."));
        }
        Ok(Self { x, nuisance, t, y })
    }

    pub fn n_rows(&self) -> usize {
        self.t.len()
    }

    /// `(treated_rows, control_rows)`.
    pub fn arms(&self) -> (Vec<usize>, Vec<usize>) {
        (0..self.n_rows()).partition(|&r| self.t[r] == 1.0)
    }

    /// Both arms non-empty, or a data error naming the estimator.
    pub fn require_both_arms(&self, who: &str) -> Result<(Vec<usize>, Vec<usize>), AppError> {
        let (treated, control) = self.arms();
        if treated.is_empty() || control.is_empty() {
            return Err(AppError::data(format!(
                "{who}: needs both treated and control rows ({} treated, {} control).",
                treated.len(),
                control.len()
            )));
        }
        Ok((treated, control))
    }
}

/// `θ(x) = intercept + coef · x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCate {
    pub intercept: f64,
    pub coef: Vec<f64>,
}

impl LinearCate {
    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        (0..x.nrows())
            .map(|r| self.intercept + self.coef.iter().enumerate().map(|(j, b)| b * x[(r, j)]).sum::<f64>())
            .collect()
    }
}

/// A trained estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "estimator", rename_all = "snake_case")]
pub enum FittedEstimator {
    SLearner(SLearner),
    TLearner(TLearner),
    XLearner(XLearner),
    DomainAdaptation(DomainAdaptationLearner),
    Dml(DmlEstimator),
    Dr(DrLearner),
    OrthoForest(OrthoForest),
    TransformedOutcome(TransformedOutcome),
    Dummy(DifferenceInMeans),
}

impl FittedEstimator {
    pub fn effect(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        let cate = match self {
            FittedEstimator::SLearner(m) => m.effect(x),
            FittedEstimator::TLearner(m) => m.effect(x),
            FittedEstimator::XLearner(m) => m.effect(x),
            FittedEstimator::DomainAdaptation(m) => m.effect(x),
            FittedEstimator::Dml(m) => m.effect(x),
            FittedEstimator::Dr(m) => m.effect(x),
            FittedEstimator::OrthoForest(m) => m.effect(x),
            FittedEstimator::TransformedOutcome(m) => m.effect(x),
            FittedEstimator::Dummy(m) => m.effect(x),
        };
        if cate.len() != x.nrows() {
            return Err(AppError::estimation(format!(
                "Estimator returned {} effects for {} rows.",
                cate.len(),
                x.nrows()
            )));
        }
        if cate.iter().any(|v| !v.is_finite()) {
            return Err(AppError::estimation("Estimator produced non-finite effects."));
        }
        Ok(cate)
    }

    /// Whether in-sample effects can be read off the training fit.
    pub fn has_in_sample_effect(&self) -> bool {
        !matches!(self, FittedEstimator::OrthoForest(_))
    }
}

/// Fit estimator `id`. Returns the fitted estimator and, when the estimator
/// exposes one, its in-sample CATE on `data`.
pub fn fit_estimator(
    id: EstimatorId,
    data: &EstimationData,
    config: &CleanedConfig,
    factory: &ComponentFactory,
) -> Result<(FittedEstimator, Option<Vec<f64>>), AppError> {
    let fitted = match id {
        EstimatorId::SLearner => FittedEstimator::SLearner(SLearner::fit(data, config, factory)?),
        EstimatorId::TLearner => FittedEstimator::TLearner(TLearner::fit(data, config, factory)?),
        EstimatorId::XLearner => FittedEstimator::XLearner(XLearner::fit(data, config, factory)?),
        EstimatorId::DomainAdaptationLearner => {
            FittedEstimator::DomainAdaptation(DomainAdaptationLearner::fit(data, config, factory)?)
        }
        EstimatorId::LinearDml => FittedEstimator::Dml(DmlEstimator::fit(DmlFinal::Linear, data, config, factory)?),
        EstimatorId::SparseLinearDml => {
            FittedEstimator::Dml(DmlEstimator::fit(DmlFinal::SparseLinear, data, config, factory)?)
        }
        EstimatorId::CausalForestDml => FittedEstimator::Dml(DmlEstimator::fit(DmlFinal::Forest, data, config, factory)?),
        EstimatorId::LinearDrLearner => FittedEstimator::Dr(DrLearner::fit(DrFinal::Linear, data, config, factory)?),
        EstimatorId::ForestDrLearner => FittedEstimator::Dr(DrLearner::fit(DrFinal::Forest, data, config, factory)?),
        EstimatorId::DmlOrthoForest => {
            FittedEstimator::OrthoForest(OrthoForest::fit(OrthoKind::Dml, data, config, factory)?)
        }
        EstimatorId::DrOrthoForest => FittedEstimator::OrthoForest(OrthoForest::fit(OrthoKind::Dr, data, config, factory)?),
        EstimatorId::TransformedOutcome => {
            FittedEstimator::TransformedOutcome(TransformedOutcome::fit(data, config, factory)?)
        }
        EstimatorId::Dummy => FittedEstimator::Dummy(DifferenceInMeans::fit(data, config)?),
    };

    let in_sample = if fitted.has_in_sample_effect() {
        Some(fitted.effect(&data.x)?)
    } else {
        None
    };
    Ok((fitted, in_sample))
}

/// Reject component overrides for components the estimator does not have.
pub(crate) fn ensure_components(config: &CleanedConfig, who: &str, allowed: &[&str]) -> Result<(), AppError> {
    for name in config.components.keys() {
        if !allowed.contains(&name.as_str()) {
            return Err(AppError::config(format!("{who} has no component '{name}'.")));
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::domain::{Config, ParamValue};
    use crate::fit::space::clean_config;

    #[test]
    fn every_estimator_fits_and_predicts_finite_effects() {
        let (frame, estimand) = synthetic(400, 3);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let factory = fast_factory();
        for id in EstimatorId::ALL {
            let cleaned = clean_config(&Config::new(), &Config::new());
            let (fitted, in_sample) = fit_estimator(id, &data, &cleaned, &factory)
                .unwrap_or_else(|e| panic!("{id} failed: {e}"));
            let effect = fitted.effect(&data.x).unwrap();
            assert_eq!(effect.len(), 400);
            assert_eq!(in_sample.is_some(), fitted.has_in_sample_effect(), "{id}");
        }
    }

    #[test]
    fn unknown_component_override_is_rejected() {
        let (frame, estimand) = synthetic(100, 1);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let mut cfg = Config::new();
        cfg.insert("model_bogus.alpha".into(), ParamValue::Float(0.1));
        let cleaned = clean_config(&Config::new(), &cfg);
        let err = fit_estimator(EstimatorId::LinearDml, &data, &cleaned, &fast_factory()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn non_binary_treatment_is_rejected() {
        let frame = Frame::new(vec![
            ("t".into(), vec![0.0, 0.5]),
            ("y".into(), vec![1.0, 2.0]),
        ])
        .unwrap();
        let estimand = IdentifiedEstimand {
            treatment: "t".into(),
            outcome: "y".into(),
            backdoor_variables: vec![],
            effect_modifiers: vec![],
            expression: String::new(),
        };
        assert!(EstimationData::from_frame(&frame, &estimand).is_err());
    }
}
