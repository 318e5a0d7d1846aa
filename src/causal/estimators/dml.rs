//! Double machine learning: regress outcome residuals on treatment residuals.
//!
//! With cross-fitted residuals `ỹ = y - E[y|X,W]` and `t̃ = t - P(t|X,W)`:
//!
//! - `Linear`: `ỹ ≈ t̃ (θ0 + θ·x)` by least squares
//! - `SparseLinear`: same design, lasso penalty on `θ` (not on `θ0`)
//! - `Forest`: random forest on `ỹ / t̃` with weights `t̃²`

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::causal::estimators::{crossfit_residuals, ensure_components, EstimationData, LinearCate, Residuals};
use crate::domain::Params;
use crate::error::AppError;
use crate::fit::space::CleanedConfig;
use crate::math::solve_weighted_ridge;
use crate::models::{lasso_coordinate_descent, ComponentFactory, ForestParams, RandomForest, RegressorSpec, TreeParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlFinal {
    Linear,
    SparseLinear,
    Forest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DmlStage {
    Linear(LinearCate),
    Forest(RandomForest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmlEstimator {
    stage: DmlStage,
}

/// Smallest `|t̃|` used when dividing by treatment residuals.
const MIN_T_RES: f64 = 1e-6;

impl DmlEstimator {
    pub fn fit(
        kind: DmlFinal,
        data: &EstimationData,
        config: &CleanedConfig,
        factory: &ComponentFactory,
    ) -> Result<Self, AppError> {
        let p = &config.estimator;
        let stage = match kind {
            DmlFinal::Linear => {
                p.ensure_known("LinearDML", &["cv", "mc_iters", "fit_cate_intercept"])?;
                ensure_components(config, "LinearDML", &[])?;
                let res = residuals(data, config, factory)?;
                let intercept = p.bool_or("fit_cate_intercept", true)?;
                DmlStage::Linear(linear_final(&data.x, &res.y_res, &res.t_res, intercept, None)?)
            }
            DmlFinal::SparseLinear => {
                p.ensure_known("SparseLinearDML", &["cv", "mc_iters", "fit_cate_intercept"])?;
                ensure_components(config, "SparseLinearDML", &["model_final"])?;
                let fin = config.component("model_final");
                fin.ensure_known("SparseLinearDML.model_final", &["alpha", "max_iter"])?;
                let alpha = fin.f64_or("alpha", 1e-2)?;
                let max_iter = fin.usize_or("max_iter", 500)?;
                let res = residuals(data, config, factory)?;
                let intercept = p.bool_or("fit_cate_intercept", true)?;
                DmlStage::Linear(linear_final(
                    &data.x,
                    &res.y_res,
                    &res.t_res,
                    intercept,
                    Some((alpha, max_iter)),
                )?)
            }
            DmlFinal::Forest => {
                p.ensure_known(
                    "CausalForestDML",
                    &["cv", "mc_iters", "n_estimators", "max_depth", "min_samples_leaf", "max_samples", "honest"],
                )?;
                ensure_components(config, "CausalForestDML", &[])?;
                let defaults = ForestParams {
                    n_estimators: 100,
                    tree: TreeParams::shallow(8, 10),
                    max_samples: 0.45,
                    bootstrap: false,
                    honest: true,
                };
                let mut forest_params = config.estimator.clone();
                for key in ["cv", "mc_iters"] {
                    forest_params = strip(forest_params, key);
                }
                let params = RegressorSpec::forest_from_params(&forest_params, &defaults)?;
                let res = residuals(data, config, factory)?;
                let (target, weights): (Vec<f64>, Vec<f64>) = res
                    .y_res
                    .iter()
                    .zip(&res.t_res)
                    .map(|(y, t)| {
                        let t = if t.abs() < MIN_T_RES { MIN_T_RES.copysign(*t) } else { *t };
                        (y / t, t * t)
                    })
                    .unzip();
                DmlStage::Forest(RandomForest::fit(&data.x, &target, Some(&weights), &params, factory.seed())?)
            }
        };
        Ok(Self { stage })
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        match &self.stage {
            DmlStage::Linear(m) => m.effect(x),
            DmlStage::Forest(f) => f.predict(x),
        }
    }
}

fn strip(params: Params, key: &str) -> Params {
    let mut values = params.as_config().clone();
    values.remove(key);
    Params::new(values)
}

fn residuals(
    data: &EstimationData,
    config: &CleanedConfig,
    factory: &ComponentFactory,
) -> Result<Residuals, AppError> {
    data.require_both_arms("DML")?;
    let cv = config.estimator.usize_or("cv", 2)?.max(2);
    let mc_iters = config.estimator.usize_or("mc_iters", 1)?.max(1);
    crossfit_residuals(data, factory, cv, mc_iters, 51)
}

/// Solve the residual-on-residual stage for `θ(x) = θ0 + θ·x`.
fn linear_final(
    x: &DMatrix<f64>,
    y_res: &[f64],
    t_res: &[f64],
    fit_intercept: bool,
    lasso: Option<(f64, usize)>,
) -> Result<LinearCate, AppError> {
    let n = x.nrows();
    let p = x.ncols();
    let offset = usize::from(fit_intercept);
    let cols = p + offset;
    if cols == 0 {
        return Err(AppError::config(
            "Linear DML without an intercept needs at least one effect modifier.",
        ));
    }
    let design = DMatrix::from_fn(n, cols, |r, c| {
        if fit_intercept && c == 0 {
            t_res[r]
        } else {
            t_res[r] * x[(r, c - offset)]
        }
    });

    let beta: Vec<f64> = match lasso {
        None => solve_weighted_ridge(&design, y_res, None, 1e-8, &vec![true; cols])
            .ok_or_else(|| AppError::estimation("DML final stage: least squares is ill-conditioned."))?
            .iter()
            .copied()
            .collect(),
        Some((alpha, max_iter)) => {
            let penalize: Vec<bool> = (0..cols).map(|c| !(fit_intercept && c == 0)).collect();
            lasso_coordinate_descent(&design, y_res, None, alpha, &penalize, max_iter, 1e-6)
        }
    };
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(AppError::estimation("DML final stage produced non-finite coefficients."));
    }

    Ok(LinearCate {
        intercept: if fit_intercept { beta[0] } else { 0.0 },
        coef: beta[offset..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::*;
    use crate::domain::{Config, ParamValue};
    use crate::fit::space::clean_config;

    #[test]
    fn linear_dml_recovers_effect_coefficients() {
        let (frame, estimand) = synthetic(3000, 11);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let cleaned = clean_config(&Config::new(), &Config::new());
        let est = DmlEstimator::fit(DmlFinal::Linear, &data, &cleaned, &fast_factory()).unwrap();
        let DmlStage::Linear(cate) = &est.stage else {
            panic!("expected a linear stage");
        };
        assert!((cate.intercept - 1.0).abs() < 0.3, "intercept {}", cate.intercept);
        assert!((cate.coef[0] - 2.0).abs() < 0.3, "x1 coef {}", cate.coef[0]);
    }

    #[test]
    fn sparse_dml_with_huge_alpha_is_constant() {
        let (frame, estimand) = synthetic(500, 2);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let mut cfg = Config::new();
        cfg.insert("model_final.alpha".into(), ParamValue::Float(1e6));
        let cleaned = clean_config(&Config::new(), &cfg);
        let est = DmlEstimator::fit(DmlFinal::SparseLinear, &data, &cleaned, &fast_factory()).unwrap();
        let effect = est.effect(&data.x);
        assert!(effect.iter().all(|v| (v - effect[0]).abs() < 1e-12));
    }

    #[test]
    fn causal_forest_accepts_forest_params() {
        let (frame, estimand) = synthetic(400, 4);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let mut cfg = Config::new();
        cfg.insert("n_estimators".into(), ParamValue::Int(10));
        cfg.insert("honest".into(), ParamValue::Bool(false));
        let cleaned = clean_config(&Config::new(), &cfg);
        let est = DmlEstimator::fit(DmlFinal::Forest, &data, &cleaned, &fast_factory()).unwrap();
        assert_eq!(est.effect(&data.x).len(), 400);
    }

    #[test]
    fn unknown_estimator_param_is_a_config_error() {
        let (frame, estimand) = synthetic(100, 4);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let mut cfg = Config::new();
        cfg.insert("n_trees".into(), ParamValue::Int(10));
        let cleaned = clean_config(&Config::new(), &cfg);
        let err = DmlEstimator::fit(DmlFinal::Linear, &data, &cleaned, &fast_factory()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
