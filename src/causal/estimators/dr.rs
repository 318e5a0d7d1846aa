//! Doubly robust learners: a final model fitted on cross-fitted DR
//! pseudo-outcomes (see [`crossfit_dr_pseudo_outcomes`]).

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::causal::estimators::{crossfit_dr_pseudo_outcomes, ensure_components, EstimationData, LinearCate};
use crate::error::AppError;
use crate::fit::space::CleanedConfig;
use crate::math::solve_weighted_ridge;
use crate::models::{ComponentFactory, ForestParams, RandomForest, RegressorSpec, TreeParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrFinal {
    Linear,
    Forest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrStage {
    Linear(LinearCate),
    Forest(RandomForest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrLearner {
    stage: DrStage,
}

impl DrLearner {
    pub fn fit(
        kind: DrFinal,
        data: &EstimationData,
        config: &CleanedConfig,
        factory: &ComponentFactory,
    ) -> Result<Self, AppError> {
        let p = &config.estimator;
        let (who, known, components): (&str, &[&str], &[&str]) = match kind {
            DrFinal::Linear => ("LinearDRLearner", &["cv", "min_propensity", "fit_cate_intercept"], &[]),
            DrFinal::Forest => ("ForestDRLearner", &["cv", "min_propensity"], &["model_final"]),
        };
        p.ensure_known(who, known)?;
        ensure_components(config, who, components)?;

        let cv = p.usize_or("cv", 2)?.max(2);
        let min_propensity = p.f64_or("min_propensity", 1e-6)?;
        let psi = crossfit_dr_pseudo_outcomes(data, factory, cv, min_propensity, 61)?;

        let stage = match kind {
            DrFinal::Linear => {
                let intercept = p.bool_or("fit_cate_intercept", true)?;
                DrStage::Linear(ols_final(&data.x, &psi, intercept)?)
            }
            DrFinal::Forest => {
                let fin = config.component("model_final");
                fin.ensure_known(
                    "ForestDRLearner.model_final",
                    &["n_estimators", "max_depth", "min_samples_leaf", "max_samples"],
                )?;
                let defaults = ForestParams {
                    n_estimators: 100,
                    tree: TreeParams::shallow(8, 10),
                    max_samples: 0.45,
                    bootstrap: false,
                    honest: true,
                };
                let params = RegressorSpec::forest_from_params(&fin, &defaults)?;
                DrStage::Forest(RandomForest::fit(&data.x, &psi, None, &params, factory.seed())?)
            }
        };
        Ok(Self { stage })
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        match &self.stage {
            DrStage::Linear(m) => m.effect(x),
            DrStage::Forest(f) => f.predict(x),
        }
    }
}

fn ols_final(x: &DMatrix<f64>, psi: &[f64], fit_intercept: bool) -> Result<LinearCate, AppError> {
    let offset = usize::from(fit_intercept);
    let cols = x.ncols() + offset;
    if cols == 0 {
        return Err(AppError::config(
            "Linear DR learner without an intercept needs at least one effect modifier.",
        ));
    }
    let design = DMatrix::from_fn(x.nrows(), cols, |r, c| {
        if fit_intercept && c == 0 { 1.0 } else { x[(r, c - offset)] }
    });
    let beta = solve_weighted_ridge(&design, psi, None, 0.0, &vec![false; cols])
        .ok_or_else(|| AppError::estimation("DR final stage: least squares is ill-conditioned."))?;
    Ok(LinearCate {
        intercept: if fit_intercept { beta[0] } else { 0.0 },
        coef: beta.iter().skip(offset).copied().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::*;
    use crate::domain::{Config, ParamValue};
    use crate::fit::space::clean_config;

    #[test]
    fn linear_dr_tracks_the_true_effect() {
        let (frame, estimand) = synthetic(3000, 8);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let cleaned = clean_config(&Config::new(), &Config::new());
        let est = DrLearner::fit(DrFinal::Linear, &data, &cleaned, &fast_factory()).unwrap();
        let truth = frame.column("true_effect").unwrap();
        assert!(mean_abs_error(&est.effect(&data.x), truth) < 0.4);
    }

    #[test]
    fn forest_dr_reads_model_final_overrides() {
        let (frame, estimand) = synthetic(300, 8);
        let data = EstimationData::from_frame(&frame, &estimand).unwrap();
        let mut cfg = Config::new();
        cfg.insert("model_final.n_estimators".into(), ParamValue::Int(5));
        cfg.insert("model_final.max_depth".into(), ParamValue::Int(2));
        let cleaned = clean_config(&Config::new(), &cfg);
        let est = DrLearner::fit(DrFinal::Forest, &data, &cleaned, &fast_factory()).unwrap();
        let DrStage::Forest(forest) = &est.stage else {
            panic!("expected a forest stage");
        };
        assert_eq!(forest.trees().len(), 5);
        assert!(forest.trees().iter().all(|t| t.depth() <= 2));
    }
}
