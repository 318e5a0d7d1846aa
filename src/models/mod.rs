//! Component (nuisance) models.
//!
//! Causal estimators never train models directly: they ask a
//! [`ComponentFactory`] for a fitted [`RegressorModel`] or [`ClassifierModel`].
//! The factory either fits a fixed [`RegressorSpec`] / [`ClassifierSpec`] or
//! runs a [`ComponentAutoMl`] search to pick one.
//!
//! Specs are serializable descriptions; models are fitted values. Both are
//! closed enums so fitted estimators can be snapshotted as JSON.

pub mod automl;
pub mod baseline;
pub mod forest;
pub mod linear;
pub mod logistic;
pub mod tree;

pub use automl::*;
pub use baseline::*;
pub use forest::*;
pub use linear::*;
pub use logistic::*;
pub use tree::*;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::domain::Params;
use crate::error::AppError;

/// An unfitted regressor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorSpec {
    Mean,
    Ridge { alpha: f64 },
    Lasso { alpha: f64, max_iter: usize },
    Tree(TreeParams),
    Forest(ForestParams),
}

impl RegressorSpec {
    pub fn name(&self) -> &'static str {
        match self {
            RegressorSpec::Mean => "mean",
            RegressorSpec::Ridge { .. } => "ridge",
            RegressorSpec::Lasso { .. } => "lasso",
            RegressorSpec::Tree(_) => "tree",
            RegressorSpec::Forest(_) => "forest",
        }
    }

    pub fn fit(
        &self,
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        seed: u64,
    ) -> Result<RegressorModel, AppError> {
        match self {
            RegressorSpec::Mean => Ok(RegressorModel::Mean(MeanRegressor::fit(y, weights)?)),
            RegressorSpec::Ridge { alpha } => Ok(RegressorModel::Linear(LinearModel::fit_ridge(x, y, weights, *alpha)?)),
            RegressorSpec::Lasso { alpha, max_iter } => Ok(RegressorModel::Linear(LinearModel::fit_lasso(
                x, y, weights, *alpha, *max_iter,
            )?)),
            RegressorSpec::Tree(params) => {
                let mut rng = StdRng::seed_from_u64(seed);
                Ok(RegressorModel::Tree(RegressionTree::fit(x, y, weights, params, &mut rng)?))
            }
            RegressorSpec::Forest(params) => Ok(RegressorModel::Forest(RandomForest::fit(x, y, weights, params, seed)?)),
        }
    }

    /// Forest spec from flat parameters (`n_estimators`, `max_depth`,
    /// `min_samples_leaf`, `max_samples`, `honest`, `max_features`).
    pub fn forest_from_params(params: &Params, defaults: &ForestParams) -> Result<ForestParams, AppError> {
        let max_features = match params.usize_or("max_features", 0)? {
            0 => defaults.tree.max_features,
            k => Some(k),
        };
        let min_samples_leaf = params.usize_or("min_samples_leaf", defaults.tree.min_samples_leaf)?.max(1);
        Ok(ForestParams {
            n_estimators: params.usize_or("n_estimators", defaults.n_estimators)?.max(1),
            tree: TreeParams {
                max_depth: params.usize_or("max_depth", defaults.tree.max_depth)?,
                min_samples_leaf,
                min_samples_split: 2 * min_samples_leaf,
                max_features,
            },
            max_samples: params.f64_or("max_samples", defaults.max_samples)?.clamp(0.01, 1.0),
            bootstrap: params.bool_or("bootstrap", defaults.bootstrap)?,
            honest: params.bool_or("honest", defaults.honest)?,
        })
    }
}

/// A fitted regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegressorModel {
    Mean(MeanRegressor),
    Linear(LinearModel),
    Tree(RegressionTree),
    Forest(RandomForest),
    /// Predictions clipped to `[0, 1]` (binary outcomes).
    Clipped(Box<RegressorModel>),
}

impl RegressorModel {
    pub fn predict(&self, x: &DMatrix<f64>) -> Vec<f64> {
        match self {
            RegressorModel::Mean(m) => m.predict(x.nrows()),
            RegressorModel::Linear(m) => m.predict(x),
            RegressorModel::Tree(m) => m.predict(x),
            RegressorModel::Forest(m) => m.predict(x),
            RegressorModel::Clipped(inner) => inner.predict(x).into_iter().map(|v| v.clamp(0.0, 1.0)).collect(),
        }
    }
}

/// An unfitted binary classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    Prior,
    Logistic { c: f64 },
    Tree(TreeParams),
    Forest(ForestParams),
}

impl ClassifierSpec {
    pub fn name(&self) -> &'static str {
        match self {
            ClassifierSpec::Prior => "prior",
            ClassifierSpec::Logistic { .. } => "logistic",
            ClassifierSpec::Tree(_) => "tree",
            ClassifierSpec::Forest(_) => "forest",
        }
    }

    /// Fit on 0/1 labels. Single-class labels always yield a prior model.
    pub fn fit(&self, x: &DMatrix<f64>, labels: &[f64], seed: u64) -> Result<ClassifierModel, AppError> {
        let ones = labels.iter().filter(|v| **v == 1.0).count();
        if matches!(self, ClassifierSpec::Prior) || ones == 0 || ones == labels.len() {
            return Ok(ClassifierModel::Prior(PriorClassifier::fit(labels)?));
        }
        match self {
            ClassifierSpec::Prior => Ok(ClassifierModel::Prior(PriorClassifier::fit(labels)?)),
            ClassifierSpec::Logistic { c } => Ok(ClassifierModel::Logistic(LogisticRegression::fit(x, labels, *c, 100)?)),
            ClassifierSpec::Tree(params) => {
                let mut rng = StdRng::seed_from_u64(seed);
                Ok(ClassifierModel::Tree(RegressionTree::fit(x, labels, None, params, &mut rng)?))
            }
            ClassifierSpec::Forest(params) => Ok(ClassifierModel::Forest(RandomForest::fit(x, labels, None, params, seed)?)),
        }
    }
}

/// A fitted binary classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassifierModel {
    Prior(PriorClassifier),
    Logistic(LogisticRegression),
    Tree(RegressionTree),
    Forest(RandomForest),
}

impl ClassifierModel {
    /// `P(label = 1 | x)` per row.
    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let raw = match self {
            ClassifierModel::Prior(m) => m.predict_proba(x.nrows()),
            ClassifierModel::Logistic(m) => m.predict_proba(x),
            ClassifierModel::Tree(m) => m.predict(x),
            ClassifierModel::Forest(m) => m.predict(x),
        };
        raw.into_iter().map(|p| p.clamp(0.0, 1.0)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamValue;

    #[test]
    fn specs_round_trip_through_json_tags() {
        let spec = RegressorSpec::Ridge { alpha: 0.5 };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"kind\":\"ridge\""));
        let back: RegressorSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn single_class_labels_fall_back_to_prior() {
        let x = DMatrix::from_element(5, 1, 0.0);
        let model = ClassifierSpec::Logistic { c: 1.0 }.fit(&x, &[1.0; 5], 0).unwrap();
        assert!(matches!(model, ClassifierModel::Prior(_)));
        assert_eq!(model.predict_proba(&x), vec![1.0; 5]);
    }

    #[test]
    fn clipped_regressor_stays_in_unit_interval() {
        let x = DMatrix::from_fn(4, 1, |r, _| r as f64);
        let inner = RegressorSpec::Ridge { alpha: 0.0 }.fit(&x, &[-1.0, 0.0, 1.0, 2.0], None, 0).unwrap();
        let clipped = RegressorModel::Clipped(Box::new(inner));
        let pred = clipped.predict(&x);
        assert_eq!(pred[0], 0.0);
        assert_eq!(pred[3], 1.0);
    }

    #[test]
    fn forest_params_read_overrides() {
        let mut params = Params::default();
        params.insert("max_depth", ParamValue::Int(3));
        params.insert("honest", ParamValue::Bool(true));
        let fp = RegressorSpec::forest_from_params(&params, &ForestParams::default()).unwrap();
        assert_eq!(fp.tree.max_depth, 3);
        assert!(fp.honest);
        assert_eq!(fp.n_estimators, ForestParams::default().n_estimators);
    }
}
