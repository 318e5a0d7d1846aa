//! Estimator registry: the closed set of causal estimators, their fixed init
//! parameters and their hyperparameter search spaces.
//!
//! Identifiers are dotted paths (`backdoor.econml.dml.LinearDML`) so users can
//! select groups by substring (`"dml"`, `"metalearners"`, `"econml"`).

pub mod resolve;

pub use resolve::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Config, ParamValue};
use crate::error::AppError;
use crate::fit::space::{Domain, SearchSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum EstimatorId {
    SLearner,
    TLearner,
    XLearner,
    DomainAdaptationLearner,
    LinearDml,
    SparseLinearDml,
    CausalForestDml,
    LinearDrLearner,
    ForestDrLearner,
    DmlOrthoForest,
    DrOrthoForest,
    TransformedOutcome,
    Dummy,
}

impl EstimatorId {
    pub const ALL: [EstimatorId; 13] = [
        EstimatorId::SLearner,
        EstimatorId::TLearner,
        EstimatorId::XLearner,
        EstimatorId::DomainAdaptationLearner,
        EstimatorId::LinearDml,
        EstimatorId::SparseLinearDml,
        EstimatorId::CausalForestDml,
        EstimatorId::LinearDrLearner,
        EstimatorId::ForestDrLearner,
        EstimatorId::DmlOrthoForest,
        EstimatorId::DrOrthoForest,
        EstimatorId::TransformedOutcome,
        EstimatorId::Dummy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EstimatorId::SLearner => "backdoor.econml.metalearners.SLearner",
            EstimatorId::TLearner => "backdoor.econml.metalearners.TLearner",
            EstimatorId::XLearner => "backdoor.econml.metalearners.XLearner",
            EstimatorId::DomainAdaptationLearner => "backdoor.econml.metalearners.DomainAdaptationLearner",
            EstimatorId::LinearDml => "backdoor.econml.dml.LinearDML",
            EstimatorId::SparseLinearDml => "backdoor.econml.dml.SparseLinearDML",
            EstimatorId::CausalForestDml => "backdoor.econml.dml.CausalForestDML",
            EstimatorId::LinearDrLearner => "backdoor.econml.dr.LinearDRLearner",
            EstimatorId::ForestDrLearner => "backdoor.econml.dr.ForestDRLearner",
            EstimatorId::DmlOrthoForest => "backdoor.econml.orf.DMLOrthoForest",
            EstimatorId::DrOrthoForest => "backdoor.econml.orf.DROrthoForest",
            EstimatorId::TransformedOutcome => "backdoor.auto_causality.transformed_outcome.TransformedOutcome",
            EstimatorId::Dummy => "backdoor.auto_causality.dummy.Dummy",
        }
    }

    /// Last path segment, e.g. `LinearDML`.
    pub fn short_name(self) -> &'static str {
        self.as_str().rsplit('.').next().unwrap_or(self.as_str())
    }

    pub fn is_experimental(self) -> bool {
        !matches!(
            self,
            EstimatorId::SLearner
                | EstimatorId::TLearner
                | EstimatorId::XLearner
                | EstimatorId::DomainAdaptationLearner
                | EstimatorId::LinearDml
                | EstimatorId::TransformedOutcome
        )
    }

    /// Orthogonal forests fit a local model per prediction point and do not
    /// scale to large datasets.
    pub fn is_large_data_safe(self) -> bool {
        !matches!(self, EstimatorId::DmlOrthoForest | EstimatorId::DrOrthoForest)
    }
}

impl fmt::Display for EstimatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstimatorId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EstimatorId::ALL
            .into_iter()
            .find(|id| id.as_str() == s || id.short_name() == s)
            .ok_or_else(|| AppError::config(format!("Unknown estimator '{s}'.")))
    }
}

impl TryFrom<String> for EstimatorId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EstimatorId> for &'static str {
    fn from(id: EstimatorId) -> Self {
        id.as_str()
    }
}

/// Registry entry: fixed init params plus the tunable search space.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorDescriptor {
    pub id: EstimatorId,
    pub init_params: Config,
    pub search_space: SearchSpace,
}

fn params<const N: usize>(pairs: [(&str, ParamValue); N]) -> Config {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

impl EstimatorDescriptor {
    pub fn for_id(id: EstimatorId) -> Self {
        let (init_params, search_space) = match id {
            EstimatorId::SLearner
            | EstimatorId::TLearner
            | EstimatorId::XLearner
            | EstimatorId::DomainAdaptationLearner
            | EstimatorId::TransformedOutcome
            | EstimatorId::Dummy => (Config::new(), SearchSpace::new()),
            EstimatorId::LinearDml => (
                params([("mc_iters", ParamValue::Int(1))]),
                SearchSpace::new()
                    .with("fit_cate_intercept", Domain::choice([true, false]))
                    .with("cv", Domain::rand_int(2, 5)),
            ),
            EstimatorId::SparseLinearDml => (
                params([("cv", ParamValue::Int(2))]),
                SearchSpace::new()
                    .with("fit_cate_intercept", Domain::choice([true, false]))
                    .with("model_final.alpha", Domain::log_uniform(1e-4, 1.0))
                    .with("model_final.max_iter", Domain::rand_int(100, 1000)),
            ),
            EstimatorId::CausalForestDml => (
                params([("cv", ParamValue::Int(2))]),
                SearchSpace::new()
                    .with("n_estimators", Domain::rand_int(20, 100))
                    .with("max_depth", Domain::rand_int(2, 10))
                    .with("min_samples_leaf", Domain::rand_int(5, 30))
                    .with("max_samples", Domain::uniform(0.3, 0.5))
                    .with("honest", Domain::choice([true, false])),
            ),
            EstimatorId::LinearDrLearner => (
                params([("cv", ParamValue::Int(2))]),
                SearchSpace::new()
                    .with("fit_cate_intercept", Domain::choice([true, false]))
                    .with("min_propensity", Domain::log_uniform(1e-6, 1e-1)),
            ),
            EstimatorId::ForestDrLearner => (
                params([("cv", ParamValue::Int(2))]),
                SearchSpace::new()
                    .with("model_final.n_estimators", Domain::rand_int(20, 100))
                    .with("model_final.max_depth", Domain::rand_int(2, 10))
                    .with("model_final.min_samples_leaf", Domain::rand_int(5, 30))
                    .with("min_propensity", Domain::log_uniform(1e-6, 1e-1)),
            ),
            EstimatorId::DmlOrthoForest | EstimatorId::DrOrthoForest => (
                Config::new(),
                SearchSpace::new()
                    .with("n_trees", Domain::rand_int(10, 50))
                    .with("max_depth", Domain::rand_int(2, 10))
                    .with("min_leaf_size", Domain::rand_int(5, 30))
                    .with("subsample_ratio", Domain::uniform(0.3, 0.8))
                    .with("lambda_reg", Domain::log_uniform(1e-3, 1.0)),
            ),
        };
        Self {
            id,
            init_params,
            search_space,
        }
    }
}

/// The set of estimators available to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    entries: Vec<EstimatorDescriptor>,
}

impl Registry {
    /// All non-experimental estimators, plus the experimental ones when asked.
    pub fn new(include_experimental: bool) -> Self {
        let entries = EstimatorId::ALL
            .into_iter()
            .filter(|id| include_experimental || !id.is_experimental())
            .map(EstimatorDescriptor::for_id)
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EstimatorId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn get(&self, id: EstimatorId) -> Option<&EstimatorDescriptor> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Replace the entry for `descriptor.id`, or append it.
    pub fn with_descriptor(mut self, descriptor: EstimatorDescriptor) -> Self {
        match self.entries.iter_mut().find(|e| e.id == descriptor.id) {
            Some(entry) => *entry = descriptor,
            None => self.entries.push(descriptor),
        }
        self
    }

    pub fn descriptor(&self, id: EstimatorId) -> Result<&EstimatorDescriptor, AppError> {
        self.get(id)
            .ok_or_else(|| AppError::config(format!("Estimator '{id}' is not in the registry.")))
    }
}

/// Which estimators a run should consider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum EstimatorRequest {
    /// The default, non-experimental set.
    Auto,
    /// Every registry entry that suits the data size.
    All,
    /// Substring patterns matched against full identifiers.
    Patterns(Vec<String>),
}

impl EstimatorRequest {
    /// Parse `"auto"`, `"all"` or an array of strings.
    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        match value {
            Value::String(s) if s == "auto" => Ok(EstimatorRequest::Auto),
            Value::String(s) if s == "all" => Ok(EstimatorRequest::All),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(AppError::config(format!(
                        "Invalid estimator list: entries must be strings, got {other}."
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(EstimatorRequest::Patterns),
            other => Err(AppError::config(format!(
                "Invalid estimator list: expected \"auto\", \"all\" or a list of strings, got {other}."
            ))),
        }
    }

    /// Build from CLI-style arguments: a single `auto` / `all`, or patterns.
    pub fn from_args(args: &[String]) -> Self {
        match args {
            [] => EstimatorRequest::Auto,
            [one] if one == "auto" => EstimatorRequest::Auto,
            [one] if one == "all" => EstimatorRequest::All,
            many => EstimatorRequest::Patterns(many.to_vec()),
        }
    }
}

impl TryFrom<Value> for EstimatorRequest {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        EstimatorRequest::from_value(&value)
    }
}

impl From<EstimatorRequest> for Value {
    fn from(request: EstimatorRequest) -> Self {
        match request {
            EstimatorRequest::Auto => Value::String("auto".into()),
            EstimatorRequest::All => Value::String("all".into()),
            EstimatorRequest::Patterns(p) => Value::Array(p.into_iter().map(Value::String).collect()),
        }
    }
}
