//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the orchestrator, trial runner, and scoring engine
//! - exported to JSON/CSV
//! - stored inside model snapshots

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Numeric view (ints widen to floats).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer view. Floats are rounded, matching what a float-valued tuner
    /// suggestion for an integer parameter means.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.is_finite() => Some(v.round() as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v:.6}"),
            ParamValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// A hyperparameter configuration: parameter name → value.
///
/// Keys may be dotted (`model_final.max_depth`) to address a component model.
pub type Config = BTreeMap<String, ParamValue>;

/// Typed accessors over a flat parameter map.
///
/// Every accessor fails with a configuration error when the key is present but
/// has the wrong type; absent keys fall back to the supplied default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    values: Config,
}

impl Params {
    pub fn new(values: Config) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_config(&self) -> &Config {
        &self.values
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.values.insert(key.into(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, AppError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .filter(|x| x.is_finite())
                .ok_or_else(|| AppError::config(format!("Parameter '{key}' must be a finite number, got {v}."))),
        }
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, AppError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_i64()
                .filter(|x| *x >= 0)
                .map(|x| x as usize)
                .ok_or_else(|| AppError::config(format!("Parameter '{key}' must be a non-negative integer, got {v}."))),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, AppError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| AppError::config(format!("Parameter '{key}' must be a boolean, got {v}."))),
        }
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, AppError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_str()
                .ok_or_else(|| AppError::config(format!("Parameter '{key}' must be a string, got {v}."))),
        }
    }

    /// Reject keys outside `allowed`, so a typo never silently falls back to a default.
    pub fn ensure_known(&self, owner: &str, allowed: &[&str]) -> Result<(), AppError> {
        for key in self.values.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(AppError::config(format!(
                    "Unrecognized parameter '{key}' for {owner} (expected one of: {}).",
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Scoring metric used for selection and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Expected response under proposed treatments (policy value).
    Erupt,
    /// Qini score (area between model and random Qini curves).
    Qini,
    /// Area under the normalized cumulative-gain (uplift) curve.
    Auc,
    /// Mean predicted effect.
    Ate,
    /// R-loss based score against cross-fitted residuals.
    #[value(name = "r_score")]
    RScore,
}

impl Metric {
    pub const ALL: [Metric; 5] = [Metric::Erupt, Metric::Qini, Metric::Auc, Metric::Ate, Metric::RScore];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Erupt => "erupt",
            Metric::Qini => "qini",
            Metric::Auc => "auc",
            Metric::Ate => "ate",
            Metric::RScore => "r_score",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data split a score was computed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

/// Column roles for a causal question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalRoles {
    pub treatment: String,
    pub outcome: String,
    /// Confounders (`W`): used by nuisance models only.
    pub common_causes: Vec<String>,
    /// Effect modifiers (`X`): the features the CATE is a function of.
    pub effect_modifiers: Vec<String>,
}

impl CausalRoles {
    pub fn new(
        treatment: impl Into<String>,
        outcome: impl Into<String>,
        common_causes: Vec<String>,
        effect_modifiers: Vec<String>,
    ) -> Self {
        Self {
            treatment: treatment.into(),
            outcome: outcome.into(),
            common_causes,
            effect_modifiers,
        }
    }

    /// `X ∪ W` in a stable order with duplicates removed (nuisance features).
    pub fn nuisance_features(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in self.effect_modifiers.iter().chain(self.common_causes.iter()) {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_value_untagged_serde_keeps_ints_and_floats_apart() {
        let cfg: Config = serde_json::from_str(r#"{"a": 3, "b": 0.5, "c": true, "d": "het"}"#).unwrap();
        assert_eq!(cfg["a"], ParamValue::Int(3));
        assert_eq!(cfg["b"], ParamValue::Float(0.5));
        assert_eq!(cfg["c"], ParamValue::Bool(true));
        assert_eq!(cfg["d"], ParamValue::Str("het".to_string()));
    }

    #[test]
    fn params_reject_wrong_types_and_unknown_keys() {
        let mut params = Params::default();
        params.insert("max_depth", ParamValue::Str("deep".into()));
        assert!(params.usize_or("max_depth", 3).is_err());
        assert_eq!(params.f64_or("alpha", 0.1).unwrap(), 0.1);
        assert!(params.ensure_known("test", &["alpha"]).is_err());
    }

    #[test]
    fn float_suggestions_round_for_integer_params() {
        let mut params = Params::default();
        params.insert("n_estimators", ParamValue::Float(11.6));
        assert_eq!(params.usize_or("n_estimators", 1).unwrap(), 12);
    }

    #[test]
    fn nuisance_features_dedupe_in_order() {
        let roles = CausalRoles::new("t", "y", vec!["w1".into(), "x1".into()], vec!["x1".into(), "x2".into()]);
        assert_eq!(roles.nuisance_features(), vec!["x1", "x2", "w1"]);
    }
}
