//! Hyperparameter search spaces and config clean-up.
//!
//! A [`SearchSpace`] is an ordered map `name → Domain`. Every domain maps the
//! unit interval onto its values, so the tuners can work in `[0, 1]^d` and
//! denormalize at the end:
//!
//! - `Uniform` / `LogUniform`: linear or log-linear interpolation
//! - `RandInt`: inclusive integer range, `floor(u · (high - low + 1))`
//! - `Choice`: equal-width buckets, one per option

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Config, ParamValue, Params};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Domain {
    Uniform { low: f64, high: f64 },
    LogUniform { low: f64, high: f64 },
    /// Inclusive on both ends.
    RandInt { low: i64, high: i64 },
    Choice { options: Vec<ParamValue> },
}

impl Domain {
    pub fn uniform(low: f64, high: f64) -> Self {
        Domain::Uniform { low, high }
    }

    pub fn log_uniform(low: f64, high: f64) -> Self {
        Domain::LogUniform { low, high }
    }

    pub fn rand_int(low: i64, high: i64) -> Self {
        Domain::RandInt { low, high }
    }

    pub fn choice<I, V>(options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        Domain::Choice {
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Map `u ∈ [0, 1]` onto a value of this domain.
    pub fn denormalize(&self, u: f64) -> ParamValue {
        let u = if u.is_finite() { u.clamp(0.0, 1.0) } else { 0.5 };
        match self {
            Domain::Uniform { low, high } => ParamValue::Float(low + u * (high - low)),
            Domain::LogUniform { low, high } => {
                let (a, b) = (low.ln(), high.ln());
                ParamValue::Float((a + u * (b - a)).exp().clamp(*low, *high))
            }
            Domain::RandInt { low, high } => {
                let span = (high - low + 1) as f64;
                ParamValue::Int((low + (u * span).floor() as i64).clamp(*low, *high))
            }
            Domain::Choice { options } => {
                let last = options.len().saturating_sub(1);
                let idx = ((u * options.len() as f64).floor() as usize).min(last);
                options[idx].clone()
            }
        }
    }

    /// Inverse of [`Domain::denormalize`]; `None` if the value is outside the domain.
    pub fn normalize(&self, value: &ParamValue) -> Option<f64> {
        match self {
            Domain::Uniform { low, high } => {
                let v = value.as_f64()?;
                if high > low {
                    Some(((v - low) / (high - low)).clamp(0.0, 1.0))
                } else {
                    Some(0.5)
                }
            }
            Domain::LogUniform { low, high } => {
                let v = value.as_f64().filter(|v| *v > 0.0)?;
                let (a, b) = (low.ln(), high.ln());
                if b > a { Some(((v.ln() - a) / (b - a)).clamp(0.0, 1.0)) } else { Some(0.5) }
            }
            Domain::RandInt { low, high } => {
                let v = value.as_i64()?;
                let span = (high - low + 1) as f64;
                Some((((v - low) as f64 + 0.5) / span).clamp(0.0, 1.0))
            }
            Domain::Choice { options } => {
                let idx = options.iter().position(|o| o == value)?;
                Some((idx as f64 + 0.5) / options.len() as f64)
            }
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        self.denormalize(rng.gen_range(0.0..1.0))
    }

    fn validate(&self, name: &str) -> Result<(), AppError> {
        let ok = match self {
            Domain::Uniform { low, high } => low.is_finite() && high.is_finite() && low <= high,
            Domain::LogUniform { low, high } => {
                low.is_finite() && high.is_finite() && *low > 0.0 && low <= high
            }
            Domain::RandInt { low, high } => low <= high,
            Domain::Choice { options } => !options.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(AppError::config(format!("Invalid search domain for '{name}': {self:?}.")))
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Uniform { low, high } => write!(f, "uniform({low}, {high})"),
            Domain::LogUniform { low, high } => write!(f, "loguniform({low}, {high})"),
            Domain::RandInt { low, high } => write!(f, "randint({low}..={high})"),
            Domain::Choice { options } => {
                let items: Vec<String> = options.iter().map(ToString::to_string).collect();
                write!(f, "choice[{}]", items.join(", "))
            }
        }
    }
}

/// Ordered collection of named domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    params: BTreeMap<String, Domain>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, domain: Domain) -> Self {
        self.params.insert(name.into(), domain);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Domain)> {
        self.params.iter()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.params.iter().try_for_each(|(name, d)| d.validate(name))
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Config {
        self.params.iter().map(|(k, d)| (k.clone(), d.sample(rng))).collect()
    }

    /// Build a config from a point of `[0, 1]^d` (dimensions in key order).
    pub fn denormalize(&self, point: &[f64]) -> Config {
        self.params
            .iter()
            .zip(point)
            .map(|((k, d), u)| (k.clone(), d.denormalize(*u)))
            .collect()
    }

    /// Unit-cube coordinates of `config`; `None` if a key is missing or out of domain.
    pub fn normalize(&self, config: &Config) -> Option<Vec<f64>> {
        self.params
            .iter()
            .map(|(k, d)| config.get(k).and_then(|v| d.normalize(v)))
            .collect()
    }

    /// Midpoint configuration, used as a low-risk first evaluation.
    pub fn center(&self) -> Config {
        self.denormalize(&vec![0.5; self.params.len()])
    }
}

/// A configuration split into estimator-level and component-level parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedConfig {
    pub estimator: Params,
    /// Component name → overrides (from `component.param` keys).
    pub components: BTreeMap<String, Params>,
}

impl CleanedConfig {
    pub fn component(&self, name: &str) -> Params {
        self.components.get(name).cloned().unwrap_or_default()
    }
}

/// Merge `config` over `init_params` and un-nest dotted keys.
///
/// `{"model_final.max_depth": 3, "cv": 2}` becomes estimator params `{cv: 2}`
/// plus component `model_final` with `{max_depth: 3}`. Values in `config` win
/// over `init_params`.
pub fn clean_config(init_params: &Config, config: &Config) -> CleanedConfig {
    let mut merged = init_params.clone();
    for (k, v) in config {
        merged.insert(k.clone(), v.clone());
    }

    let mut out = CleanedConfig::default();
    for (key, value) in merged {
        match key.split_once('.') {
            Some((component, param)) if !component.is_empty() && !param.is_empty() => {
                out.components
                    .entry(component.to_string())
                    .or_default()
                    .insert(param, value);
            }
            _ => out.estimator.insert(key, value),
        }
    }
    out
}
