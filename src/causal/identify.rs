//! Identification of the causal estimand.
//!
//! Graph discovery is out of scope: the [`Identifier`] trait is the seam where
//! an external identification service would plug in. [`BackdoorIdentifier`]
//! assumes the declared common causes form a valid adjustment set.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::Frame;
use crate::domain::CausalRoles;
use crate::error::AppError;

/// The estimand every trial of a run estimates. Built once per `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedEstimand {
    pub treatment: String,
    pub outcome: String,
    pub backdoor_variables: Vec<String>,
    pub effect_modifiers: Vec<String>,
    /// Printable estimand, e.g. `d/d[t] E[y | x1, w1]`.
    pub expression: String,
}

impl IdentifiedEstimand {
    /// Nuisance features `X ∪ W` (effect modifiers first, no duplicates).
    pub fn nuisance_features(&self) -> Vec<String> {
        let mut out: Vec<String> = self.effect_modifiers.clone();
        for w in &self.backdoor_variables {
            if !out.contains(w) {
                out.push(w.clone());
            }
        }
        out
    }

    /// Column roles this estimand was identified from.
    pub fn roles(&self) -> CausalRoles {
        CausalRoles::new(
            self.treatment.clone(),
            self.outcome.clone(),
            self.backdoor_variables.clone(),
            self.effect_modifiers.clone(),
        )
    }
}

pub trait Identifier: Send + Sync {
    fn identify(&self, frame: &Frame, roles: &CausalRoles) -> Result<IdentifiedEstimand, AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackdoorIdentifier;

impl Identifier for BackdoorIdentifier {
    fn identify(&self, frame: &Frame, roles: &CausalRoles) -> Result<IdentifiedEstimand, AppError> {
        let required = std::iter::once(&roles.treatment)
            .chain(std::iter::once(&roles.outcome))
            .chain(roles.common_causes.iter())
            .chain(roles.effect_modifiers.iter());
        for name in required {
            if !frame.has_column(name) {
                return Err(AppError::config(format!("Column '{name}' not found in the data.")));
            }
        }
        if roles.common_causes.contains(&roles.treatment) || roles.effect_modifiers.contains(&roles.treatment) {
            return Err(AppError::config("The treatment cannot also be a feature."));
        }
        if roles.common_causes.contains(&roles.outcome) || roles.effect_modifiers.contains(&roles.outcome) {
            return Err(AppError::config("The outcome cannot also be a feature."));
        }
        if roles.common_causes.is_empty() && roles.effect_modifiers.is_empty() {
            warn!("No common causes or effect modifiers given; the estimand is identified only if treatment is randomized.");
        }

        let conditioning = roles.nuisance_features();
        let expression = if conditioning.is_empty() {
            format!("d/d[{}] E[{}]", roles.treatment, roles.outcome)
        } else {
            format!("d/d[{}] E[{} | {}]", roles.treatment, roles.outcome, conditioning.join(", "))
        };

        Ok(IdentifiedEstimand {
            treatment: roles.treatment.clone(),
            outcome: roles.outcome.clone(),
            backdoor_variables: roles.common_causes.clone(),
            effect_modifiers: roles.effect_modifiers.clone(),
            expression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec![
            ("t".into(), vec![0.0, 1.0]),
            ("y".into(), vec![1.0, 2.0]),
            ("x".into(), vec![0.5, 0.1]),
            ("w".into(), vec![1.0, 0.0]),
        ])
        .unwrap()
    }

    #[test]
    fn backdoor_estimand_lists_adjustment_set() {
        let roles = CausalRoles::new("t", "y", vec!["w".into()], vec!["x".into()]);
        let estimand = BackdoorIdentifier.identify(&frame(), &roles).unwrap();
        assert_eq!(estimand.expression, "d/d[t] E[y | x, w]");
        assert_eq!(estimand.nuisance_features(), vec!["x", "w"]);
    }

    #[test]
    fn missing_columns_are_config_errors() {
        let roles = CausalRoles::new("t", "outcome", vec![], vec![]);
        let err = BackdoorIdentifier.identify(&frame(), &roles).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
