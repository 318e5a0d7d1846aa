//! Estimator name resolution.
//!
//! `resolve` is a pure function of (registry, request, row count). It never
//! logs; fallbacks are reported through [`Resolution::warning`] and the caller
//! decides how to surface them.

use crate::error::AppError;
use crate::registry::{EstimatorId, EstimatorRequest, Registry};

/// Above this many rows, `All` skips estimators that do not scale.
pub const LARGE_DATA_ROWS: usize = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub estimators: Vec<EstimatorId>,
    pub warning: Option<String>,
}

fn default_set(registry: &Registry) -> Vec<EstimatorId> {
    registry.ids().filter(|id| !id.is_experimental()).collect()
}

pub fn resolve(registry: &Registry, request: &EstimatorRequest, data_rows: usize) -> Result<Resolution, AppError> {
    let resolution = match request {
        EstimatorRequest::Auto => Resolution {
            estimators: default_set(registry),
            warning: Some(
                "Using the default estimator set; pass an explicit estimator list to search other estimators."
                    .to_string(),
            ),
        },
        EstimatorRequest::Patterns(patterns) if patterns.is_empty() => Resolution {
            estimators: default_set(registry),
            warning: Some("Empty estimator list, using the default estimator set.".to_string()),
        },
        EstimatorRequest::All => Resolution {
            estimators: registry
                .ids()
                .filter(|id| data_rows <= LARGE_DATA_ROWS || id.is_large_data_safe())
                .collect(),
            warning: None,
        },
        EstimatorRequest::Patterns(patterns) => {
            let mut estimators: Vec<EstimatorId> = Vec::new();
            for pattern in patterns {
                for id in registry.ids() {
                    if id.as_str().contains(pattern.as_str()) && !estimators.contains(&id) {
                        estimators.push(id);
                    }
                }
            }
            if estimators.is_empty() {
                Resolution {
                    estimators: default_set(registry),
                    warning: Some(format!(
                        "No estimator matches {patterns:?}; falling back to the default estimator set."
                    )),
                }
            } else {
                Resolution {
                    estimators,
                    warning: None,
                }
            }
        }
    };

    if resolution.estimators.is_empty() {
        return Err(AppError::config("The estimator registry yields no estimators for this request."));
    }
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn patterns(p: &[&str]) -> EstimatorRequest {
        EstimatorRequest::Patterns(p.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn auto_yields_the_six_default_estimators() {
        let r = resolve(&Registry::new(false), &EstimatorRequest::Auto, 100).unwrap();
        assert_eq!(r.estimators.len(), 6);
        assert!(r.warning.is_some());
        // Experimental entries in the registry do not change the auto set.
        let r = resolve(&Registry::new(true), &EstimatorRequest::Auto, 100).unwrap();
        assert_eq!(r.estimators.len(), 6);
    }

    #[test]
    fn all_respects_the_row_threshold() {
        let registry = Registry::new(true);
        let small = resolve(&registry, &EstimatorRequest::All, 1).unwrap();
        assert_eq!(small.estimators.len(), registry.len());
        let large = resolve(&registry, &EstimatorRequest::All, 10_000).unwrap();
        assert_eq!(large.estimators.len(), registry.len() - 2);
        assert!(!large.estimators.contains(&EstimatorId::DmlOrthoForest));
        let edge = resolve(&registry, &EstimatorRequest::All, LARGE_DATA_ROWS).unwrap();
        assert_eq!(edge.estimators.len(), registry.len());
    }

    #[test]
    fn substring_groups_match_only_members() {
        let registry = Registry::new(false);
        let r = resolve(&registry, &patterns(&["dml"]), 100).unwrap();
        assert!(!r.estimators.is_empty());
        assert!(r.estimators.iter().all(|id| id.as_str().contains("dml")));

        let r = resolve(&registry, &patterns(&["econml"]), 100).unwrap();
        assert!(r.estimators.iter().all(|id| id.as_str().contains("econml")));
    }

    #[test]
    fn single_name_and_duplicates() {
        let registry = Registry::new(false);
        let r = resolve(&registry, &patterns(&["DomainAdaptationLearner"]), 100).unwrap();
        assert_eq!(r.estimators, vec![EstimatorId::DomainAdaptationLearner]);

        let r = resolve(
            &registry,
            &patterns(&["DomainAdaptationLearner", "DomainAdaptationLearner", "DomainAdaptationLearner"]),
            100,
        )
        .unwrap();
        assert_eq!(r.estimators.len(), 1);
    }

    #[test]
    fn unmatched_patterns_fall_back_with_warning() {
        let registry = Registry::new(false);
        let r = resolve(&registry, &patterns(&["linear_regression", "pasta"]), 100).unwrap();
        assert_eq!(r.estimators.len(), 6);
        assert!(r.warning.unwrap().contains("pasta"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let registry = Registry::new(true);
        let r = resolve(&registry, &patterns(&["DML"]), 100).unwrap();
        assert!(r.estimators.iter().all(|id| id.as_str().contains("DML")));
        assert!(!r.estimators.contains(&EstimatorId::LinearDrLearner));
    }

    proptest! {
        #[test]
        fn prop_resolution_is_a_duplicate_free_subset(
            picks in proptest::collection::vec(0usize..20, 0..8),
            experimental in any::<bool>(),
            rows in 0usize..20_000,
        ) {
            let pool = [
                "dml", "DML", "metalearners", "Learner", "orf", "econml", "pasta", "Dummy",
                "backdoor", "TLearner", "Forest", "dr.", "x", "auto", "SLearner", "XLearner",
                "CausalForestDML", "Transformed", "", "zzz",
            ];
            let request = EstimatorRequest::Patterns(picks.iter().map(|&i| pool[i].to_string()).collect());
            let registry = Registry::new(experimental);
            for req in [request, EstimatorRequest::Auto, EstimatorRequest::All] {
                let r = resolve(&registry, &req, rows).unwrap();
                let mut seen = std::collections::HashSet::new();
                for id in &r.estimators {
                    prop_assert!(registry.get(*id).is_some());
                    prop_assert!(seen.insert(*id));
                }
            }
        }
    }
}
