//! Off-policy scoring of per-unit effect estimates.
//!
//! [`make_scores`] evaluates one CATE vector on one frame:
//! - ERUPT policy value (policy = effect > 0)
//! - uplift AUC and Qini against seeded random targeting
//! - R-score from an optional [`ReferenceScorer`] (0 without one)
//! - ATE as the mean predicted effect
//! - a shallow surrogate tree and a per-row [`PolicyTable`]

pub mod erupt;
pub mod interpret;
pub mod r_score;
pub mod uplift;

pub use erupt::*;
pub use interpret::*;
pub use r_score::*;
pub use uplift::*;

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::domain::{CausalRoles, Metric, Split};
use crate::error::AppError;
use crate::math::{mean, std_dev};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSettings {
    pub erupt_propensity: EruptPropensity,
    pub random_orderings: usize,
    pub random_seed: u64,
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            erupt_propensity: EruptPropensity::Prior,
            random_orderings: RANDOM_ORDERINGS,
            random_seed: RANDOM_SEED,
        }
    }
}

/// Per-row diagnostics behind the ERUPT score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyTable {
    pub treated: Vec<f64>,
    pub outcome: Vec<f64>,
    pub propensity: Vec<f64>,
    pub policy: Vec<bool>,
    pub weights: Vec<f64>,
}

impl PolicyTable {
    /// Build the table, insisting every column has exactly `n_rows` entries.
    pub fn new(
        n_rows: usize,
        treated: Vec<f64>,
        outcome: Vec<f64>,
        propensity: Vec<f64>,
        policy: Vec<bool>,
        weights: Vec<f64>,
    ) -> Result<Self, AppError> {
        let lens = [treated.len(), outcome.len(), propensity.len(), policy.len(), weights.len()];
        if lens.iter().any(|&l| l != n_rows) {
            return Err(AppError::data(format!(
                "Policy table columns have lengths {lens:?}, expected {n_rows} rows."
            )));
        }
        Ok(Self {
            treated,
            outcome,
            propensity,
            policy,
            weights,
        })
    }

    pub fn len(&self) -> usize {
        self.treated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.treated.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Scores {
    pub erupt: f64,
    pub qini: f64,
    pub auc: f64,
    pub r_score: f64,
    pub ate: f64,
    pub interpretation: Interpretation,
    pub values: PolicyTable,
}

impl Scores {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Erupt => self.erupt,
            Metric::Qini => self.qini,
            Metric::Auc => self.auc,
            Metric::RScore => self.r_score,
            Metric::Ate => self.ate,
        }
    }

    /// Every scalar metric keyed by name.
    pub fn metrics(&self) -> BTreeMap<&'static str, f64> {
        Metric::ALL.iter().map(|m| (m.name(), self.get(*m))).collect()
    }
}

/// Train and test scores of one fitted estimator.
#[derive(Debug, Clone, Serialize)]
pub struct SplitScores {
    pub estimator_name: String,
    pub train: Scores,
    pub test: Scores,
}

impl SplitScores {
    pub fn for_split(&self, split: Split) -> &Scores {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        }
    }
}

pub fn make_scores(
    roles: &CausalRoles,
    frame: &Frame,
    cate: &[f64],
    reference: Option<&dyn ReferenceScorer>,
    settings: &ScoreSettings,
) -> Result<Scores, AppError> {
    let n = frame.n_rows();
    if cate.len() != n {
        return Err(AppError::data(format!("{} effects for a frame of {n} rows.", cate.len())));
    }
    let treatment = frame.column(&roles.treatment)?.to_vec();
    let outcome = frame.column(&roles.outcome)?.to_vec();
    let x = frame.matrix(&roles.effect_modifiers)?;

    let policy: Vec<bool> = cate.iter().map(|c| *c > 0.0).collect();
    let erupt_model = Erupt::fit(&x, &treatment, settings.erupt_propensity)?;
    let weights = erupt_model.weights(&x, &treatment, &policy)?;
    let erupt = erupt_model.score(&x, &treatment, &outcome, &policy)?;

    let curves = UpliftCurves::compute(&outcome, &treatment, cate, settings.random_orderings, settings.random_seed)?;
    let r_score = match reference {
        Some(scorer) => scorer.score(cate)?,
        None => 0.0,
    };

    let values = PolicyTable::new(n, treatment, outcome, erupt_model.propensity(&x), policy, weights)?;

    Ok(Scores {
        erupt,
        qini: curves.qini(),
        auc: curves.auc(),
        r_score,
        ate: mean(cate),
        interpretation: interpret(&x, &roles.effect_modifiers, cate),
        values,
    })
}

/// Scores of a vacuous N(0, 1) effect vector, for comparison.
pub fn make_baseline(roles: &CausalRoles, frame: &Frame, seed: u64) -> Result<Scores, AppError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cate: Vec<f64> = (0..frame.n_rows()).map(|_| StandardNormal.sample(&mut rng)).collect();
    make_scores(roles, frame, &cate, None, &ScoreSettings::default())
}

/// Difference in means between arms with an approximate standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AteSummary {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

pub fn ate(treatment: &[f64], outcome: &[f64]) -> Result<AteSummary, AppError> {
    if treatment.len() != outcome.len() {
        return Err(AppError::data("ATE: treatment and outcome lengths differ."));
    }
    let treated: Vec<f64> = outcome.iter().zip(treatment).filter(|(_, t)| **t == 1.0).map(|(y, _)| *y).collect();
    let control: Vec<f64> = outcome.iter().zip(treatment).filter(|(_, t)| **t != 1.0).map(|(y, _)| *y).collect();
    let se = |v: &[f64]| std_dev(v) / ((v.len() as f64).sqrt() + 1e-3);
    let (s1, s2) = (se(&treated), se(&control));
    Ok(AteSummary {
        mean: mean(&treated) - mean(&control),
        std: (s1 * s1 + s2 * s2).sqrt(),
        count: treatment.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupAte {
    pub all: AteSummary,
    pub pos: AteSummary,
    pub neg: AteSummary,
}

/// ATE overall and within the policy-positive and policy-negative groups.
pub fn group_ate(treatment: &[f64], outcome: &[f64], policy: &[bool]) -> Result<GroupAte, AppError> {
    if policy.len() != treatment.len() {
        return Err(AppError::data("Group ATE: policy and treatment lengths differ."));
    }
    let subset = |want: bool| -> Result<AteSummary, AppError> {
        let rows: Vec<usize> = (0..policy.len()).filter(|&i| policy[i] == want).collect();
        let t: Vec<f64> = rows.iter().map(|&i| treatment[i]).collect();
        let y: Vec<f64> = rows.iter().map(|&i| outcome[i]).collect();
        ate(&t, &y)
    };
    Ok(GroupAte {
        all: ate(treatment, outcome)?,
        pos: subset(true)?,
        neg: subset(false)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::{fast_factory, synthetic};
    use crate::data::true_cate;
    use proptest::prelude::*;

    fn setup(rows: usize) -> (Frame, CausalRoles, Vec<f64>) {
        let (frame, estimand) = synthetic(rows, 11);
        let x1 = frame.column("x1").unwrap().to_vec();
        let x2 = frame.column("x2").unwrap().to_vec();
        let truth = x1.iter().zip(&x2).map(|(a, b)| true_cate(*a, *b, 1.0)).collect();
        (frame, estimand.roles(), truth)
    }

    #[test]
    fn scores_without_reference_have_zero_r_score() {
        let (frame, roles, truth) = setup(300);
        let s = make_scores(&roles, &frame, &truth, None, &ScoreSettings::default()).unwrap();
        assert_eq!(s.r_score, 0.0);
        assert_eq!(s.values.len(), frame.n_rows());
        assert!(s.erupt.is_finite());
        assert!(s.interpretation.tree().is_some());
    }

    #[test]
    fn true_effect_outscores_baseline() {
        let (frame, roles, truth) = setup(1000);
        let (_, estimand) = synthetic(1000, 11);
        let scorer = RScorer::fit(&frame, &estimand, &fast_factory(), 3).unwrap();
        let good = make_scores(&roles, &frame, &truth, Some(&scorer), &ScoreSettings::default()).unwrap();
        let base = make_baseline(&roles, &frame, 5).unwrap();
        assert!(good.qini > base.qini);
        assert!(good.erupt > base.erupt);
        assert!(good.r_score > 0.0);
    }

    #[test]
    fn wrong_length_cate_is_a_data_error() {
        let (frame, roles, _) = setup(50);
        let err = make_scores(&roles, &frame, &[1.0; 3], None, &ScoreSettings::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn missing_outcome_column_propagates() {
        let (frame, mut roles, truth) = setup(50);
        roles.outcome = "nope".into();
        assert!(make_scores(&roles, &frame, &truth, None, &ScoreSettings::default()).is_err());
    }

    #[test]
    fn policy_table_rejects_short_columns() {
        assert!(PolicyTable::new(3, vec![1.0; 3], vec![0.0; 3], vec![0.5; 2], vec![true; 3], vec![1.0; 3]).is_err());
    }

    #[test]
    fn ate_matches_difference_in_means() {
        let t = [1.0, 1.0, 0.0, 0.0];
        let y = [4.0, 6.0, 1.0, 3.0];
        let a = ate(&t, &y).unwrap();
        assert!((a.mean - 3.0).abs() < 1e-12);
        assert_eq!(a.count, 4);
        let s = 2f64.sqrt() / (2f64.sqrt() + 1e-3);
        assert!((a.std - (2.0 * s * s).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn group_ate_splits_by_policy() {
        let t = [1.0, 0.0, 1.0, 0.0];
        let y = [5.0, 1.0, 2.0, 2.0];
        let g = group_ate(&t, &y, &[true, true, false, false]).unwrap();
        assert_eq!(g.pos.mean, 4.0);
        assert_eq!(g.neg.mean, 0.0);
        assert_eq!(g.all.count, 4);
        assert_eq!(g.pos.count, 2);
    }

    proptest! {
        #[test]
        fn prop_ate_is_mean_effect(cate in prop::collection::vec(-5.0_f64..5.0, 20..60)) {
            let n = cate.len();
            let frame = Frame::new(vec![
                ("t".into(), (0..n).map(|i| (i % 2) as f64).collect()),
                ("y".into(), (0..n).map(|i| (i % 3) as f64).collect()),
            ]).unwrap();
            let roles = CausalRoles::new("t", "y", vec![], vec![]);
            let s = make_scores(&roles, &frame, &cate, None, &ScoreSettings::default()).unwrap();
            let m = cate.iter().sum::<f64>() / n as f64;
            prop_assert!((s.ate - m).abs() < 1e-9);
            prop_assert_eq!(s.values.len(), n);
        }
    }
}
