//! Reporting: leaderboard rows, baseline comparison and group ATE.

pub mod format;

pub use format::*;

use crate::error::AppError;
use crate::fit::{AutoCausality, EstimatorState};
use crate::registry::EstimatorId;
use crate::scoring::{group_ate, make_baseline, GroupAte, SplitScores};

/// One line of the estimator leaderboard.
#[derive(Debug, Clone)]
pub struct LeaderboardRow {
    pub estimator: EstimatorId,
    pub state: EstimatorState,
    /// Selection score on the selection split; `None` unless completed.
    pub score: Option<f64>,
    pub trials: usize,
    pub failed_trials: usize,
}

/// Every searched estimator, completed ones first by descending score.
pub fn leaderboard(ac: &AutoCausality) -> Result<Vec<LeaderboardRow>, AppError> {
    let results = ac.results()?;
    let scores = ac.best_score_per_estimator();
    let mut rows: Vec<LeaderboardRow> = results
        .estimators
        .iter()
        .map(|id| {
            let entries = results.history.iter().filter(|e| e.estimator == *id);
            LeaderboardRow {
                estimator: *id,
                state: results.states.get(id).cloned().unwrap_or(EstimatorState::NotStarted),
                score: scores.get(id).copied(),
                trials: entries.clone().count(),
                failed_trials: entries.filter(|e| e.error.is_some()).count(),
            }
        })
        .collect();
    // Undefined scores sort with the failed estimators.
    let key = |s: Option<f64>| s.filter(|v| !v.is_nan());
    rows.sort_by(|a, b| match (key(a.score), key(b.score)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    Ok(rows)
}

/// Scores of a random N(0, 1) effect vector on both splits.
pub fn baseline_scores(ac: &AutoCausality) -> Result<SplitScores, AppError> {
    let results = ac.results()?;
    let roles = results.estimand.roles();
    let seed = ac.config().seed;
    Ok(SplitScores {
        estimator_name: "baseline".to_string(),
        train: make_baseline(&roles, &results.train, seed)?,
        test: make_baseline(&roles, &results.test, seed.wrapping_add(1))?,
    })
}

/// Group ATE of the active estimator's policy on the test split.
pub fn policy_group_ate(ac: &AutoCausality) -> Result<GroupAte, AppError> {
    let id = ac.active_estimator()?;
    let scores = ac
        .full_scores()
        .get(&id)
        .copied()
        .ok_or_else(|| AppError::usage(format!("Estimator '{id}' has no scores.")))?;
    let v = &scores.test.values;
    group_ate(&v.treated, &v.outcome, &v.policy)
}
