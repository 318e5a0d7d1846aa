//! Terminal formatting of search results.
//!
//! Formatting lives here so the search and scoring code stay free of
//! presentation concerns.

use crate::domain::Metric;
use crate::fit::{AutoCausality, EstimatorState};
use crate::report::LeaderboardRow;
use crate::scoring::{AteSummary, GroupAte, Scores, SplitScores};

/// Header block: estimand, split sizes and the chosen estimator.
pub fn format_run_summary(ac: &AutoCausality) -> String {
    let mut out = String::new();
    out.push_str("=== autocausal - causal estimator search ===\n");
    let Ok(results) = ac.results() else {
        out.push_str("(no results)\n");
        return out;
    };
    let config = ac.config();
    out.push_str(&format!("Estimand: {}\n", results.estimand.expression));
    out.push_str(&format!(
        "Rows: train={} | test={}\n",
        results.train.n_rows(),
        results.test.n_rows()
    ));
    out.push_str(&format!(
        "Metric: {} on {:?} | search={:?} | samples={} | budget={}\n",
        config.metric,
        config.selection_split,
        config.search_algorithm,
        config.num_samples,
        config.time_budget.map(|b| format!("{b}s")).unwrap_or_else(|| "unlimited".to_string()),
    ));

    if let (Ok(best), Ok(score), Ok(cfg)) = (ac.best_estimator(), ac.best_score(), ac.best_config()) {
        out.push_str(&format!("\nBest: {} ({} = {})\n", best.as_str(), config.metric, fmt_score(score)));
        let params: Vec<String> = cfg.iter().map(|(k, v)| format!("{k}={v}")).collect();
        out.push_str(&format!("Config: {{{}}}\n", params.join(", ")));
    }
    if let Ok(model) = ac.model() {
        out.push_str(&format!("Estimate: {model}\n"));
    }
    out
}

/// Leaderboard table: one row per searched estimator.
pub fn format_leaderboard(rows: &[LeaderboardRow], metric: Metric) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<26} {:>10} {:>7} {:>7}  {}\n", "estimator", metric.name(), "trials", "failed", "state"));
    out.push_str(&format!("{:-<26} {:->10} {:->7} {:->7}  {:-<9}\n", "", "", "", "", ""));
    for r in rows {
        let state = match &r.state {
            EstimatorState::Completed => "completed".to_string(),
            EstimatorState::Failed { reason } => format!("failed: {reason}"),
            EstimatorState::Searching => "searching".to_string(),
            EstimatorState::NotStarted => "not started".to_string(),
        };
        out.push_str(
            format!(
                "{:<26} {:>10} {:>7} {:>7}  {}\n",
                truncate(r.estimator.short_name(), 26),
                r.score.map(fmt_score).unwrap_or_else(|| "-".to_string()),
                r.trials,
                r.failed_trials,
                state
            )
            .as_str(),
        );
    }
    out
}

/// Train/test metric table for a set of scored estimators.
pub fn format_scores<'a>(scores: impl IntoIterator<Item = &'a SplitScores>) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<26} {:<5}", "estimator", "split"));
    for m in Metric::ALL {
        out.push_str(&format!(" {:>9}", m.name()));
    }
    out.push('\n');
    for s in scores {
        let name = s.estimator_name.rsplit('.').next().unwrap_or(&s.estimator_name);
        for (split, sc) in [("train", &s.train), ("test", &s.test)] {
            out.push_str(&format!("{:<26} {:<5}{}\n", truncate(name, 26), split, metric_cells(sc)));
        }
    }
    out
}

fn metric_cells(scores: &Scores) -> String {
    Metric::ALL
        .iter()
        .map(|m| format!(" {:>9}", fmt_score(scores.get(*m))))
        .collect()
}

pub fn format_group_ate(group: &GroupAte) -> String {
    let mut out = String::new();
    out.push_str("Observed ATE by recommended policy (test split):\n");
    out.push_str(&format!("{:<10} {:>9} {:>9} {:>7}\n", "group", "mean", "std", "count"));
    for (label, a) in [("all", &group.all), ("treat", &group.pos), ("control", &group.neg)] {
        out.push_str(&ate_line(label, a));
    }
    out
}

fn ate_line(label: &str, a: &AteSummary) -> String {
    format!("{:<10} {:>9} {:>9} {:>7}\n", label, fmt_score(a.mean), fmt_score(a.std), a.count)
}

fn fmt_score(v: f64) -> String {
    if v.is_finite() { format!("{v:.4}") } else { "n/a".to_string() }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EstimatorId;

    #[test]
    fn undefined_scores_print_as_na() {
        assert_eq!(fmt_score(f64::NAN), "n/a");
        assert_eq!(fmt_score(1.23456), "1.2346");
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("DomainAdaptationLearner", 10), "DomainAda.");
        assert_eq!(truncate("SLearner", 10), "SLearner");
    }

    #[test]
    fn leaderboard_shows_failures() {
        let rows = vec![
            LeaderboardRow {
                estimator: EstimatorId::TLearner,
                state: EstimatorState::Completed,
                score: Some(0.5),
                trials: 1,
                failed_trials: 0,
            },
            LeaderboardRow {
                estimator: EstimatorId::SLearner,
                state: EstimatorState::Failed { reason: "boom".into() },
                score: None,
                trials: 2,
                failed_trials: 2,
            },
        ];
        let text = format_leaderboard(&rows, Metric::Erupt);
        assert!(text.contains("TLearner"));
        assert!(text.contains("0.5000"));
        assert!(text.contains("failed: boom"));
    }

    #[test]
    fn group_table_has_three_rows() {
        let a = AteSummary { mean: 1.0, std: 0.1, count: 10 };
        let text = format_group_ate(&GroupAte { all: a, pos: a, neg: a });
        assert_eq!(text.lines().count(), 5);
    }
}
