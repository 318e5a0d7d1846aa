//! The search orchestrator.
//!
//! [`AutoCausality::fit`]:
//! - validates roles and data, resolves the estimator list
//! - splits train/test, identifies the estimand once
//! - builds the R-scorers once (when the R-score is tracked)
//! - searches each estimator in turn and keeps its best trial
//! - picks the global best (first seen wins ties)
//!
//! Estimators are processed strictly one after another. Inside one estimator,
//! trials run in batches; each batch is evaluated with rayon and collected in
//! order, so the bookkeeping is deterministic for a fixed seed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::causal::{BackdoorIdentifier, CausalEstimate, IdentifiedEstimand, Identifier};
use crate::data::{ensure_binary_treatment, Frame};
use crate::domain::{AutoCausalityConfig, CausalRoles, Config, Metric};
use crate::error::AppError;
use crate::fit::trial::{TrialContext, TrialRecord, TrialRunner};
use crate::fit::tuner::strategy_for;
use crate::io::write_snapshot;
use crate::models::ComponentFactory;
use crate::registry::{resolve, EstimatorDescriptor, EstimatorId, Registry};
use crate::scoring::{RScoreWrapper, ScoreSettings, SplitScores};

/// Fewest rows `fit` accepts.
pub const MIN_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EstimatorState {
    NotStarted,
    Searching,
    Completed,
    Failed { reason: String },
}

/// One evaluated configuration, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct TuneEntry {
    pub estimator: EstimatorId,
    pub trial: usize,
    pub config: Config,
    /// Selection score; `None` when the trial failed.
    pub score: Option<f64>,
    pub error: Option<String>,
}

/// Everything a finished `fit` knows.
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub estimand: IdentifiedEstimand,
    pub train: Frame,
    pub test: Frame,
    /// Estimators in processing order.
    pub estimators: Vec<EstimatorId>,
    pub states: BTreeMap<EstimatorId, EstimatorState>,
    /// Best trial of each completed estimator.
    pub records: BTreeMap<EstimatorId, TrialRecord>,
    pub history: Vec<TuneEntry>,
    pub best: Option<EstimatorId>,
    pub snapshots: Vec<PathBuf>,
}

/// Number of trials evaluated together when parallel trials are enabled.
///
/// Each trial asks for `cpu` cores and `gpu` GPUs; GPU shares only limit the
/// batch when GPUs are available.
pub fn trial_concurrency(config: &AutoCausalityConfig, cpus: usize) -> usize {
    if !config.parallel_trials {
        return 1;
    }
    let res = config.resources_per_trial;
    let mut slots = (cpus as f64 / res.cpu).floor() as usize;
    if config.available_gpus > 0.0 && res.gpu > 0.0 {
        slots = slots.min((config.available_gpus / res.gpu).floor() as usize);
    }
    slots.max(1)
}

pub struct AutoCausality {
    config: AutoCausalityConfig,
    registry: Registry,
    identifier: Box<dyn Identifier>,
    factory: Option<ComponentFactory>,
    score_settings: ScoreSettings,
    results: Option<SearchResults>,
    active: Option<EstimatorId>,
}

impl AutoCausality {
    pub fn new(config: AutoCausalityConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            registry: Registry::new(config.include_experimental),
            config,
            identifier: Box::new(BackdoorIdentifier),
            factory: None,
            score_settings: ScoreSettings::default(),
            results: None,
            active: None,
        })
    }

    pub fn with_identifier(mut self, identifier: Box<dyn Identifier>) -> Self {
        self.identifier = identifier;
        self
    }

    /// Use `factory` for every nuisance model instead of tuned components.
    pub fn with_component_factory(mut self, factory: ComponentFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_score_settings(mut self, settings: ScoreSettings) -> Self {
        self.score_settings = settings;
        self
    }

    pub fn config(&self) -> &AutoCausalityConfig {
        &self.config
    }

    pub fn fit(&mut self, frame: &Frame, roles: &CausalRoles) -> Result<(), AppError> {
        self.results = None;
        self.active = None;
        let config = &self.config;

        check_inputs(frame, roles)?;
        let resolution = resolve(&self.registry, &config.estimator_list, frame.n_rows())?;
        if let Some(w) = &resolution.warning {
            warn!("{w}");
        }
        for id in &resolution.estimators {
            self.registry.descriptor(*id)?.search_space.validate()?;
        }
        info!(
            estimators = ?resolution.estimators.iter().map(|e| e.short_name()).collect::<Vec<_>>(),
            "estimators to search"
        );

        let (train, mut test) = frame.train_test_split(config.train_size, config.seed)?;
        if let Some(n) = config.test_size {
            if n < test.n_rows() {
                test = test.sample(n, config.seed)?;
            } else {
                warn!(
                    test_size = n,
                    available = test.n_rows(),
                    "test_size exceeds held-out rows; using all of them"
                );
            }
        }
        let estimand = self.identifier.identify(&train, roles)?;
        info!(
            estimand = %estimand.expression,
            train = train.n_rows(),
            test = test.n_rows(),
            "identified estimand"
        );

        let factory = match &self.factory {
            Some(f) => f.clone(),
            None => ComponentFactory::from_settings(
                &config.effective_components(),
                config.use_dummy_classifier,
                config.seed,
            ),
        };
        let tracked = config.tracked_metrics();
        let r_scorers = if tracked.contains(&Metric::RScore) {
            Some(RScoreWrapper::build(&train, &test, &estimand, &factory)?)
        } else {
            None
        };

        let ctx = TrialContext {
            train: &train,
            test: &test,
            estimand: &estimand,
            r_scorers: r_scorers.as_ref(),
            factory: &factory,
            score_settings: self.score_settings,
            metric: config.metric,
            tracked,
            selection_split: config.selection_split,
        };

        let mut states: BTreeMap<EstimatorId, EstimatorState> = resolution
            .estimators
            .iter()
            .map(|id| (*id, EstimatorState::NotStarted))
            .collect();
        let mut records = BTreeMap::new();
        let mut history = Vec::new();
        let mut snapshots = Vec::new();

        for (position, id) in resolution.estimators.iter().copied().enumerate() {
            let descriptor = self.registry.descriptor(id)?;
            states.insert(id, EstimatorState::Searching);
            let seed = config.seed.wrapping_add(position as u64 * 1_000_003);
            let (best, entries) = search_estimator(config, &ctx, descriptor, seed);
            history.extend(entries);

            match best {
                Some(record) => {
                    info!(
                        estimator = id.short_name(),
                        metric = %config.metric,
                        score = record.score(config.metric, config.selection_split),
                        "estimator completed"
                    );
                    if config.verbose > 0 {
                        for line in metric_lines(&record, config) {
                            info!(estimator = id.short_name(), "{line}");
                        }
                    }
                    if let Some(dir) = &config.model_save_path {
                        snapshots.push(write_snapshot(dir, &record, config.time_budget)?);
                    }
                    states.insert(id, EstimatorState::Completed);
                    records.insert(id, record);
                }
                None => {
                    let reason = "every trial failed".to_string();
                    warn!(estimator = id.short_name(), "{reason}");
                    states.insert(id, EstimatorState::Failed { reason });
                }
            }
        }

        let mut best: Option<(EstimatorId, f64)> = None;
        for id in &resolution.estimators {
            if let Some(record) = records.get(id) {
                let score = record.score(config.metric, config.selection_split);
                if best.is_none_or(|(_, incumbent)| improves(score, incumbent)) {
                    best = Some((*id, score));
                }
            }
        }
        let Some((best_id, best_score)) = best else {
            return Err(AppError::estimation("No estimator completed successfully."));
        };
        info!(estimator = best_id.as_str(), score = best_score, "best estimator");

        self.results = Some(SearchResults {
            estimand,
            train,
            test,
            estimators: resolution.estimators,
            states,
            records,
            history,
            best: Some(best_id),
            snapshots,
        });
        self.active = Some(best_id);
        Ok(())
    }

    pub fn results(&self) -> Result<&SearchResults, AppError> {
        self.results
            .as_ref()
            .ok_or_else(|| AppError::usage("No search results: call fit first."))
    }

    /// Estimator whose model `model` and `effect` use; the best one after `fit`.
    pub fn active_estimator(&self) -> Result<EstimatorId, AppError> {
        self.active
            .ok_or_else(|| AppError::usage("No active estimator: call fit first."))
    }

    pub fn set_active_estimator(&mut self, id: EstimatorId) -> Result<(), AppError> {
        if !self.results()?.records.contains_key(&id) {
            return Err(AppError::usage(format!("Estimator '{id}' has no fitted model.")));
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn best_estimator(&self) -> Result<EstimatorId, AppError> {
        self.results()?
            .best
            .ok_or_else(|| AppError::usage("No estimator completed."))
    }

    fn best_record(&self) -> Result<&TrialRecord, AppError> {
        let id = self.best_estimator()?;
        self.record(id)
    }

    fn record(&self, id: EstimatorId) -> Result<&TrialRecord, AppError> {
        self.results()?
            .records
            .get(&id)
            .ok_or_else(|| AppError::usage(format!("Estimator '{id}' has no fitted model.")))
    }

    pub fn best_config(&self) -> Result<&Config, AppError> {
        Ok(&self.best_record()?.config)
    }

    pub fn best_score(&self) -> Result<f64, AppError> {
        Ok(self.best_record()?.score(self.config.metric, self.config.selection_split))
    }

    pub fn best_config_per_estimator(&self) -> BTreeMap<EstimatorId, Config> {
        self.completed().map(|(id, r)| (id, r.config.clone())).collect()
    }

    pub fn best_score_per_estimator(&self) -> BTreeMap<EstimatorId, f64> {
        self.completed()
            .map(|(id, r)| (id, r.score(self.config.metric, self.config.selection_split)))
            .collect()
    }

    pub fn full_scores(&self) -> BTreeMap<EstimatorId, &SplitScores> {
        self.completed().map(|(id, r)| (id, &r.scores)).collect()
    }

    pub fn estimator_states(&self) -> BTreeMap<EstimatorId, EstimatorState> {
        self.results.as_ref().map(|r| r.states.clone()).unwrap_or_default()
    }

    pub fn tune_history(&self) -> &[TuneEntry] {
        self.results.as_ref().map(|r| r.history.as_slice()).unwrap_or_default()
    }

    /// Fitted estimate of the active estimator.
    pub fn model(&self) -> Result<&CausalEstimate, AppError> {
        let id = self.active_estimator()?;
        Ok(&self.record(id)?.estimate)
    }

    pub fn best_model_for_estimator(&self, id: EstimatorId) -> Result<&CausalEstimate, AppError> {
        Ok(&self.record(id)?.estimate)
    }

    /// Per-unit effects of the active estimator on `frame`.
    pub fn effect(&self, frame: &Frame) -> Result<Vec<f64>, AppError> {
        self.model()?.effect(frame)
    }

    fn completed(&self) -> impl Iterator<Item = (EstimatorId, &TrialRecord)> {
        self.results
            .iter()
            .flat_map(|r| r.records.iter().map(|(id, rec)| (*id, rec)))
    }
}

/// Strictly better than the incumbent. A NaN incumbent loses to any defined
/// score; a NaN score never wins.
fn improves(score: f64, incumbent: f64) -> bool {
    score > incumbent || (incumbent.is_nan() && !score.is_nan())
}

/// Column, treatment and size checks. Runs before any model is fitted.
fn check_inputs(frame: &Frame, roles: &CausalRoles) -> Result<(), AppError> {
    let named = [&roles.treatment, &roles.outcome]
        .into_iter()
        .chain(roles.common_causes.iter())
        .chain(roles.effect_modifiers.iter());
    for name in named {
        if !frame.has_column(name) {
            return Err(AppError::config(format!("Column '{name}' not found in the data.")));
        }
    }
    ensure_binary_treatment(frame.column(&roles.treatment)?, &roles.treatment)?;
    if frame.n_rows() < MIN_ROWS {
        return Err(AppError::config(format!(
            "Need at least {MIN_ROWS} rows to search estimators, got {}.",
            frame.n_rows()
        )));
    }
    Ok(())
}

/// Search one estimator. Returns its best trial and every evaluation.
///
/// The best trial is the one with the highest finite selection score, or the
/// first successful trial when none scored finitely. `None` only when every
/// trial failed.
fn search_estimator(
    config: &AutoCausalityConfig,
    ctx: &TrialContext<'_>,
    descriptor: &EstimatorDescriptor,
    seed: u64,
) -> (Option<TrialRecord>, Vec<TuneEntry>) {
    let runner = TrialRunner::new(ctx, descriptor);
    let id = descriptor.id;
    let space = &descriptor.search_space;
    let mut history = Vec::new();
    let mut best: Option<TrialRecord> = None;
    let mut best_score = f64::NEG_INFINITY;
    // First successful trial, kept in case no trial scores finitely.
    let mut fallback: Option<TrialRecord> = None;

    let mut consider =
        |trial: usize, config_used: &Config, result: Result<TrialRecord, AppError>| -> f64 {
            match result {
                Ok(record) => {
                    let score = record.score(config.metric, config.selection_split);
                    history.push(TuneEntry {
                        estimator: id,
                        trial,
                        config: config_used.clone(),
                        score: Some(score),
                        error: None,
                    });
                    if score.is_finite() && score > best_score {
                        best_score = score;
                        best = Some(record);
                    } else if best.is_none() && fallback.is_none() {
                        fallback = Some(record);
                    }
                    score
                }
                Err(e) => {
                    warn!(estimator = id.short_name(), trial, error = %e, "trial failed");
                    history.push(TuneEntry {
                        estimator: id,
                        trial,
                        config: config_used.clone(),
                        score: None,
                        error: Some(e.to_string()),
                    });
                    f64::NAN
                }
            }
        };

    if space.is_empty() {
        let empty = Config::new();
        consider(0, &empty, runner.run_isolated(&empty, 0));
        return (best.or(fallback), history);
    }

    let mut strategy = strategy_for(config.search_algorithm, seed, config.num_samples);
    let batch = trial_concurrency(config, rayon::current_num_threads());
    let started = Instant::now();
    let mut next = 0;
    while next < config.num_samples {
        // The first batch always runs; the budget only stops later scheduling.
        if next > 0 && config.time_budget.is_some_and(|b| started.elapsed().as_secs_f64() >= b) {
            debug!(estimator = id.short_name(), trials = next, "time budget exhausted");
            break;
        }
        let configs = strategy.suggest(space, batch.min(config.num_samples - next));
        if configs.is_empty() {
            break;
        }
        let results: Vec<Result<TrialRecord, AppError>> = if configs.len() > 1 {
            configs
                .par_iter()
                .enumerate()
                .map(|(i, c)| runner.run_isolated(c, next + i))
                .collect()
        } else {
            vec![runner.run_isolated(&configs[0], next)]
        };
        for (i, (c, result)) in configs.iter().zip(results).enumerate() {
            let score = consider(next + i, c, result);
            strategy.observe(space, c, score);
        }
        next += configs.len();
    }
    (best.or(fallback), history)
}

/// Selection metric and report metrics of `record` on the train split, one line each.
fn metric_lines(record: &TrialRecord, config: &AutoCausalityConfig) -> Vec<String> {
    let train = &record.scores.train;
    let mut lines = vec![format!("{} (train): {:.4}", config.metric, train.get(config.metric))];
    for m in config.metrics_to_report.iter().filter(|m| **m != config.metric) {
        lines.push(format!("{m} (train): {:.4}", train.get(*m)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::{fast_factory, synthetic};
    use crate::domain::{ParamValue, SearchAlgorithm};
    use crate::error::ErrorKind;
    use crate::fit::space::{Domain, SearchSpace};
    use crate::io::read_snapshot;
    use crate::registry::EstimatorRequest;

    fn quick_config(patterns: &[&str]) -> AutoCausalityConfig {
        AutoCausalityConfig {
            estimator_list: EstimatorRequest::Patterns(
                patterns.iter().map(|s| s.to_string()).collect(),
            ),
            num_samples: 3,
            time_budget: None,
            search_algorithm: SearchAlgorithm::Random,
            metrics_to_report: vec![Metric::Qini, Metric::Auc],
            ..AutoCausalityConfig::default()
        }
    }

    fn roles() -> CausalRoles {
        synthetic(20, 1).1.roles()
    }

    #[test]
    fn tiny_treatment_only_frame_is_rejected_before_estimation() {
        let frame = Frame::new(vec![("treatment".into(), vec![0.0, 1.0])]).unwrap();
        let roles = CausalRoles::new("treatment", "y", vec![], vec![]);
        let mut config = AutoCausalityConfig::default();
        config.estimator_list = EstimatorRequest::Patterns(vec![]);
        let mut ac = AutoCausality::new(config).unwrap();
        let err = ac.fit(&frame, &roles).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(ac.tune_history().is_empty());
    }

    #[test]
    fn empty_space_estimator_runs_one_trial() {
        let (frame, _) = synthetic(250, 5);
        let mut ac = AutoCausality::new(quick_config(&["TLearner"]))
            .unwrap()
            .with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();

        let results = ac.results().unwrap();
        assert_eq!(results.train.n_rows(), 200);
        assert_eq!(results.test.n_rows(), 50);
        assert_eq!(ac.tune_history().len(), 1);
        assert_eq!(ac.best_estimator().unwrap(), EstimatorId::TLearner);
        assert!(ac.best_config().unwrap().is_empty());
        assert_eq!(ac.best_config_per_estimator()[&EstimatorId::TLearner], Config::new());
        assert_eq!(ac.estimator_states()[&EstimatorId::TLearner], EstimatorState::Completed);
        assert_eq!(ac.effect(&frame).unwrap().len(), 250);
    }

    #[test]
    fn tuned_estimator_respects_sample_budget() {
        let (frame, _) = synthetic(300, 6);
        let mut config = quick_config(&["LinearDML"]);
        config.parallel_trials = true;
        let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();
        let history = ac.tune_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().map(|e| e.trial).collect::<Vec<_>>(), vec![0, 1, 2]);
        let best = ac.best_score().unwrap();
        assert!(history.iter().filter_map(|e| e.score).all(|s| s <= best));
        assert!(ac.best_config().unwrap().contains_key("cv"));
    }

    #[test]
    fn failing_estimator_is_excluded_and_search_continues() {
        let (frame, _) = synthetic(200, 8);
        let broken = EstimatorDescriptor {
            id: EstimatorId::SLearner,
            init_params: Config::new(),
            search_space: SearchSpace::new().with("not_a_param", Domain::uniform(0.0, 1.0)),
        };
        let registry = Registry::new(false).with_descriptor(broken);
        let mut ac = AutoCausality::new(quick_config(&["SLearner", "TLearner"]))
            .unwrap()
            .with_registry(registry)
            .with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();

        assert!(matches!(
            ac.estimator_states()[&EstimatorId::SLearner],
            EstimatorState::Failed { .. }
        ));
        assert!(!ac.best_score_per_estimator().contains_key(&EstimatorId::SLearner));
        assert!(ac.full_scores().contains_key(&EstimatorId::TLearner));
        assert_eq!(ac.best_estimator().unwrap(), EstimatorId::TLearner);
        let failed = ac.tune_history().iter().filter(|e| e.error.is_some()).count();
        assert_eq!(failed, 3);
    }

    #[test]
    fn all_failures_is_an_estimation_error() {
        let (frame, _) = synthetic(100, 8);
        let broken = EstimatorDescriptor {
            id: EstimatorId::SLearner,
            init_params: Config::from([("oops".to_string(), ParamValue::Int(1))]),
            search_space: SearchSpace::new(),
        };
        let mut ac = AutoCausality::new(quick_config(&["SLearner"]))
            .unwrap()
            .with_registry(Registry::new(false).with_descriptor(broken))
            .with_component_factory(fast_factory());
        assert_eq!(ac.fit(&frame, &roles()).unwrap_err().kind(), ErrorKind::Estimation);
        assert_eq!(ac.model().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn successful_trial_with_undefined_score_still_completes() {
        let (frame, _) = synthetic(200, 5);
        let frame = frame.with_column("y_factual", vec![1.0; 200]).unwrap();
        let mut config = quick_config(&["TLearner"]);
        config.metric = Metric::Qini;
        let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();

        assert_eq!(ac.estimator_states()[&EstimatorId::TLearner], EstimatorState::Completed);
        assert_eq!(ac.best_estimator().unwrap(), EstimatorId::TLearner);
        assert!(ac.best_score().unwrap().is_nan());
        assert!(ac.tune_history()[0].error.is_none());
    }

    #[test]
    fn global_best_comparison_handles_undefined_scores() {
        assert!(improves(0.2, f64::NAN));
        assert!(!improves(f64::NAN, 0.2));
        assert!(!improves(f64::NAN, f64::NAN));
        assert!(!improves(0.2, 0.2));
        assert!(improves(0.3, 0.2));
    }

    #[test]
    fn invalid_search_space_is_a_config_error_before_fitting() {
        let (frame, _) = synthetic(100, 2);
        let broken = EstimatorDescriptor {
            id: EstimatorId::SLearner,
            init_params: Config::new(),
            search_space: SearchSpace::new().with("pick", Domain::Choice { options: vec![] }),
        };
        let mut ac = AutoCausality::new(quick_config(&["SLearner"]))
            .unwrap()
            .with_registry(Registry::new(false).with_descriptor(broken))
            .with_component_factory(fast_factory());
        assert_eq!(ac.fit(&frame, &roles()).unwrap_err().kind(), ErrorKind::Config);
        assert!(ac.tune_history().is_empty());
    }

    #[test]
    fn verbose_lines_cover_selection_and_report_metrics() {
        let (frame, _) = synthetic(200, 3);
        let mut config = quick_config(&["TLearner"]);
        config.metrics_to_report = vec![Metric::Erupt, Metric::Qini, Metric::Auc];
        let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();

        let record = &ac.results().unwrap().records[&EstimatorId::TLearner];
        let lines = metric_lines(record, ac.config());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(&format!("{} (train)", Metric::Erupt)));
        assert!(lines[1].starts_with(&format!("{} (train)", Metric::Qini)));
    }

    #[test]
    fn ties_go_to_the_first_estimator_searched() {
        // Both estimators produce a constant positive effect here, so the
        // treat-everyone policy and its ERUPT value are identical.
        let (frame, _) = synthetic(300, 4);
        for (order, expected) in [
            (["SLearner", "Dummy"], EstimatorId::SLearner),
            (["Dummy", "SLearner"], EstimatorId::Dummy),
        ] {
            let mut config = quick_config(&order);
            config.include_experimental = true;
            let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
            ac.fit(&frame, &roles()).unwrap();
            let scores = ac.best_score_per_estimator();
            assert_eq!(scores[&EstimatorId::SLearner], scores[&EstimatorId::Dummy]);
            assert_eq!(ac.best_estimator().unwrap(), expected);
        }
    }

    #[test]
    fn expired_budget_stops_new_batches() {
        let (frame, _) = synthetic(200, 6);
        let mut config = quick_config(&["LinearDML"]);
        config.num_samples = 5;
        config.time_budget = Some(1e-9);
        let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();
        assert_eq!(ac.tune_history().len(), 1);
        assert_eq!(ac.estimator_states()[&EstimatorId::LinearDml], EstimatorState::Completed);
    }

    #[test]
    fn test_size_subsamples_the_held_out_rows() {
        let (frame, _) = synthetic(250, 7);
        let mut config = quick_config(&["TLearner"]);
        config.test_size = Some(20);
        let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();
        assert_eq!(ac.results().unwrap().test.n_rows(), 20);
        assert_eq!(ac.results().unwrap().train.n_rows(), 200);

        let mut config = quick_config(&["TLearner"]);
        config.test_size = Some(500);
        let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();
        assert_eq!(ac.results().unwrap().test.n_rows(), 50);
    }

    #[test]
    fn accessors_before_fit_are_usage_errors() {
        let ac = AutoCausality::new(AutoCausalityConfig::default()).unwrap();
        assert_eq!(ac.active_estimator().unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(ac.best_config().unwrap_err().kind(), ErrorKind::Usage);
        let (frame, _) = synthetic(20, 1);
        assert_eq!(ac.effect(&frame).unwrap_err().kind(), ErrorKind::Usage);
        assert!(ac.best_score_per_estimator().is_empty());
    }

    #[test]
    fn snapshots_are_written_per_completed_estimator() {
        let dir = tempfile::tempdir().unwrap();
        let (frame, _) = synthetic(200, 9);
        let mut config = quick_config(&["TLearner", "TransformedOutcome"]);
        config.model_save_path = Some(dir.path().to_path_buf());
        let mut ac = AutoCausality::new(config).unwrap().with_component_factory(fast_factory());
        ac.fit(&frame, &roles()).unwrap();

        let paths = &ac.results().unwrap().snapshots;
        assert_eq!(paths.len(), 2);
        let snap = read_snapshot(&paths[0]).unwrap();
        assert_eq!(snap.estimator, EstimatorId::TLearner);
        let reloaded = snap.estimate.effect(&frame).unwrap();
        let original = ac
            .best_model_for_estimator(EstimatorId::TLearner)
            .unwrap()
            .effect(&frame)
            .unwrap();
        for (a, b) in reloaded.iter().zip(&original) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn concurrency_follows_resource_shares() {
        let mut config = AutoCausalityConfig::default();
        assert_eq!(trial_concurrency(&config, 8), 1);
        config.parallel_trials = true;
        assert_eq!(trial_concurrency(&config, 8), 8);
        config.available_gpus = 1.0;
        assert_eq!(trial_concurrency(&config, 8), 2);
        config.resources_per_trial.cpu = 16.0;
        assert_eq!(trial_concurrency(&config, 8), 1);
    }
}
