//! One estimator × one configuration.
//!
//! A trial:
//! - merges the configuration over the estimator's fixed init params
//! - fits the estimator through [`CausalModel::estimate_effect`]
//! - computes per-unit effects on the train and test frames
//! - scores both splits and flattens the tracked metrics
//!
//! Errors are returned, not swallowed. [`TrialRunner::run_isolated`] runs the
//! trial on its own named thread and turns a panic into an estimation error.

use std::any::Any;
use std::collections::BTreeMap;
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::causal::{CausalEstimate, CausalModel, IdentifiedEstimand, MethodParams, TargetUnits};
use crate::data::Frame;
use crate::domain::{CausalRoles, Config, Metric, Split};
use crate::error::AppError;
use crate::models::ComponentFactory;
use crate::registry::{EstimatorDescriptor, EstimatorId};
use crate::scoring::{make_scores, RScoreWrapper, ReferenceScorer, ScoreSettings, SplitScores};

/// Everything a trial reads. Shared read-only across concurrent trials.
pub struct TrialContext<'a> {
    pub train: &'a Frame,
    pub test: &'a Frame,
    pub estimand: &'a IdentifiedEstimand,
    pub r_scorers: Option<&'a RScoreWrapper>,
    pub factory: &'a ComponentFactory,
    pub score_settings: ScoreSettings,
    pub metric: Metric,
    /// Selection metric first, then report metrics.
    pub tracked: Vec<Metric>,
    pub selection_split: Split,
}

/// Outcome of a successful trial. Owns the fitted estimate.
#[derive(Debug, Clone, Serialize)]
pub struct TrialRecord {
    pub estimator: EstimatorId,
    pub config: Config,
    /// Tracked metrics on the selection split.
    pub metrics: BTreeMap<String, f64>,
    pub scores: SplitScores,
    pub estimate: CausalEstimate,
    pub duration_secs: f64,
}

impl TrialRecord {
    pub fn score(&self, metric: Metric, split: Split) -> f64 {
        self.scores.for_split(split).get(metric)
    }
}

pub struct TrialRunner<'a> {
    ctx: &'a TrialContext<'a>,
    descriptor: &'a EstimatorDescriptor,
    roles: CausalRoles,
}

impl<'a> TrialRunner<'a> {
    pub fn new(ctx: &'a TrialContext<'a>, descriptor: &'a EstimatorDescriptor) -> Self {
        Self {
            ctx,
            descriptor,
            roles: ctx.estimand.roles(),
        }
    }

    pub fn estimator(&self) -> EstimatorId {
        self.descriptor.id
    }

    pub fn run_trial(&self, config: &Config) -> Result<TrialRecord, AppError> {
        let id = self.descriptor.id;
        let started = Instant::now();
        let ctx = self.ctx;

        let params = MethodParams {
            init_params: self.descriptor.init_params.clone(),
            fit_params: config.clone(),
        };
        let estimate = CausalModel::new(ctx.train, ctx.estimand, ctx.factory).estimate_effect(
            id,
            0.0,
            1.0,
            TargetUnits::Ate,
            &params,
        )?;

        let train_cate = match estimate.in_sample_cate() {
            Some(cate) => cate.to_vec(),
            None => estimate.effect(ctx.train)?,
        };
        let test_cate = estimate.effect(ctx.test)?;

        let reference =
            |split: Split| ctx.r_scorers.map(|w| w.for_split(split) as &dyn ReferenceScorer);
        let settings = &ctx.score_settings;
        let scores = SplitScores {
            estimator_name: id.as_str().to_string(),
            train: make_scores(
                &self.roles,
                ctx.train,
                &train_cate,
                reference(Split::Train),
                settings,
            )?,
            test: make_scores(&self.roles, ctx.test, &test_cate, reference(Split::Test), settings)?,
        };

        let selected = scores.for_split(ctx.selection_split);
        let metrics = ctx
            .tracked
            .iter()
            .map(|m| (m.name().to_string(), selected.get(*m)))
            .collect();

        let duration_secs = started.elapsed().as_secs_f64();
        debug!(
            estimator = id.short_name(),
            score = selected.get(ctx.metric),
            duration_secs,
            "trial finished"
        );
        Ok(TrialRecord {
            estimator: id,
            config: config.clone(),
            metrics,
            scores,
            estimate,
            duration_secs,
        })
    }

    /// Run the trial on a dedicated named thread.
    pub fn run_isolated(&self, config: &Config, trial: usize) -> Result<TrialRecord, AppError> {
        let name = format!("trial-{}-{trial}", self.descriptor.id.short_name());
        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(scope, || self.run_trial(config))
                .map_err(|e| AppError::estimation(format!("Failed to start {name}: {e}")))?;
            handle
                .join()
                .unwrap_or_else(|payload| {
                    let message = panic_message(&*payload);
                    Err(AppError::estimation(format!("{name} panicked: {message}")))
                })
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::estimators::testing::{fast_factory, synthetic};
    use crate::domain::ParamValue;

    fn context<'a>(
        train: &'a Frame,
        test: &'a Frame,
        estimand: &'a IdentifiedEstimand,
        factory: &'a ComponentFactory,
    ) -> TrialContext<'a> {
        TrialContext {
            train,
            test,
            estimand,
            r_scorers: None,
            factory,
            score_settings: ScoreSettings::default(),
            metric: Metric::Erupt,
            tracked: vec![Metric::Erupt, Metric::Qini, Metric::Ate],
            selection_split: Split::Train,
        }
    }

    #[test]
    fn trial_scores_both_splits() {
        let (frame, estimand) = synthetic(400, 2);
        let (train, test) = frame.train_test_split(0.8, 1).unwrap();
        let factory = fast_factory();
        let ctx = context(&train, &test, &estimand, &factory);
        let descriptor = EstimatorDescriptor::for_id(EstimatorId::TLearner);
        let record = TrialRunner::new(&ctx, &descriptor).run_trial(&Config::new()).unwrap();

        assert_eq!(record.scores.train.values.len(), train.n_rows());
        assert_eq!(record.scores.test.values.len(), test.n_rows());
        assert_eq!(record.scores.estimator_name, EstimatorId::TLearner.as_str());
        assert_eq!(record.metrics.len(), 3);
        assert_eq!(record.metrics["erupt"], record.score(Metric::Erupt, Split::Train));
        assert_eq!(record.scores.train.r_score, 0.0);
    }

    #[test]
    fn estimator_without_in_sample_effects_scores_train_via_effect() {
        let (frame, estimand) = synthetic(300, 4);
        let (train, test) = frame.train_test_split(0.8, 1).unwrap();
        let factory = fast_factory();
        let ctx = context(&train, &test, &estimand, &factory);
        let descriptor = EstimatorDescriptor::for_id(EstimatorId::DrOrthoForest);
        let mut config = Config::new();
        config.insert("n_trees".into(), ParamValue::Int(3));
        let record = TrialRunner::new(&ctx, &descriptor).run_isolated(&config, 0).unwrap();
        assert!(record.estimate.in_sample_cate().is_none());
        assert_eq!(record.scores.train.values.len(), train.n_rows());
    }

    #[test]
    fn unknown_parameter_fails_the_trial() {
        let (frame, estimand) = synthetic(100, 2);
        let (train, test) = frame.train_test_split(0.8, 1).unwrap();
        let factory = fast_factory();
        let ctx = context(&train, &test, &estimand, &factory);
        let descriptor = EstimatorDescriptor::for_id(EstimatorId::SLearner);
        let mut config = Config::new();
        config.insert("bogus".into(), ParamValue::Int(1));
        assert!(TrialRunner::new(&ctx, &descriptor).run_isolated(&config, 1).is_err());
    }

    #[test]
    fn panics_become_estimation_errors() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
    }
}
