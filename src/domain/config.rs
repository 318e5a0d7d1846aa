//! Run configuration.
//!
//! `AutoCausalityConfig` is the full set of recognized options. It can be built
//! from defaults, loaded from a JSON file (missing fields take defaults), and
//! then overridden by CLI flags.

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{Metric, Split};
use crate::error::AppError;
use crate::registry::EstimatorRequest;

/// Outer search strategy for estimator hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchAlgorithm {
    /// Independent uniform sampling of the search space.
    Random,
    /// Tree-structured Parzen estimator.
    #[serde(alias = "bayesian")]
    #[value(alias = "bayesian")]
    Tpe,
}

/// Learning task of the outcome component models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ComponentTask {
    /// Squared-error regression (continuous outcomes).
    Regression,
    /// Probability regression for binary outcomes: predictions are clipped to `[0, 1]`.
    Classification,
}

/// Fractional compute resources requested by one trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResources {
    pub cpu: f64,
    pub gpu: f64,
}

impl Default for TrialResources {
    fn default() -> Self {
        Self { cpu: 1.0, gpu: 0.5 }
    }
}

/// Settings for component-model (nuisance) tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentSettings {
    pub task: ComponentTask,
    /// 0 = silent; higher values log each candidate evaluation.
    pub verbose: u8,
    /// Maximum prediction latency per row (seconds) a candidate may have.
    pub pred_time_limit: f64,
    /// Parallel candidate evaluations; `-1` uses every core.
    pub n_jobs: i32,
    /// Seconds per component tuning run.
    pub time_budget: f64,
    /// Hard cap on candidate evaluations per tuning run.
    pub max_iter: usize,
}

impl Default for ComponentSettings {
    fn default() -> Self {
        Self {
            task: ComponentTask::Regression,
            verbose: 0,
            pred_time_limit: 10.0 / 1e6,
            n_jobs: -1,
            time_budget: 20.0,
            max_iter: 24,
        }
    }
}

/// Full configuration of an AutoML run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCausalityConfig {
    /// Selection metric (maximized).
    pub metric: Metric,
    /// Additional metrics computed and reported per trial.
    pub metrics_to_report: Vec<Metric>,
    /// Search time budget per estimator in seconds; `None` means no limit.
    pub time_budget: Option<f64>,
    /// Maximum number of trials per estimator.
    pub num_samples: usize,
    /// 0..=3, higher means more messages.
    pub verbose: u8,
    pub search_algorithm: SearchAlgorithm,
    /// Evaluate trial batches in parallel.
    pub parallel_trials: bool,
    pub resources_per_trial: TrialResources,
    /// GPUs visible to the search. `0` means GPU shares do not limit concurrency.
    pub available_gpus: f64,
    pub estimator_list: EstimatorRequest,
    pub include_experimental: bool,
    /// Fraction of rows used for training.
    pub train_size: f64,
    /// Optional fixed size for the test set (subsampled from the held-out rows).
    pub test_size: Option<usize>,
    /// Use the prior-only propensity model instead of a tuned one.
    pub use_dummy_classifier: bool,
    /// Split whose scores feed selection and the flat trial record.
    pub selection_split: Split,
    pub components: ComponentSettings,
    /// Directory for per-estimator model snapshots.
    pub model_save_path: Option<PathBuf>,
    pub seed: u64,
}

impl Default for AutoCausalityConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Erupt,
            metrics_to_report: vec![Metric::Qini, Metric::Auc, Metric::Ate, Metric::RScore],
            time_budget: Some(60.0),
            num_samples: 10,
            verbose: 3,
            search_algorithm: SearchAlgorithm::Tpe,
            parallel_trials: false,
            resources_per_trial: TrialResources::default(),
            available_gpus: 0.0,
            estimator_list: EstimatorRequest::Auto,
            include_experimental: false,
            train_size: 0.8,
            test_size: None,
            use_dummy_classifier: true,
            selection_split: Split::Train,
            components: ComponentSettings::default(),
            model_save_path: None,
            seed: 42,
        }
    }
}

impl AutoCausalityConfig {
    /// Load a JSON configuration file; absent fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open config '{}': {e}", path.display())))?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| AppError::config(format!("Invalid config JSON '{}': {e}", path.display())))?;
        Ok(config)
    }

    /// Check option ranges. Called before any data is touched.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.train_size.is_finite() && self.train_size > 0.0 && self.train_size < 1.0) {
            return Err(AppError::config(format!(
                "train_size must be in (0, 1), got {}.",
                self.train_size
            )));
        }
        if let Some(budget) = self.time_budget {
            if !(budget.is_finite() && budget > 0.0) {
                return Err(AppError::config(format!("time_budget must be > 0 seconds, got {budget}.")));
            }
        }
        if self.num_samples == 0 {
            return Err(AppError::config("num_samples must be >= 1."));
        }
        if !(self.resources_per_trial.cpu.is_finite() && self.resources_per_trial.cpu > 0.0) {
            return Err(AppError::config("resources_per_trial.cpu must be > 0."));
        }
        if !(self.resources_per_trial.gpu.is_finite() && self.resources_per_trial.gpu >= 0.0) {
            return Err(AppError::config("resources_per_trial.gpu must be >= 0."));
        }
        if !(self.available_gpus.is_finite() && self.available_gpus >= 0.0) {
            return Err(AppError::config("available_gpus must be >= 0."));
        }
        if self.test_size == Some(0) {
            return Err(AppError::config("test_size must be >= 1 when set."));
        }
        let c = &self.components;
        if !(c.time_budget.is_finite() && c.time_budget > 0.0) {
            return Err(AppError::config("components.time_budget must be > 0 seconds."));
        }
        if !(c.pred_time_limit.is_finite() && c.pred_time_limit > 0.0) {
            return Err(AppError::config("components.pred_time_limit must be > 0 seconds."));
        }
        if c.max_iter == 0 {
            return Err(AppError::config("components.max_iter must be >= 1."));
        }
        if c.n_jobs == 0 || c.n_jobs < -1 {
            return Err(AppError::config("components.n_jobs must be -1 or >= 1."));
        }
        Ok(())
    }

    /// Component settings with the time budget capped by the overall budget.
    ///
    /// A component budget that is not smaller than the whole search budget is
    /// replaced with `floor(time_budget / 2) + 1`. With parallel trials, each
    /// component tuner gets at most the trial's CPU share of threads.
    pub fn effective_components(&self) -> ComponentSettings {
        let mut out = self.components.clone();
        if let Some(total) = self.time_budget {
            if out.time_budget >= total {
                out.time_budget = (total / 2.0).floor() + 1.0;
            }
        }
        if self.parallel_trials {
            let share = self.resources_per_trial.cpu.floor().clamp(1.0, i32::MAX as f64) as i32;
            if out.n_jobs < 1 || out.n_jobs > share {
                out.n_jobs = share;
            }
        }
        out
    }

    /// Selection metric followed by report metrics, without duplicates.
    pub fn tracked_metrics(&self) -> Vec<Metric> {
        let mut out = vec![self.metric];
        for m in &self.metrics_to_report {
            if !out.contains(m) {
                out.push(*m);
            }
        }
        out
    }
}
