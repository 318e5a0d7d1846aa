//! Command-line parsing for the causal estimator search.
//!
//! Argument parsing and dispatch stay here; the search itself lives in `fit`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Metric, SearchAlgorithm, Split};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "autocausal", version, about = "AutoML over causal-effect (CATE) estimators")]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search estimators on a dataset and report the best one.
    Fit(FitArgs),
    /// List the estimators a request resolves to, with their search spaces.
    Estimators(EstimatorsArgs),
    /// Write a synthetic dataset with a known heterogeneous effect.
    Synth(SynthArgs),
}

/// Where the data comes from.
#[derive(Debug, Args, Clone)]
#[group(required = true, multiple = false)]
pub struct DataSource {
    /// CSV file with a header row.
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Generate a synthetic dataset with this many rows instead.
    #[arg(long, value_name = "ROWS")]
    pub synthetic: Option<usize>,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub source: DataSource,

    /// Binary (0/1) treatment column.
    #[arg(long, default_value = "treatment")]
    pub treatment: String,

    /// Outcome column.
    #[arg(long, default_value = "y_factual")]
    pub outcome: String,

    /// Confounders (W). With neither role list given, every other column is an
    /// effect modifier and a random placebo column is the sole confounder.
    #[arg(long = "common-causes", value_delimiter = ',')]
    pub common_causes: Vec<String>,

    /// Effect modifiers (X).
    #[arg(long = "effect-modifiers", value_delimiter = ',')]
    pub effect_modifiers: Vec<String>,

    /// Columns excluded from the features (e.g. counterfactual outcomes).
    #[arg(long, value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// JSON configuration file; flags below override it.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// `auto`, `all`, or substrings of estimator identifiers.
    #[arg(long, value_delimiter = ',')]
    pub estimators: Vec<String>,

    /// Include experimental estimators in the registry.
    #[arg(long)]
    pub include_experimental: bool,

    #[arg(long, value_enum)]
    pub metric: Option<Metric>,

    #[arg(long = "search", value_enum)]
    pub search_algorithm: Option<SearchAlgorithm>,

    /// Maximum trials per estimator.
    #[arg(long)]
    pub num_samples: Option<usize>,

    /// Seconds per estimator search.
    #[arg(long)]
    pub time_budget: Option<f64>,

    /// Remove the per-estimator time limit.
    #[arg(long, conflicts_with = "time_budget")]
    pub no_time_budget: bool,

    /// Evaluate trial batches in parallel.
    #[arg(long)]
    pub parallel: bool,

    #[arg(long)]
    pub train_size: Option<f64>,

    #[arg(long)]
    pub test_size: Option<usize>,

    /// Split whose scores drive selection.
    #[arg(long, value_enum)]
    pub selection_split: Option<Split>,

    /// Tune the propensity model instead of using the treatment prior.
    #[arg(long)]
    pub tune_propensity: bool,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory for per-estimator model snapshots.
    #[arg(long, value_name = "DIR")]
    pub model_save_path: Option<PathBuf>,

    /// Print scores of a random-effect baseline next to the estimators.
    #[arg(long)]
    pub baseline: bool,

    /// Write every evaluated trial to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_history: Option<PathBuf>,

    /// Write per-estimator scores and the best configuration to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_scores: Option<PathBuf>,

    /// Write the best estimator's per-row policy table (test split) to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_policy: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct EstimatorsArgs {
    /// `auto`, `all`, or substrings of estimator identifiers.
    pub patterns: Vec<String>,

    #[arg(long)]
    pub include_experimental: bool,

    /// Row count used for the large-data filter of `all`.
    #[arg(long, default_value_t = 0)]
    pub rows: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    #[arg(long, default_value_t = 1000)]
    pub rows: usize,

    #[arg(long, default_value_t = 6)]
    pub covariates: usize,

    #[arg(long, default_value_t = 1.0)]
    pub effect_scale: f64,

    #[arg(long, default_value_t = 1.0)]
    pub noise: f64,

    #[arg(long, default_value_t = 0.8)]
    pub confounding: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,
}
