//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main:
//! - parses CLI arguments and sets up logging
//! - builds the run configuration (JSON file, then flags)
//! - runs the estimator search
//! - prints reports and writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, EstimatorsArgs, FitArgs, SynthArgs};
use crate::data::{generate_dataset, SynthConfig};
use crate::domain::AutoCausalityConfig;
use crate::error::AppError;
use crate::registry::{resolve, EstimatorRequest, Registry};

pub mod pipeline;

/// Entry point for the `autocausal` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Estimators(args) => handle_estimators(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Ignore a second initialisation.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let frame = pipeline::load_frame(&args.source, config.seed)?;
    let input = pipeline::prepare_input(&frame, &args, config.seed)?;
    let run = pipeline::run_fit(config, input)?;
    let search = &run.search;

    println!("{}", crate::report::format_run_summary(search));
    println!(
        "{}",
        crate::report::format_leaderboard(&crate::report::leaderboard(search)?, search.config().metric)
    );

    let mut scored: Vec<_> = search.full_scores().into_values().cloned().collect();
    if args.baseline {
        scored.push(crate::report::baseline_scores(search)?);
    }
    println!("{}", crate::report::format_scores(&scored));
    println!("{}", crate::report::format_group_ate(&crate::report::policy_group_ate(search)?));

    if let Ok(model) = search.model() {
        let id = model.estimator;
        if let Some(scores) = search.full_scores().get(&id) {
            println!("Effect drivers ({}):\n{}\n", id.short_name(), scores.train.interpretation);
        }
    }
    if let Some(mae) = run.oracle_mae {
        println!("Mean absolute error vs true_effect: {mae:.4}");
    }

    if let Some(path) = &args.export_history {
        crate::io::write_history_csv(path, search.tune_history())?;
    }
    if let Some(path) = &args.export_scores {
        crate::io::write_scores_json(path, search)?;
    }
    if let Some(path) = &args.export_policy {
        let id = search.active_estimator()?;
        if let Some(scores) = search.full_scores().get(&id) {
            crate::io::write_policy_csv(path, &scores.test.values)?;
        }
    }
    Ok(())
}

fn handle_estimators(args: EstimatorsArgs) -> Result<(), AppError> {
    let registry = Registry::new(args.include_experimental);
    let resolution = resolve(&registry, &EstimatorRequest::from_args(&args.patterns), args.rows)?;
    if let Some(w) = &resolution.warning {
        eprintln!("warning: {w}");
    }
    for id in resolution.estimators {
        let descriptor = registry.descriptor(id)?;
        let experimental = if id.is_experimental() { " (experimental)" } else { "" };
        println!("{}{experimental}", id.as_str());
        for (name, domain) in descriptor.search_space.iter() {
            println!("  {name}: {domain}");
        }
        for (name, value) in &descriptor.init_params {
            println!("  {name} = {value} (fixed)");
        }
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let frame = generate_dataset(&SynthConfig {
        rows: args.rows,
        covariates: args.covariates,
        effect_scale: args.effect_scale,
        noise: args.noise,
        confounding: args.confounding,
        seed: args.seed,
    })?;
    crate::io::write_frame_csv(&args.out, &frame)?;
    println!("Wrote {} rows to {}", frame.n_rows(), args.out.display());
    Ok(())
}

/// JSON configuration (if any) overridden by explicit flags.
pub fn fit_config_from_args(args: &FitArgs) -> Result<AutoCausalityConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => AutoCausalityConfig::from_json_file(path)?,
        None => AutoCausalityConfig::default(),
    };
    if !args.estimators.is_empty() {
        config.estimator_list = EstimatorRequest::from_args(&args.estimators);
    }
    if args.include_experimental {
        config.include_experimental = true;
    }
    if let Some(m) = args.metric {
        config.metric = m;
    }
    if let Some(s) = args.search_algorithm {
        config.search_algorithm = s;
    }
    if let Some(n) = args.num_samples {
        config.num_samples = n;
    }
    if let Some(b) = args.time_budget {
        config.time_budget = Some(b);
    }
    if args.no_time_budget {
        config.time_budget = None;
    }
    if args.parallel {
        config.parallel_trials = true;
    }
    if let Some(t) = args.train_size {
        config.train_size = t;
    }
    if let Some(t) = args.test_size {
        config.test_size = Some(t);
    }
    if let Some(s) = args.selection_split {
        config.selection_split = s;
    }
    if args.tune_propensity {
        config.use_dummy_classifier = false;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(dir) = &args.model_save_path {
        config.model_save_path = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Metric, SearchAlgorithm};

    fn fit_args(argv: &[&str]) -> FitArgs {
        let mut full = vec!["autocausal", "fit", "--synthetic", "50"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Fit(args) => args,
            _ => panic!("expected fit"),
        }
    }

    #[test]
    fn flags_override_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"metric": "auc", "num_samples": 7, "search_algorithm": "random"}"#).unwrap();
        let path_str = path.to_str().unwrap();
        let config = fit_config_from_args(&fit_args(&["--config", path_str, "--num-samples", "3"])).unwrap();
        assert_eq!(config.metric, Metric::Auc);
        assert_eq!(config.num_samples, 3);
        assert_eq!(config.search_algorithm, SearchAlgorithm::Random);
    }

    #[test]
    fn no_time_budget_clears_the_limit() {
        let config = fit_config_from_args(&fit_args(&["--no-time-budget", "--estimators", "all"])).unwrap();
        assert_eq!(config.time_budget, None);
        assert_eq!(config.estimator_list, EstimatorRequest::All);
    }

    #[test]
    fn invalid_train_size_is_a_config_error() {
        let err = fit_config_from_args(&fit_args(&["--train-size", "1.5"])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
