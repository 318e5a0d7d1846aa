//! Shared fit workflow:
//! load data -> assign column roles -> search estimators.
//!
//! The CLI only handles presentation and exports on top of this.

use tracing::info;

use crate::cli::{DataSource, FitArgs};
use crate::data::{generate_dataset, preprocess_dataset, Frame, SynthConfig};
use crate::domain::{AutoCausalityConfig, CausalRoles};
use crate::error::AppError;
use crate::fit::AutoCausality;
use crate::io::load_csv;

/// Columns a synthetic dataset carries that must never be used as features.
const ORACLE_COLUMNS: [&str; 2] = ["y_cfactual", "true_effect"];

/// Prepared input of a run.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub frame: Frame,
    pub roles: CausalRoles,
    pub rows_dropped: usize,
}

/// Everything `autocausal fit` computed.
pub struct RunOutput {
    pub input: PreparedInput,
    pub search: AutoCausality,
    /// Mean absolute error against `true_effect`, when the data has it.
    pub oracle_mae: Option<f64>,
}

pub fn load_frame(source: &DataSource, seed: u64) -> Result<Frame, AppError> {
    match (&source.data, source.synthetic) {
        (Some(path), _) => Ok(load_csv(path)?.frame),
        (None, Some(rows)) => generate_dataset(&SynthConfig {
            rows,
            seed,
            ..SynthConfig::default()
        }),
        (None, None) => Err(AppError::config("Pass --data or --synthetic.")),
    }
}

/// Decide column roles and drop rows with missing values in used columns.
pub fn prepare_input(frame: &Frame, args: &FitArgs, seed: u64) -> Result<PreparedInput, AppError> {
    let mut excluded: Vec<String> = vec![args.outcome.clone()];
    excluded.extend(args.ignore.iter().cloned());
    excluded.extend(
        ORACLE_COLUMNS
            .iter()
            .filter(|c| frame.has_column(c))
            .map(|c| c.to_string()),
    );

    if args.common_causes.is_empty() && args.effect_modifiers.is_empty() {
        let prepared = preprocess_dataset(frame, &args.treatment, &excluded, seed)?;
        return Ok(PreparedInput {
            roles: CausalRoles::new(
                args.treatment.clone(),
                args.outcome.clone(),
                prepared.features_w,
                prepared.features_x,
            ),
            frame: prepared.frame,
            rows_dropped: prepared.rows_dropped,
        });
    }

    let roles = CausalRoles::new(
        args.treatment.clone(),
        args.outcome.clone(),
        args.common_causes.clone(),
        args.effect_modifiers.clone(),
    );
    let mut used: Vec<String> = vec![roles.treatment.clone(), roles.outcome.clone()];
    used.extend(roles.nuisance_features());
    let columns: Vec<&[f64]> = used.iter().map(|n| frame.column(n)).collect::<Result<_, _>>()?;
    let keep: Vec<usize> = (0..frame.n_rows())
        .filter(|&r| columns.iter().all(|c| c[r].is_finite()))
        .collect();
    Ok(PreparedInput {
        rows_dropped: frame.n_rows() - keep.len(),
        frame: frame.take(&keep),
        roles,
    })
}

pub fn run_fit(config: AutoCausalityConfig, input: PreparedInput) -> Result<RunOutput, AppError> {
    if input.rows_dropped > 0 {
        info!(rows_dropped = input.rows_dropped, "dropped rows with missing values");
    }
    let mut search = AutoCausality::new(config)?;
    search.fit(&input.frame, &input.roles)?;

    let oracle_mae = match input.frame.column("true_effect") {
        Ok(truth) => {
            let cate = search.effect(&input.frame)?;
            Some(truth.iter().zip(&cate).map(|(t, c)| (t - c).abs()).sum::<f64>() / cate.len().max(1) as f64)
        }
        Err(_) => None,
    };

    Ok(RunOutput {
        input,
        search,
        oracle_mae,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn fit_args(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["autocausal", "fit", "--synthetic", "120"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Fit(args) => args,
            _ => panic!("expected fit"),
        }
    }

    #[test]
    fn default_roles_exclude_oracle_columns() {
        let args = fit_args(&[]);
        let frame = load_frame(&args.source, 3).unwrap();
        let input = prepare_input(&frame, &args, 3).unwrap();
        assert!(!input.roles.effect_modifiers.iter().any(|c| ORACLE_COLUMNS.contains(&c.as_str())));
        assert!(!input.roles.effect_modifiers.contains(&"y_factual".to_string()));
        assert_eq!(input.roles.common_causes, vec![crate::data::RANDOM_COLUMN]);
    }

    #[test]
    fn explicit_roles_are_kept() {
        let args = fit_args(&["--effect-modifiers", "x1,x2", "--common-causes", "x3"]);
        let frame = load_frame(&args.source, 3).unwrap();
        let input = prepare_input(&frame, &args, 3).unwrap();
        assert_eq!(input.roles.effect_modifiers, vec!["x1", "x2"]);
        assert_eq!(input.rows_dropped, 0);
        assert_eq!(input.frame.n_rows(), 120);
    }

    #[test]
    fn unknown_role_column_is_an_error() {
        let args = fit_args(&["--effect-modifiers", "nope"]);
        let frame = load_frame(&args.source, 3).unwrap();
        assert!(prepare_input(&frame, &args, 3).is_err());
    }
}
