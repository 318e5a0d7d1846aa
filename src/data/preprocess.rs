//! Turning a raw numeric frame into a causal-ready one.
//!
//! - rows with any non-finite value are dropped
//! - the treatment must be binary `{0, 1}`
//! - every column that is neither treatment nor a target becomes an effect
//!   modifier (`X`)
//! - a Bernoulli(0.5) `random` column is added as the sole common cause (`W`),
//!   so nuisance models always see at least one confounder slot

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::data::Frame;
use crate::error::AppError;

/// Name of the placebo confounder column added by [`preprocess_dataset`].
pub const RANDOM_COLUMN: &str = "random";

/// Output of [`preprocess_dataset`].
#[derive(Debug, Clone)]
pub struct Prepared {
    pub frame: Frame,
    pub features_x: Vec<String>,
    pub features_w: Vec<String>,
    pub rows_dropped: usize,
}

/// Check that a treatment column only contains 0 and 1.
pub fn ensure_binary_treatment(values: &[f64], name: &str) -> Result<(), AppError> {
    if let Some(bad) = values.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(AppError::config(format!(
            "Treatment column '{name}' must be binary 0/1, found value {bad}."
        )));
    }
    Ok(())
}

pub fn preprocess_dataset(
    frame: &Frame,
    treatment: &str,
    targets: &[String],
    seed: u64,
) -> Result<Prepared, AppError> {
    if !frame.has_column(treatment) {
        return Err(AppError::config(format!("Treatment column '{treatment}' not found.")));
    }
    for target in targets {
        if !frame.has_column(target) {
            return Err(AppError::config(format!("Target column '{target}' not found.")));
        }
    }

    let names = frame.column_names().to_vec();
    let columns: Vec<&[f64]> = names.iter().map(|n| frame.column(n)).collect::<Result<_, _>>()?;
    let keep: Vec<usize> = (0..frame.n_rows())
        .filter(|&r| columns.iter().all(|c| c[r].is_finite()))
        .collect();
    let rows_dropped = frame.n_rows() - keep.len();
    let clean = frame.take(&keep);

    ensure_binary_treatment(clean.column(treatment)?, treatment)?;

    let features_x: Vec<String> = names
        .iter()
        .filter(|n| n.as_str() != treatment && !targets.contains(n) && n.as_str() != RANDOM_COLUMN)
        .cloned()
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let random: Vec<f64> = (0..clean.n_rows())
        .map(|_| if rng.gen_bool(0.5) { 1.0 } else { 0.0 })
        .collect();
    let clean = clean.with_column(RANDOM_COLUMN, random)?;

    Ok(Prepared {
        frame: clean,
        features_x,
        features_w: vec![RANDOM_COLUMN.to_string()],
        rows_dropped,
    })
}
