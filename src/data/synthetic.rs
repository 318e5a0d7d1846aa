//! Synthetic observational datasets with a known heterogeneous effect.
//!
//! The generator follows the usual semi-synthetic benchmark layout:
//! covariates `x1..xk`, a confounded binary `treatment`, the observed
//! `y_factual`, the unobserved `y_cfactual`, and the ground-truth
//! `true_effect` per row. Half of the covariates are Gaussian, the other half
//! Bernoulli(0.5), so preprocessing and tree models see both kinds.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Normal};

use crate::data::Frame;
use crate::error::AppError;

/// Knobs for [`generate_dataset`].
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub rows: usize,
    pub covariates: usize,
    /// Scale of the treatment effect heterogeneity.
    pub effect_scale: f64,
    /// Standard deviation of the outcome noise.
    pub noise: f64,
    /// Strength of confounding through the propensity logit.
    pub confounding: f64,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            rows: 1000,
            covariates: 6,
            effect_scale: 1.0,
            noise: 1.0,
            confounding: 0.8,
            seed: 42,
        }
    }
}

/// Names of the covariate columns the generator produces.
pub fn covariate_names(k: usize) -> Vec<String> {
    (1..=k).map(|i| format!("x{i}")).collect()
}

/// Ground-truth CATE used by the generator.
///
/// Positive for `x1 > -0.5`, negative below, so a correct policy treats only part
/// of the population.
pub fn true_cate(x1: f64, x2: f64, scale: f64) -> f64 {
    scale * (1.0 + 2.0 * x1 + 0.5 * x2)
}

/// Generate a synthetic dataset.
pub fn generate_dataset(config: &SynthConfig) -> Result<Frame, AppError> {
    if config.rows < 4 {
        return Err(AppError::config("Synthetic dataset needs at least 4 rows."));
    }
    if config.covariates < 2 {
        return Err(AppError::config("Synthetic dataset needs at least 2 covariates."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::config("Noise level must be finite and >= 0."));
    }
    if !(config.effect_scale.is_finite() && config.confounding.is_finite()) {
        return Err(AppError::config("Effect scale and confounding must be finite."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let gauss = Normal::new(0.0, 1.0).map_err(|e| AppError::config(format!("Covariate distribution error: {e}")))?;
    let noise = Normal::new(0.0, config.noise.max(1e-12))
        .map_err(|e| AppError::config(format!("Noise distribution error: {e}")))?;
    let coin = Bernoulli::new(0.5).map_err(|e| AppError::config(format!("Covariate distribution error: {e}")))?;

    let n = config.rows;
    let k = config.covariates;
    let mut xs: Vec<Vec<f64>> = vec![Vec::with_capacity(n); k];
    let mut treatment = Vec::with_capacity(n);
    let mut y_factual = Vec::with_capacity(n);
    let mut y_cfactual = Vec::with_capacity(n);
    let mut effect = Vec::with_capacity(n);

    for _ in 0..n {
        let row: Vec<f64> = (0..k)
            .map(|j| {
                if j % 2 == 0 {
                    gauss.sample(&mut rng)
                } else if coin.sample(&mut rng) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();

        // Confounding: x1 drives both treatment uptake and the baseline outcome.
        let logit = config.confounding * (row[0] - 0.5 * row[1]);
        let p = 1.0 / (1.0 + (-logit).exp());
        let t = if rng.gen_bool(p.clamp(0.02, 0.98)) { 1.0 } else { 0.0 };

        let baseline: f64 = 0.5 + row.iter().enumerate().map(|(j, v)| v / (j as f64 + 1.0)).sum::<f64>();
        let tau = true_cate(row[0], row[1], config.effect_scale);
        let eps = if config.noise > 0.0 { noise.sample(&mut rng) } else { 0.0 };

        let y0 = baseline + eps;
        let y1 = y0 + tau;
        let (yf, ycf) = if t == 1.0 { (y1, y0) } else { (y0, y1) };

        for (j, v) in row.into_iter().enumerate() {
            xs[j].push(v);
        }
        treatment.push(t);
        y_factual.push(yf);
        y_cfactual.push(ycf);
        effect.push(tau);
    }

    let mut columns = vec![
        ("treatment".to_string(), treatment),
        ("y_factual".to_string(), y_factual),
        ("y_cfactual".to_string(), y_cfactual),
        ("true_effect".to_string(), effect),
    ];
    for (name, values) in covariate_names(k).into_iter().zip(xs) {
        columns.push((name, values));
    }
    Frame::new(columns)
}
