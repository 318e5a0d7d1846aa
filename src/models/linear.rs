//! Linear regressors: ridge (closed form through the SVD solver) and lasso
//! (cyclic coordinate descent).
//!
//! Objectives, with weights `w` rescaled to sum to `n`:
//!
//! ```text
//! ridge:  Σ w_i (y_i - b0 - x_i^T β)^2 + α ||β||²
//! lasso:  (1 / 2n) Σ w_i (y_i - b0 - x_i^T β)^2 + α ||β||₁
//! ```
//!
//! The intercept is never penalized.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::solve_weighted_ridge;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    intercept: f64,
    coef: Vec<f64>,
}

impl LinearModel {
    pub fn fit_ridge(x: &DMatrix<f64>, y: &[f64], weights: Option<&[f64]>, alpha: f64) -> Result<Self, AppError> {
        check_inputs(x, y, weights, alpha, "Ridge")?;
        let n = x.nrows();
        let p = x.ncols();
        let design = DMatrix::from_fn(n, p + 1, |r, c| if c == 0 { 1.0 } else { x[(r, c - 1)] });
        let mut penalize = vec![true; p + 1];
        penalize[0] = false;

        let beta = solve_weighted_ridge(&design, y, weights, alpha, &penalize)
            .ok_or_else(|| AppError::estimation("Ridge: least squares system is ill-conditioned."))?;
        Ok(Self {
            intercept: beta[0],
            coef: beta.iter().skip(1).copied().collect(),
        })
    }

    pub fn fit_lasso(
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        alpha: f64,
        max_iter: usize,
    ) -> Result<Self, AppError> {
        check_inputs(x, y, weights, alpha, "Lasso")?;
        let n = x.nrows();
        let p = x.ncols();
        let w = normalized_weights(weights, n);

        // Center with weighted means so the intercept drops out of the descent.
        let y_mean = weighted_avg(y.iter().copied(), &w);
        let x_means: Vec<f64> = (0..p).map(|j| weighted_avg((0..n).map(|i| x[(i, j)]), &w)).collect();
        let xc = DMatrix::from_fn(n, p, |r, c| x[(r, c)] - x_means[c]);
        let yc: Vec<f64> = y.iter().map(|v| v - y_mean).collect();

        let coef = lasso_coordinate_descent(&xc, &yc, Some(&w), alpha, &vec![true; p], max_iter, 1e-6);
        let intercept = y_mean - coef.iter().zip(&x_means).map(|(b, m)| b * m).sum::<f64>();
        if !intercept.is_finite() || coef.iter().any(|b| !b.is_finite()) {
            return Err(AppError::estimation("Lasso: coordinate descent diverged."));
        }
        Ok(Self { intercept, coef })
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coef(&self) -> &[f64] {
        &self.coef
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Vec<f64> {
        (0..x.nrows())
            .map(|r| self.intercept + self.coef.iter().enumerate().map(|(j, b)| b * x[(r, j)]).sum::<f64>())
            .collect()
    }
}

/// Coordinate descent for `(1 / 2n) Σ w_i (y_i - x_i^T β)^2 + α Σ_{penalized j} |β_j|`.
///
/// No intercept; callers center or add an unpenalized constant column.
pub fn lasso_coordinate_descent(
    x: &DMatrix<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    alpha: f64,
    penalize: &[bool],
    max_iter: usize,
    tol: f64,
) -> Vec<f64> {
    let n = x.nrows();
    let p = x.ncols();
    let nf = n.max(1) as f64;
    let w = normalized_weights(weights, n);

    let z: Vec<f64> = (0..p)
        .map(|j| (0..n).map(|i| w[i] * x[(i, j)] * x[(i, j)]).sum::<f64>() / nf)
        .collect();
    let mut beta = vec![0.0; p];
    let mut resid: Vec<f64> = y.to_vec();

    for _ in 0..max_iter.max(1) {
        let mut max_delta = 0.0_f64;
        for j in 0..p {
            if z[j] <= 0.0 {
                continue;
            }
            let rho = (0..n).map(|i| w[i] * x[(i, j)] * (resid[i] + x[(i, j)] * beta[j])).sum::<f64>() / nf;
            let new = if penalize.get(j).copied().unwrap_or(true) {
                soft_threshold(rho, alpha) / z[j]
            } else {
                rho / z[j]
            };
            let delta = new - beta[j];
            if delta != 0.0 {
                for i in 0..n {
                    resid[i] -= delta * x[(i, j)];
                }
                beta[j] = new;
            }
            max_delta = max_delta.max(delta.abs());
        }
        if max_delta < tol {
            break;
        }
    }
    beta
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    if v > t {
        v - t
    } else if v < -t {
        v + t
    } else {
        0.0
    }
}

fn normalized_weights(weights: Option<&[f64]>, n: usize) -> Vec<f64> {
    match weights {
        None => vec![1.0; n],
        Some(w) => {
            let total: f64 = w.iter().sum();
            if total > 0.0 {
                w.iter().map(|v| v * n as f64 / total).collect()
            } else {
                vec![1.0; n]
            }
        }
    }
}

fn weighted_avg(values: impl Iterator<Item = f64>, w: &[f64]) -> f64 {
    let (s, sw) = values.zip(w).fold((0.0, 0.0), |(s, sw), (v, w)| (s + v * w, sw + w));
    if sw > 0.0 { s / sw } else { 0.0 }
}

fn check_inputs(
    x: &DMatrix<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    alpha: f64,
    name: &str,
) -> Result<(), AppError> {
    if x.nrows() != y.len() {
        return Err(AppError::data(format!(
            "{name}: {} feature rows but {} targets.",
            x.nrows(),
            y.len()
        )));
    }
    if y.is_empty() {
        return Err(AppError::data(format!("{name}: no rows to fit.")));
    }
    if y.iter().any(|v| !v.is_finite()) || x.iter().any(|v| !v.is_finite()) {
        return Err(AppError::data(format!("{name}: non-finite inputs.")));
    }
    if let Some(w) = weights {
        if w.len() != y.len() || w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(AppError::data(format!("{name}: weights must be finite, non-negative, one per row.")));
        }
    }
    if !(alpha.is_finite() && alpha >= 0.0) {
        return Err(AppError::config(format!("{name}: alpha must be >= 0, got {alpha}.")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> (DMatrix<f64>, Vec<f64>) {
        let x = DMatrix::from_fn(n, 2, |r, c| if c == 0 { r as f64 } else { ((r * 7) % 5) as f64 });
        let y: Vec<f64> = (0..n).map(|r| 1.0 + 2.0 * x[(r, 0)] - 0.5 * x[(r, 1)]).collect();
        (x, y)
    }

    #[test]
    fn ridge_without_penalty_recovers_coefficients() {
        let (x, y) = line(20);
        let m = LinearModel::fit_ridge(&x, &y, None, 0.0).unwrap();
        assert!((m.intercept() - 1.0).abs() < 1e-8);
        assert!((m.coef()[0] - 2.0).abs() < 1e-8);
        assert!((m.coef()[1] + 0.5).abs() < 1e-8);
    }

    #[test]
    fn lasso_with_tiny_alpha_is_close_to_ols() {
        let (x, y) = line(30);
        let m = LinearModel::fit_lasso(&x, &y, None, 1e-6, 5000).unwrap();
        assert!((m.coef()[0] - 2.0).abs() < 1e-2);
        let pred = m.predict(&x);
        assert!((pred[10] - y[10]).abs() < 0.1);
    }

    #[test]
    fn large_lasso_alpha_zeroes_coefficients() {
        let (x, y) = line(30);
        let m = LinearModel::fit_lasso(&x, &y, None, 1e6, 100).unwrap();
        assert!(m.coef().iter().all(|b| *b == 0.0));
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((m.intercept() - mean).abs() < 1e-9);
    }

    #[test]
    fn unpenalized_columns_escape_shrinkage() {
        let x = DMatrix::from_fn(10, 1, |_, _| 1.0);
        let y = vec![3.0; 10];
        let beta = lasso_coordinate_descent(&x, &y, None, 100.0, &[false], 100, 1e-10);
        assert!((beta[0] - 3.0).abs() < 1e-9);
    }
}
