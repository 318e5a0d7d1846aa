//! Weighted least squares and ridge solvers.
//!
//! Every linear fit in the crate reduces to:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2 + α Σ_j β_j^2
//! ```
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` and solve an ordinary least squares problem.
//! - Ridge is expressed as extra rows `sqrt(α) I` appended to the design, so one
//!   SVD path serves OLS and ridge alike.
//! - SVD handles tall and rank-deficient designs (nalgebra's `QR::solve` is
//!   intended for square systems and panics for non-square matrices).

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.ncols() == 0 {
        return Some(DVector::zeros(0));
    }
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Weighted ridge regression without intercept handling.
///
/// `penalize[j] == false` leaves column `j` unpenalized (used for intercept columns).
pub fn solve_weighted_ridge(
    x: &DMatrix<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    alpha: f64,
    penalize: &[bool],
) -> Option<DVector<f64>> {
    let n = x.nrows();
    let p = x.ncols();
    let n_pen = if alpha > 0.0 { penalize.iter().filter(|b| **b).count() } else { 0 };

    let mut xa = DMatrix::<f64>::zeros(n + n_pen, p);
    let mut ya = DVector::<f64>::zeros(n + n_pen);
    for i in 0..n {
        let sw = weights.map(|w| w[i].max(0.0).sqrt()).unwrap_or(1.0);
        for j in 0..p {
            xa[(i, j)] = x[(i, j)] * sw;
        }
        ya[i] = y[i] * sw;
    }
    if n_pen > 0 {
        let s = alpha.sqrt();
        let mut r = n;
        for (j, &pen) in penalize.iter().enumerate() {
            if pen {
                xa[(r, j)] = s;
                r += 1;
            }
        }
    }

    solve_least_squares(&xa, &ya)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn ridge_shrinks_penalized_columns_only() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = [1.0, 3.0, 5.0, 7.0];
        let ols = solve_weighted_ridge(&x, &y, None, 0.0, &[false, true]).unwrap();
        let ridge = solve_weighted_ridge(&x, &y, None, 10.0, &[false, true]).unwrap();
        assert!((ols[1] - 2.0).abs() < 1e-9);
        assert!(ridge[1] < ols[1]);
        assert!(ridge[1] > 0.0);
    }

    #[test]
    fn zero_weights_ignore_rows() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]);
        let y = [1.0, 1.0, 100.0];
        let beta = solve_weighted_ridge(&x, &y, Some(&[1.0, 1.0, 0.0]), 0.0, &[false]).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-9);
    }
}
