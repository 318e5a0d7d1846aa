//! L2-regularized logistic regression fitted by Newton / IRLS steps.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{sigmoid, solve_least_squares};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    intercept: f64,
    coef: Vec<f64>,
}

impl LogisticRegression {
    /// `c` is the inverse regularization strength (penalty `||β||² / 2c`).
    pub fn fit(x: &DMatrix<f64>, labels: &[f64], c: f64, max_iter: usize) -> Result<Self, AppError> {
        if x.nrows() != labels.len() {
            return Err(AppError::data(format!(
                "Logistic regression: {} feature rows but {} labels.",
                x.nrows(),
                labels.len()
            )));
        }
        if labels.iter().any(|v| *v != 0.0 && *v != 1.0) {
            return Err(AppError::data("Logistic regression: labels must be 0/1."));
        }
        let ones = labels.iter().filter(|v| **v == 1.0).count();
        if ones == 0 || ones == labels.len() {
            return Err(AppError::data("Logistic regression: both classes must be present."));
        }
        if !(c.is_finite() && c > 0.0) {
            return Err(AppError::config(format!("Logistic regression: C must be > 0, got {c}.")));
        }

        let n = x.nrows();
        let p = x.ncols() + 1;
        let z = DMatrix::from_fn(n, p, |r, col| if col == 0 { 1.0 } else { x[(r, col - 1)] });
        let lambda = 1.0 / c;
        let mut beta = DVector::<f64>::zeros(p);

        for _ in 0..max_iter.max(1) {
            let eta = &z * &beta;
            let prob: Vec<f64> = eta.iter().map(|v| sigmoid(*v)).collect();

            let mut grad = DVector::<f64>::zeros(p);
            let mut hess = DMatrix::<f64>::zeros(p, p);
            for i in 0..n {
                let resid = labels[i] - prob[i];
                let s = (prob[i] * (1.0 - prob[i])).max(1e-10);
                for a in 0..p {
                    grad[a] += z[(i, a)] * resid;
                    for b in a..p {
                        hess[(a, b)] += s * z[(i, a)] * z[(i, b)];
                    }
                }
            }
            for a in 0..p {
                for b in 0..a {
                    hess[(a, b)] = hess[(b, a)];
                }
                if a > 0 {
                    grad[a] -= lambda * beta[a];
                    hess[(a, a)] += lambda;
                }
                hess[(a, a)] += 1e-9;
            }

            let step = match hess.clone().cholesky() {
                Some(chol) => chol.solve(&grad),
                None => solve_least_squares(&hess, &grad)
                    .ok_or_else(|| AppError::estimation("Logistic regression: singular Hessian."))?,
            };
            beta += &step;
            if beta.iter().any(|v| !v.is_finite()) {
                return Err(AppError::estimation("Logistic regression: Newton iterations diverged."));
            }
            if step.amax() < 1e-8 {
                break;
            }
        }

        Ok(Self {
            intercept: beta[0],
            coef: beta.iter().skip(1).copied().collect(),
        })
    }

    pub fn coef(&self) -> &[f64] {
        &self.coef
    }

    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Vec<f64> {
        (0..x.nrows())
            .map(|r| {
                let eta = self.intercept + self.coef.iter().enumerate().map(|(j, b)| b * x[(r, j)]).sum::<f64>();
                sigmoid(eta)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_an_informative_feature() {
        let n = 200;
        let x = DMatrix::from_fn(n, 1, |r, _| (r as f64 - 100.0) / 25.0);
        // Noisy labels: mostly 1 for positive x.
        let labels: Vec<f64> = (0..n)
            .map(|r| {
                let v = x[(r, 0)];
                if (v > 0.0) ^ (r % 7 == 0) { 1.0 } else { 0.0 }
            })
            .collect();
        let model = LogisticRegression::fit(&x, &labels, 1.0, 50).unwrap();
        assert!(model.coef()[0] > 0.0);
        let p = model.predict_proba(&x);
        assert!(p[n - 1] > 0.5);
        assert!(p[0] < 0.5);
    }

    #[test]
    fn single_class_is_rejected() {
        let x = DMatrix::from_element(4, 1, 1.0);
        let err = LogisticRegression::fit(&x, &[1.0; 4], 1.0, 10).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }
}
