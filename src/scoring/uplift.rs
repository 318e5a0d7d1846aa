//! Cumulative uplift curves and their summary scores.
//!
//! Rows are ranked by predicted effect (descending, stable on ties). For the
//! top `k` rows:
//!
//! ```text
//! lift_k = mean(y | treated, top k) - mean(y | control, top k)
//! gain_k = k · lift_k
//! qini_k = Σ y·t - Σ y·(1-t) · n_t / n_c
//! ```
//!
//! Each curve starts with a zero point. Points where an arm is still empty
//! are undefined: interior gaps are linearly interpolated and a trailing gap
//! repeats the last defined value. The random baseline averages the curves of
//! seeded random orderings. Curves are normalized by the absolute value of
//! their last point, which is the same for every ordering.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AppError;

pub const RANDOM_ORDERINGS: usize = 10;
pub const RANDOM_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq)]
pub struct UpliftCurves {
    pub model_gain: Vec<f64>,
    pub random_gain: Vec<f64>,
    pub model_qini: Vec<f64>,
    pub random_qini: Vec<f64>,
}

impl UpliftCurves {
    pub fn compute(outcome: &[f64], treatment: &[f64], score: &[f64], n_random: usize, seed: u64) -> Result<Self, AppError> {
        let n = outcome.len();
        if treatment.len() != n || score.len() != n {
            return Err(AppError::data(format!(
                "Uplift curves: {n} outcomes, {} treatments, {} scores.",
                treatment.len(),
                score.len()
            )));
        }
        if score.iter().any(|v| v.is_nan()) {
            return Err(AppError::data("Uplift curves: predicted effects contain NaN."));
        }

        let (model_gain, model_qini) = curves_for_order(outcome, treatment, &order_by(score));

        let mut rng = StdRng::seed_from_u64(seed);
        let k = n_random.max(1);
        let mut random_gain = vec![0.0; n + 1];
        let mut random_qini = vec![0.0; n + 1];
        for _ in 0..k {
            let noise: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
            let (g, q) = curves_for_order(outcome, treatment, &order_by(&noise));
            for i in 0..=n {
                random_gain[i] += g[i] / k as f64;
                random_qini[i] += q[i] / k as f64;
            }
        }

        let gain_norm = model_gain.last().copied().unwrap_or(0.0).abs();
        let qini_norm = model_qini.last().copied().unwrap_or(0.0).abs();
        let scale = |v: Vec<f64>, norm: f64| v.into_iter().map(|x| x / norm).collect::<Vec<f64>>();

        Ok(Self {
            model_gain: scale(model_gain, gain_norm),
            random_gain: scale(random_gain, gain_norm),
            model_qini: scale(model_qini, qini_norm),
            random_qini: scale(random_qini, qini_norm),
        })
    }

    /// Area under the normalized model gain curve (mean over its points).
    pub fn auc(&self) -> f64 {
        self.model_gain.iter().sum::<f64>() / self.model_gain.len() as f64
    }

    /// Normalized area between the model and random Qini curves.
    pub fn qini(&self) -> f64 {
        let model: f64 = self.model_qini.iter().sum();
        let random: f64 = self.random_qini.iter().sum();
        (model - random) / self.model_qini.len() as f64
    }
}

pub fn auuc_score(outcome: &[f64], treatment: &[f64], score: &[f64]) -> Result<f64, AppError> {
    Ok(UpliftCurves::compute(outcome, treatment, score, RANDOM_ORDERINGS, RANDOM_SEED)?.auc())
}

pub fn qini_score(outcome: &[f64], treatment: &[f64], score: &[f64]) -> Result<f64, AppError> {
    Ok(UpliftCurves::compute(outcome, treatment, score, RANDOM_ORDERINGS, RANDOM_SEED)?.qini())
}

fn order_by(score: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..score.len()).collect();
    idx.sort_by(|&a, &b| score[b].partial_cmp(&score[a]).unwrap_or(std::cmp::Ordering::Equal));
    idx
}

/// `(gain, qini)` curves, each with `n + 1` points.
fn curves_for_order(outcome: &[f64], treatment: &[f64], order: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let n = order.len();
    let mut lift = vec![f64::NAN; n + 1];
    let mut qini = vec![f64::NAN; n + 1];
    lift[0] = 0.0;
    qini[0] = 0.0;

    let (mut nt, mut nc, mut syt, mut syc) = (0.0, 0.0, 0.0, 0.0);
    for (k, &r) in order.iter().enumerate() {
        if treatment[r] == 1.0 {
            nt += 1.0;
            syt += outcome[r];
        } else {
            nc += 1.0;
            syc += outcome[r];
        }
        if nt > 0.0 && nc > 0.0 {
            lift[k + 1] = syt / nt - syc / nc;
        }
        if nc > 0.0 {
            qini[k + 1] = syt - syc * nt / nc;
        }
    }

    fill_gaps(&mut lift);
    fill_gaps(&mut qini);
    let gain = lift.iter().enumerate().map(|(k, l)| l * k as f64).collect();
    (gain, qini)
}

/// Linear interpolation of interior NaN runs; trailing NaNs take the last value.
fn fill_gaps(values: &mut [f64]) {
    let mut last: Option<usize> = None;
    for i in 0..values.len() {
        if values[i].is_nan() {
            continue;
        }
        if let Some(j) = last {
            if i > j + 1 {
                let (a, b) = (values[j], values[i]);
                for k in j + 1..i {
                    values[k] = a + (b - a) * (k - j) as f64 / (i - j) as f64;
                }
            }
        }
        last = Some(i);
    }
    if let Some(j) = last {
        let v = values[j];
        for x in values.iter_mut().skip(j + 1) {
            *x = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_gaps_interpolates_and_forward_fills() {
        let mut v = [0.0, f64::NAN, f64::NAN, 3.0, f64::NAN];
        fill_gaps(&mut v);
        assert_eq!(v, [0.0, 1.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn perfect_ranking_beats_random() {
        // Treated responders ranked first.
        let n = 200;
        let t: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let tau: Vec<f64> = (0..n).map(|i| if i < n / 2 { 2.0 } else { 0.0 }).collect();
        let y: Vec<f64> = (0..n).map(|i| t[i] * tau[i]).collect();
        let q = qini_score(&y, &t, &tau).unwrap();
        let reversed: Vec<f64> = tau.iter().map(|v| -v).collect();
        let q_rev = qini_score(&y, &t, &reversed).unwrap();
        assert!(q > 0.0);
        assert!(q > q_rev);
        assert!(auuc_score(&y, &t, &tau).unwrap() > auuc_score(&y, &t, &reversed).unwrap());
    }

    #[test]
    fn constant_outcome_gives_nan_scores() {
        let t = [1.0, 0.0, 1.0, 0.0];
        let y = [1.0; 4];
        let score = [0.4, 0.3, 0.2, 0.1];
        assert!(auuc_score(&y, &t, &score).unwrap().is_nan());
        assert!(qini_score(&y, &t, &score).unwrap().is_nan());
    }

    #[test]
    fn curves_have_a_leading_zero_and_unit_endpoint() {
        let t = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let y = [3.0, 1.0, 2.0, 0.0, 1.0, 1.0];
        let s = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4];
        let c = UpliftCurves::compute(&y, &t, &s, 3, 1).unwrap();
        assert_eq!(c.model_gain.len(), 7);
        assert_eq!(c.model_gain[0], 0.0);
        assert!((c.model_gain[6].abs() - 1.0).abs() < 1e-12);
        assert!((c.random_gain[6].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_error() {
        assert!(auuc_score(&[1.0], &[1.0, 0.0], &[0.1]).is_err());
    }
}
