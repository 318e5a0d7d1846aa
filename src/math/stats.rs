//! Small numeric helpers shared by models and scorers.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (`ddof = 1`); NaN for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() as f64 - 1.0)).sqrt()
}

pub fn weighted_mean(values: &[f64], weights: Option<&[f64]>) -> f64 {
    match weights {
        None => mean(values),
        Some(w) => {
            let sw: f64 = w.iter().sum();
            if sw <= 0.0 {
                return f64::NAN;
            }
            values.iter().zip(w).map(|(v, w)| v * w).sum::<f64>() / sw
        }
    }
}

pub fn mse(y: &[f64], pred: &[f64]) -> f64 {
    mean(&y.iter().zip(pred).map(|(a, b)| (a - b) * (a - b)).collect::<Vec<_>>())
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Shuffled k-fold assignment: returns `(train_rows, held_out_rows)` per fold.
///
/// `k` is clamped to `[2, n]`.
pub fn kfold_indices(n: usize, k: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    let k = k.clamp(2, n.max(2));
    let mut rows: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);

    (0..k)
        .map(|fold| {
            let held: Vec<usize> = rows.iter().enumerate().filter(|(i, _)| i % k == fold).map(|(_, r)| *r).collect();
            let train: Vec<usize> = rows.iter().enumerate().filter(|(i, _)| i % k != fold).map(|(_, r)| *r).collect();
            (train, held)
        })
        .collect()
}

/// Stratified variant of [`kfold_indices`] for binary labels: both arms are
/// spread across folds so each training part sees treated and control rows.
pub fn stratified_kfold_indices(labels: &[f64], k: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    let n = labels.len();
    let k = k.clamp(2, n.max(2));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ones: Vec<usize> = (0..n).filter(|&i| labels[i] == 1.0).collect();
    let mut zeros: Vec<usize> = (0..n).filter(|&i| labels[i] != 1.0).collect();
    ones.shuffle(&mut rng);
    zeros.shuffle(&mut rng);

    let mut fold_of = vec![0usize; n];
    for (pos, &r) in zeros.iter().chain(ones.iter()).enumerate() {
        fold_of[r] = pos % k;
    }
    (0..k)
        .map(|fold| {
            let held: Vec<usize> = (0..n).filter(|&i| fold_of[i] == fold).collect();
            let train: Vec<usize> = (0..n).filter(|&i| fold_of[i] != fold).collect();
            (train, held)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_stable_for_large_inputs() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(-800.0).is_finite());
    }

    #[test]
    fn kfold_covers_each_row_once() {
        let folds = kfold_indices(10, 3, 1);
        let mut held: Vec<usize> = folds.iter().flat_map(|(_, h)| h.clone()).collect();
        held.sort();
        assert_eq!(held, (0..10).collect::<Vec<_>>());
        for (train, h) in &folds {
            assert_eq!(train.len() + h.len(), 10);
        }
    }

    #[test]
    fn stratified_folds_keep_both_labels_in_training() {
        let labels = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        for (train, _) in stratified_kfold_indices(&labels, 2, 9) {
            assert!(train.iter().any(|&i| labels[i] == 1.0));
            assert!(train.iter().any(|&i| labels[i] == 0.0));
        }
    }

    #[test]
    fn std_dev_matches_sample_formula() {
        assert!((std_dev(&[1.0, 2.0, 3.0, 4.0]) - 1.2909944487358056).abs() < 1e-12);
        assert!(std_dev(&[1.0]).is_nan());
    }
}
