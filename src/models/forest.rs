//! Random forest of [`RegressionTree`]s.
//!
//! Trees are grown in parallel (rayon), each from its own seeded RNG so the
//! forest is reproducible regardless of thread scheduling. With `honest`
//! enabled each tree grows on one half of its sample and estimates leaf values
//! on the other half.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::tree::{RegressionTree, TreeParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub tree: TreeParams,
    /// Fraction of rows drawn per tree.
    pub max_samples: f64,
    /// Draw with replacement; otherwise subsample without replacement.
    pub bootstrap: bool,
    pub honest: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            tree: TreeParams::default(),
            max_samples: 1.0,
            bootstrap: true,
            honest: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, AppError> {
        let n = x.nrows();
        if n == 0 {
            return Err(AppError::data("Random forest: no rows to fit."));
        }
        if params.n_estimators == 0 {
            return Err(AppError::config("Random forest: n_estimators must be >= 1."));
        }
        if !(params.max_samples > 0.0 && params.max_samples <= 1.0) {
            return Err(AppError::config(format!(
                "Random forest: max_samples must be in (0, 1], got {}.",
                params.max_samples
            )));
        }
        let per_tree = ((params.max_samples * n as f64).round() as usize).clamp(1, n);

        let trees: Vec<RegressionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)));
                let rows = draw_rows(n, per_tree, params.bootstrap, &mut rng);
                if params.honest && rows.len() >= 2 {
                    let (grow, estimate) = rows.split_at(rows.len() / 2);
                    let mut tree = RegressionTree::fit_rows(x, y, weights, grow, &params.tree, &mut rng)?;
                    tree.refit_leaves(x, y, weights, estimate);
                    Ok(tree)
                } else {
                    RegressionTree::fit_rows(x, y, weights, &rows, &params.tree, &mut rng)
                }
            })
            .collect::<Result<_, AppError>>()?;

        Ok(Self { trees })
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let mut out = vec![0.0; x.nrows()];
        for tree in &self.trees {
            for (o, p) in out.iter_mut().zip(tree.predict(x)) {
                *o += p;
            }
        }
        let k = self.trees.len().max(1) as f64;
        out.iter_mut().for_each(|v| *v /= k);
        out
    }
}

fn draw_rows(n: usize, k: usize, bootstrap: bool, rng: &mut StdRng) -> Vec<usize> {
    if bootstrap {
        (0..k).map(|_| rng.gen_range(0..n)).collect()
    } else {
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(rng);
        rows.truncate(k);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forest_tracks_a_nonlinear_signal() {
        let n = 300;
        let x = DMatrix::from_fn(n, 1, |r, _| r as f64 / n as f64);
        let y: Vec<f64> = (0..n).map(|r| if x[(r, 0)] > 0.5 { 2.0 } else { -2.0 }).collect();
        let params = ForestParams {
            n_estimators: 20,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, None, &params, 3).unwrap();
        let pred = forest.predict(&x);
        assert!(pred[10] < -1.5);
        assert!(pred[290] > 1.5);
    }

    #[test]
    fn same_seed_same_forest() {
        let x = DMatrix::from_fn(50, 2, |r, c| ((r * (c + 3)) % 11) as f64);
        let y: Vec<f64> = (0..50).map(|r| (r % 5) as f64).collect();
        let params = ForestParams {
            n_estimators: 5,
            honest: true,
            bootstrap: false,
            max_samples: 0.8,
            ..ForestParams::default()
        };
        let a = RandomForest::fit(&x, &y, None, &params, 9).unwrap();
        let b = RandomForest::fit(&x, &y, None, &params, 9).unwrap();
        assert_eq!(a, b);
    }
}
