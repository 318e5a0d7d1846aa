//! Orthogonal random forests.
//!
//! Trees partition the effect-modifier space; each tree is grown on one half
//! of a subsample and its leaves collect orthogonal moment statistics from the
//! other half. The effect at `x` solves the forest-weighted local moment
//!
//! ```text
//! θ(x) = mean_trees(Σ_leaf(x) a_i / |leaf|) / (mean_trees(Σ_leaf(x) b_i / |leaf|) + λ)
//! ```
//!
//! with `a = t̃ ỹ, b = t̃²` (DML moments) or `a = ψ, b = 1` (DR moments).
//! Effects are only available through [`OrthoForest::effect`]; there is no
//! in-sample shortcut.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::causal::estimators::{crossfit_dr_pseudo_outcomes, crossfit_residuals, ensure_components, EstimationData};
use crate::error::AppError;
use crate::fit::space::CleanedConfig;
use crate::models::{ComponentFactory, RegressionTree, TreeParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrthoKind {
    Dml,
    Dr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrthoTree {
    tree: RegressionTree,
    /// Leaf node → (mean of `a`, mean of `b`) over estimation rows.
    leaves: BTreeMap<usize, (f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrthoForest {
    kind: OrthoKind,
    trees: Vec<OrthoTree>,
    lambda_reg: f64,
    /// Global moment ratio, used where no tree has estimation rows.
    global: (f64, f64),
}

const MIN_T_RES: f64 = 1e-6;

impl OrthoForest {
    pub fn fit(
        kind: OrthoKind,
        data: &EstimationData,
        config: &CleanedConfig,
        factory: &ComponentFactory,
    ) -> Result<Self, AppError> {
        let who = match kind {
            OrthoKind::Dml => "DMLOrthoForest",
            OrthoKind::Dr => "DROrthoForest",
        };
        let p = &config.estimator;
        p.ensure_known(
            who,
            &["n_trees", "max_depth", "min_leaf_size", "subsample_ratio", "lambda_reg", "cv", "min_propensity"],
        )?;
        ensure_components(config, who, &[])?;
        data.require_both_arms(who)?;

        let n_trees = p.usize_or("n_trees", 30)?.max(1);
        let min_leaf = p.usize_or("min_leaf_size", 10)?.max(1);
        let tree_params = TreeParams::shallow(p.usize_or("max_depth", 10)?, min_leaf);
        let subsample_ratio = p.f64_or("subsample_ratio", 0.7)?;
        if !(subsample_ratio > 0.0 && subsample_ratio <= 1.0) {
            return Err(AppError::config(format!("{who}: subsample_ratio must be in (0, 1].")));
        }
        let lambda_reg = p.f64_or("lambda_reg", 0.01)?.max(0.0);
        let cv = p.usize_or("cv", 2)?.max(2);

        // Moment components a (numerator), b (denominator) and the split target.
        let (a, b, target, weights): (Vec<f64>, Vec<f64>, Vec<f64>, Option<Vec<f64>>) = match kind {
            OrthoKind::Dml => {
                let res = crossfit_residuals(data, factory, cv, 1, 71)?;
                let a: Vec<f64> = res.t_res.iter().zip(&res.y_res).map(|(t, y)| t * y).collect();
                let b: Vec<f64> = res.t_res.iter().map(|t| t * t).collect();
                let target: Vec<f64> = res
                    .y_res
                    .iter()
                    .zip(&res.t_res)
                    .map(|(y, t)| y / if t.abs() < MIN_T_RES { MIN_T_RES.copysign(*t) } else { *t })
                    .collect();
                (a, b.clone(), target, Some(b))
            }
            OrthoKind::Dr => {
                let min_propensity = p.f64_or("min_propensity", 1e-3)?;
                let psi = crossfit_dr_pseudo_outcomes(data, factory, cv, min_propensity, 72)?;
                let ones = vec![1.0; psi.len()];
                (psi.clone(), ones, psi, None)
            }
        };

        let n = data.n_rows();
        let per_tree = ((subsample_ratio * n as f64).round() as usize).clamp(2.min(n), n);
        let global = (
            a.iter().sum::<f64>() / n as f64,
            b.iter().sum::<f64>() / n as f64,
        );
        let seed = factory.seed();

        let trees: Vec<OrthoTree> = (0..n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(0x5851_F42D * (i as u64 + 1)));
                let mut rows: Vec<usize> = (0..n).collect();
                rows.shuffle(&mut rng);
                rows.truncate(per_tree);
                let (grow, estimate) = rows.split_at(rows.len() / 2);
                let grow = if grow.is_empty() { estimate } else { grow };

                let tree = RegressionTree::fit_rows(&data.x, &target, weights.as_deref(), grow, &tree_params, &mut rng)?;
                let mut sums: BTreeMap<usize, (f64, f64, usize)> = BTreeMap::new();
                for &r in estimate {
                    let leaf = tree.leaf_index(&data.x, r);
                    let e = sums.entry(leaf).or_insert((0.0, 0.0, 0));
                    e.0 += a[r];
                    e.1 += b[r];
                    e.2 += 1;
                }
                let leaves = sums
                    .into_iter()
                    .map(|(leaf, (sa, sb, k))| (leaf, (sa / k as f64, sb / k as f64)))
                    .collect();
                Ok(OrthoTree { tree, leaves })
            })
            .collect::<Result<_, AppError>>()?;

        Ok(Self {
            kind,
            trees,
            lambda_reg,
            global,
        })
    }

    pub fn kind(&self) -> OrthoKind {
        self.kind
    }

    pub fn effect(&self, x: &DMatrix<f64>) -> Vec<f64> {
        (0..x.nrows())
            .map(|r| {
                let mut num = 0.0;
                let mut den = 0.0;
                let mut used = 0usize;
                for t in &self.trees {
                    if let Some((a, b)) = t.leaves.get(&t.tree.leaf_index(x, r)) {
                        num += a;
                        den += b;
                        used += 1;
                    }
                }
                let (num, den) = if used == 0 {
                    self.global
                } else {
                    (num / used as f64, den / used as f64)
                };
                num / (den + self.lambda_reg).max(1e-12)
            })
            .collect()
    }
}
