//! CART regression tree (weighted squared error).
//!
//! Used directly as an outcome/propensity component, as the building block of
//! [`RandomForest`](crate::models::forest::RandomForest), and as the shallow
//! interpretability surrogate of the scoring engine.
//!
//! Nodes live in a flat `Vec` (children referenced by index) so trees are
//! cheap to clone and serialize into model snapshots.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Growth limits for a single tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Features considered per split; `None` means all.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 5,
            min_samples_split: 10,
            max_features: None,
        }
    }
}

impl TreeParams {
    pub fn shallow(max_depth: usize, min_samples_leaf: usize) -> Self {
        Self {
            max_depth,
            min_samples_leaf,
            min_samples_split: 2 * min_samples_leaf.max(1),
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
}

struct Pending {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    pub fn fit(
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self, AppError> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        Self::fit_rows(x, y, weights, &rows, params, rng)
    }

    /// Fit on a subset of rows (bootstrap / subsample support for forests).
    pub fn fit_rows(
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        rows: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self, AppError> {
        if x.nrows() != y.len() {
            return Err(AppError::data(format!(
                "Tree fit: {} feature rows but {} targets.",
                x.nrows(),
                y.len()
            )));
        }
        if rows.is_empty() {
            return Err(AppError::data("Tree fit: no rows to fit."));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(AppError::data("Tree fit: non-finite target values."));
        }
        if let Some(w) = weights {
            if w.len() != y.len() || w.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(AppError::data("Tree fit: weights must be finite, non-negative, one per row."));
            }
        }

        let min_leaf = params.min_samples_leaf.max(1);
        let min_split = params.min_samples_split.max(2 * min_leaf);
        let p = x.ncols();
        let mut features: Vec<usize> = (0..p).collect();

        let mut tree = RegressionTree {
            nodes: vec![Node::Leaf {
                value: 0.0,
                n_samples: 0,
            }],
            n_features: p,
        };
        let mut stack = vec![Pending {
            node: 0,
            rows: rows.to_vec(),
            depth: 0,
        }];

        while let Some(Pending { node, rows, depth }) = stack.pop() {
            let value = leaf_value(y, weights, &rows);
            let can_split = depth < params.max_depth && rows.len() >= min_split && p > 0;

            let split = if can_split {
                if let Some(k) = params.max_features {
                    features.shuffle(rng);
                    let k = k.clamp(1, p);
                    best_split(x, y, weights, &rows, &features[..k], min_leaf)
                } else {
                    best_split(x, y, weights, &rows, &features, min_leaf)
                }
            } else {
                None
            };

            match split {
                Some(s) if s.gain > 1e-12 => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                        rows.iter().partition(|&&r| x[(r, s.feature)] <= s.threshold);
                    let left = tree.nodes.len();
                    let right = left + 1;
                    tree.nodes.push(Node::Leaf {
                        value: 0.0,
                        n_samples: 0,
                    });
                    tree.nodes.push(Node::Leaf {
                        value: 0.0,
                        n_samples: 0,
                    });
                    tree.nodes[node] = Node::Split {
                        feature: s.feature,
                        threshold: s.threshold,
                        left,
                        right,
                    };
                    stack.push(Pending {
                        node: left,
                        rows: left_rows,
                        depth: depth + 1,
                    });
                    stack.push(Pending {
                        node: right,
                        rows: right_rows,
                        depth: depth + 1,
                    });
                }
                _ => {
                    tree.nodes[node] = Node::Leaf {
                        value,
                        n_samples: rows.len(),
                    };
                }
            }
        }

        Ok(tree)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], i: usize) -> usize {
            match &nodes[i] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Index (into `nodes`) of the leaf reached by `row` of `x`.
    pub fn leaf_index(&self, x: &DMatrix<f64>, row: usize) -> usize {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { .. } => return i,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if x[(row, *feature)] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Vec<f64> {
        (0..x.nrows())
            .map(|r| match &self.nodes[self.leaf_index(x, r)] {
                Node::Leaf { value, .. } => *value,
                Node::Split { .. } => f64::NAN,
            })
            .collect()
    }

    /// Re-estimate leaf values from a different sample, keeping the structure.
    ///
    /// Leaves that receive no rows keep their previous value.
    pub fn refit_leaves(&mut self, x: &DMatrix<f64>, y: &[f64], weights: Option<&[f64]>, rows: &[usize]) {
        let mut sums = vec![(0.0_f64, 0.0_f64, 0usize); self.nodes.len()];
        for &r in rows {
            let leaf = self.leaf_index(x, r);
            let w = weights.map(|w| w[r]).unwrap_or(1.0);
            sums[leaf].0 += w * y[r];
            sums[leaf].1 += w;
            sums[leaf].2 += 1;
        }
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if let Node::Leaf { value, n_samples } = node {
                let (sy, sw, n) = sums[i];
                if n > 0 && sw > 0.0 {
                    *value = sy / sw;
                    *n_samples = n;
                }
            }
        }
    }
}

fn leaf_value(y: &[f64], weights: Option<&[f64]>, rows: &[usize]) -> f64 {
    let mut sy = 0.0;
    let mut sw = 0.0;
    for &r in rows {
        let w = weights.map(|w| w[r]).unwrap_or(1.0);
        sy += w * y[r];
        sw += w;
    }
    if sw > 0.0 {
        sy / sw
    } else {
        rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len().max(1) as f64
    }
}

/// Exhaustive threshold scan maximizing the weighted SSE reduction
/// `S_L²/W_L + S_R²/W_R - S²/W`.
fn best_split(
    x: &DMatrix<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    rows: &[usize],
    features: &[usize],
    min_leaf: usize,
) -> Option<BestSplit> {
    let n = rows.len();
    let (total_y, total_w) = rows.iter().fold((0.0, 0.0), |(sy, sw), &r| {
        let w = weights.map(|w| w[r]).unwrap_or(1.0);
        (sy + w * y[r], sw + w)
    });
    if total_w <= 0.0 {
        return None;
    }
    let parent = total_y * total_y / total_w;

    let mut best: Option<BestSplit> = None;
    let mut sorted = rows.to_vec();

    for &f in features {
        sorted.sort_by(|&a, &b| x[(a, f)].partial_cmp(&x[(b, f)]).unwrap_or(std::cmp::Ordering::Equal));
        let mut left_y = 0.0;
        let mut left_w = 0.0;

        for i in 0..n - 1 {
            let r = sorted[i];
            let w = weights.map(|w| w[r]).unwrap_or(1.0);
            left_y += w * y[r];
            left_w += w;

            let n_left = i + 1;
            if n_left < min_leaf || n - n_left < min_leaf {
                continue;
            }
            let v = x[(r, f)];
            let v_next = x[(sorted[i + 1], f)];
            if v_next <= v {
                continue;
            }
            let right_w = total_w - left_w;
            if left_w <= 0.0 || right_w <= 0.0 {
                continue;
            }
            let right_y = total_y - left_y;
            let gain = left_y * left_y / left_w + right_y * right_y / right_w - parent;
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    feature: f,
                    threshold: 0.5 * (v + v_next),
                    gain,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn recovers_a_step_function() {
        let x = DMatrix::from_fn(40, 1, |r, _| r as f64);
        let y: Vec<f64> = (0..40).map(|r| if r < 20 { 1.0 } else { 5.0 }).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, None, &TreeParams::shallow(1, 5), &mut rng).unwrap();
        let pred = tree.predict(&x);
        assert!((pred[0] - 1.0).abs() < 1e-12);
        assert!((pred[39] - 5.0).abs() < 1e-12);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn respects_min_samples_leaf() {
        let x = DMatrix::from_fn(12, 1, |r, _| r as f64);
        let y: Vec<f64> = (0..12).map(|r| if r == 0 { 100.0 } else { 0.0 }).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, None, &TreeParams::shallow(3, 5), &mut rng).unwrap();
        for node in tree.nodes() {
            if let Node::Leaf { n_samples, .. } = node {
                assert!(*n_samples >= 5);
            }
        }
    }

    #[test]
    fn constant_features_yield_single_leaf() {
        let x = DMatrix::from_element(20, 2, 1.0);
        let y: Vec<f64> = (0..20).map(|r| r as f64).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, None, &TreeParams::default(), &mut rng).unwrap();
        assert_eq!(tree.nodes().len(), 1);
        assert!((tree.predict(&x)[0] - 9.5).abs() < 1e-12);
    }

    #[test]
    fn refit_leaves_keeps_structure() {
        let x = DMatrix::from_fn(20, 1, |r, _| r as f64);
        let y: Vec<f64> = (0..20).map(|r| if r < 10 { 0.0 } else { 1.0 }).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let mut tree = RegressionTree::fit(&x, &y, None, &TreeParams::shallow(1, 2), &mut rng).unwrap();
        let y2: Vec<f64> = y.iter().map(|v| v * 10.0).collect();
        let rows: Vec<usize> = (0..20).collect();
        tree.refit_leaves(&x, &y2, None, &rows);
        let pred = tree.predict(&x);
        assert!((pred[19] - 10.0).abs() < 1e-12);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn rejects_non_finite_targets() {
        let x = DMatrix::from_element(3, 1, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(RegressionTree::fit(&x, &[1.0, f64::NAN, 0.0], None, &TreeParams::default(), &mut rng).is_err());
    }
}
