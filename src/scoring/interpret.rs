//! Shallow surrogate tree over the effect modifiers, fitted to a CATE vector.

use std::fmt::{self, Write as _};

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::models::{Node, RegressionTree, TreeParams};

pub const SURROGATE_DEPTH: usize = 2;
pub const SURROGATE_MIN_LEAF: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateTree {
    pub feature_names: Vec<String>,
    pub tree: RegressionTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interpretation {
    Tree(SurrogateTree),
    Unavailable { reason: String },
}

impl Interpretation {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Interpretation::Unavailable { reason: reason.into() }
    }

    pub fn tree(&self) -> Option<&SurrogateTree> {
        match self {
            Interpretation::Tree(t) => Some(t),
            Interpretation::Unavailable { .. } => None,
        }
    }
}

/// Fit the surrogate. Never fails: problems become [`Interpretation::Unavailable`].
pub fn interpret(x: &DMatrix<f64>, feature_names: &[String], cate: &[f64]) -> Interpretation {
    if x.ncols() == 0 {
        return Interpretation::unavailable("no effect modifiers");
    }
    if x.nrows() != cate.len() {
        return Interpretation::unavailable(format!("{} rows but {} effects", x.nrows(), cate.len()));
    }
    let mut rng = StdRng::seed_from_u64(0);
    match RegressionTree::fit(x, cate, None, &TreeParams::shallow(SURROGATE_DEPTH, SURROGATE_MIN_LEAF), &mut rng) {
        Ok(tree) => Interpretation::Tree(SurrogateTree {
            feature_names: feature_names.to_vec(),
            tree,
        }),
        Err(e) => Interpretation::unavailable(e.to_string()),
    }
}

impl SurrogateTree {
    fn feature(&self, i: usize) -> String {
        self.feature_names.get(i).cloned().unwrap_or_else(|| format!("x[{i}]"))
    }

    fn render(&self, out: &mut String, node: usize, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match &self.tree.nodes()[node] {
            Node::Leaf { value, n_samples } => writeln!(out, "{pad}effect = {value:.4} (n = {n_samples})"),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let name = self.feature(*feature);
                writeln!(out, "{pad}if {name} <= {threshold:.4}:")?;
                self.render(out, *left, indent + 1)?;
                writeln!(out, "{pad}else:")?;
                self.render(out, *right, indent + 1)
            }
        }
    }
}

impl fmt::Display for SurrogateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render(&mut out, 0, 0)?;
        f.write_str(out.trim_end())
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpretation::Tree(t) => fmt::Display::fmt(t, f),
            Interpretation::Unavailable { reason } => write!(f, "(no interpretation: {reason})"),
        }
    }
}
