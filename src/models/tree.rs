//! Depth-limited CART decision tree with Gini impurity.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::{check_training_data, proba_columns, Classifier};
use crate::core::config::TreeConfig;
use crate::core::errors::Result;

/// Tree node. Rows with `feature <= threshold` go left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Terminal node
    Leaf {
        /// Fraction of RISKY training rows that reached this leaf
        risky: f64,
        /// Training rows that reached this leaf
        samples: usize,
    },
    /// Binary split
    Split {
        /// Column index
        feature: usize,
        /// Split point
        threshold: f64,
        /// `<= threshold`
        left: Box<TreeNode>,
        /// `> threshold`
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { risky, .. } => return *risky,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Deepest path from this node
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf { .. } => 0,
            Self::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// CART classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
}

impl DecisionTree {
    /// Unfitted tree
    pub fn new(config: TreeConfig) -> Self {
        Self { config, root: None }
    }

    /// Tree with a given structure
    pub fn from_root(config: TreeConfig, root: TreeNode) -> Self {
        Self {
            config,
            root: Some(root),
        }
    }

    /// Root node once fitted
    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    fn grow(&self, features: &Array2<f64>, labels: &Array1<u8>, rows: &[usize], depth: usize) -> TreeNode {
        let risky = rows.iter().filter(|&&i| labels[i] == 1).count();
        let leaf = TreeNode::Leaf {
            risky: risky as f64 / rows.len().max(1) as f64,
            samples: rows.len(),
        };

        if depth >= self.config.max_depth
            || rows.len() < self.config.min_samples_split
            || risky == 0
            || risky == rows.len()
        {
            return leaf;
        }

        let Some((feature, threshold)) = best_split(features, labels, rows) else {
            return leaf;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| features[[i, feature]] <= threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(features, labels, &left, depth + 1)),
            right: Box::new(self.grow(features, labels, &right, depth + 1)),
        }
    }
}

fn gini(risky: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = risky as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Split with the lowest weighted Gini impurity that improves on the parent.
fn best_split(features: &Array2<f64>, labels: &Array1<u8>, rows: &[usize]) -> Option<(usize, f64)> {
    let total = rows.len();
    let total_risky = rows.iter().filter(|&&i| labels[i] == 1).count();
    let mut best: Option<(usize, f64, f64)> = None;
    let mut best_impurity = gini(total_risky, total);

    for feature in 0..features.ncols() {
        let mut sorted: Vec<(f64, u8)> = rows
            .iter()
            .map(|&i| (features[[i, feature]], labels[i]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_risky = 0;
        for k in 1..total {
            left_risky += usize::from(sorted[k - 1].1 == 1);
            if sorted[k - 1].0 == sorted[k].0 {
                continue;
            }
            let right_risky = total_risky - left_risky;
            let impurity = (k as f64 * gini(left_risky, k)
                + (total - k) as f64 * gini(right_risky, total - k))
                / total as f64;
            if impurity + 1e-12 < best_impurity {
                best_impurity = impurity;
                let threshold = (sorted[k - 1].0 + sorted[k].0) / 2.0;
                best = Some((feature, threshold, impurity));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

impl Classifier for DecisionTree {
    fn fit(&mut self, features: &Array2<f64>, labels: &Array1<u8>) -> Result<()> {
        check_training_data(features, labels)?;
        let rows: Vec<usize> = (0..features.nrows()).collect();
        let root = self.grow(features, labels, &rows, 0);
        debug!(rows = rows.len(), depth = root.depth(), "Fitted decision tree");
        self.root = Some(root);
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Array2<f64> {
        proba_columns(features.outer_iter().map(|row| match &self.root {
            Some(root) => root.predict(row),
            None => 0.5,
        }))
    }
}
