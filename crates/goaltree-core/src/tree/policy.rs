use serde::{Deserialize, Serialize};

use crate::tree::node::Node;

/// Scoring function used to pick the next node to expand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Upper confidence bound for trees.
    #[default]
    Uct,
    /// Mean reward only, no exploration term.
    Greedy,
}

impl SelectionPolicy {
    /// Score a candidate child. `parent_visits` is `None` when descending from the root.
    pub fn score(self, node: &Node, parent_visits: Option<u64>, exploration: f64) -> f64 {
        match self {
            SelectionPolicy::Uct => uct_score(node, parent_visits, exploration),
            SelectionPolicy::Greedy => greedy_score(node),
        }
    }
}

/// Terminal nodes are never selected, unvisited nodes always are.
/// A visited node whose accumulated value is exactly zero is avoided like a terminal one.
pub fn uct_score(node: &Node, parent_visits: Option<u64>, exploration: f64) -> f64 {
    if node.is_terminal() {
        return f64::NEG_INFINITY;
    }
    let stats = node.stats();
    if stats.is_unvisited() {
        return f64::INFINITY;
    }
    if stats.value() == 0.0 {
        return f64::NEG_INFINITY;
    }
    let n_parent = parent_visits.unwrap_or(1).max(1);
    stats.mean() + exploration * f64::sqrt(f64::ln(n_parent as f64) / stats.visits() as f64)
}

pub fn greedy_score(node: &Node) -> f64 {
    if node.is_terminal() {
        return f64::NEG_INFINITY;
    }
    let stats = node.stats();
    if stats.is_unvisited() {
        f64::INFINITY
    } else {
        stats.mean()
    }
}
