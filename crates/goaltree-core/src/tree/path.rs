use serde::{Deserialize, Serialize};

use crate::tree::{error::TreeError, ids::NodeId, search_tree::PlanTree};

/// Highest-valued root-to-leaf path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestPath {
    /// Ancestor chain of the leaf: leaf first, root last.
    pub node_ids: Vec<NodeId>,
    /// Normalized path value.
    pub value: f64,
}

impl PlanTree {
    /// Depth-first search for the leaf whose path maximizes the normalized product of node values.
    ///
    /// A leaf at depth `d` scores `(v1 * v2 * ... * vd)^(1/d)`, the root excluded.
    /// Ties keep the first leaf in depth-first order. Returns `None` while the root has no children.
    pub fn best_path(&self) -> Result<Option<BestPath>, TreeError> {
        let mut best: Option<(NodeId, f64)> = None;
        for child_id in self.root()?.tree_child_ids() {
            self.visit_path(child_id, 1, 1.0, &mut best)?;
        }

        match best {
            Some((leaf_id, value)) => {
                let node_ids = self
                    .ancestor_chain(&leaf_id)?
                    .into_iter()
                    .map(|node| node.id().clone())
                    .collect();
                Ok(Some(BestPath { node_ids, value }))
            }
            None => Ok(None),
        }
    }

    fn visit_path(
        &self,
        node_id: &NodeId,
        depth: usize,
        product: f64,
        best: &mut Option<(NodeId, f64)>,
    ) -> Result<(), TreeError> {
        let node = self.lookup(node_id)?;
        let product = product * node.value();

        if node.tree_child_ids().is_empty() {
            let value = normalized_path_value(product, depth);
            let improves = match best {
                Some((_, best_value)) => value > *best_value,
                None => true,
            };
            if improves {
                *best = Some((node_id.clone(), value));
            }
            return Ok(());
        }

        for child_id in node.tree_child_ids() {
            self.visit_path(child_id, depth + 1, product, best)?;
        }
        Ok(())
    }
}

/// `product^(1/depth)`, keeping the sign so negative products stay comparable.
pub fn normalized_path_value(product: f64, depth: usize) -> f64 {
    if depth == 0 {
        return product;
    }
    product.signum() * product.abs().powf(1.0 / depth as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_a_geometric_mean() {
        assert!((normalized_path_value(4.0 * 9.0, 2) - 6.0).abs() < 1e-12);
        assert!((normalized_path_value(-8.0, 3) + 2.0).abs() < 1e-12);
        assert_eq!(normalized_path_value(0.0, 2), 0.0);
    }
}
