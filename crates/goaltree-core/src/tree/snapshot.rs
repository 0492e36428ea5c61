use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tree::{arena::NodeTable, error::TreeError, ids::NodeId, search_tree::PlanTree};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Flat wire form of a plan tree: the full node table plus the root id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    pub schema_version: u32,
    pub root_id: NodeId,
    pub node_count: usize,
    pub nodes: NodeTable,
}

impl TreeSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl PlanTree {
    /// Capture the whole tree as a flat snapshot.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            root_id: self.root_id().clone(),
            node_count: self.node_count(),
            nodes: self.table().clone(),
        }
    }

    /// Rebuild a tree from a client-supplied node table, rooted at the `-1` sentinel.
    /// Stored all-terminal flags are recomputed from the leaves; the client copy is not trusted.
    pub fn rehydrate(mut nodes: NodeTable) -> Result<Self, TreeError> {
        let root_id = NodeId::root();
        if !nodes.contains(&root_id) {
            return Err(TreeError::MissingRoot);
        }
        validate(&nodes, &root_id)?;
        let mut corrected = 0;
        settle_terminal_flags(&mut nodes, &root_id, &mut corrected)?;
        if corrected > 0 {
            warn!(corrected, "rehydrate: stale all-terminal flags recomputed");
        }
        debug!(nodes = nodes.len(), "rehydrate: table accepted");
        Ok(PlanTree::from_parts(nodes, root_id))
    }

    /// Rebuild a tree from a snapshot.
    pub fn from_snapshot(snapshot: TreeSnapshot) -> Result<Self, TreeError> {
        if !snapshot.root_id.is_root() {
            return Err(TreeError::InconsistentSnapshot {
                node_id: snapshot.root_id,
                reason: "root id is not the sentinel".to_string(),
            });
        }
        Self::rehydrate(snapshot.nodes)
    }
}

/// Check that parent and child links agree in both directions.
fn validate(nodes: &NodeTable, root_id: &NodeId) -> Result<(), TreeError> {
    for node in nodes {
        match node.tree_parent_id() {
            None if node.id() != root_id => {
                return Err(TreeError::InconsistentSnapshot {
                    node_id: node.id().clone(),
                    reason: "non-root node without tree parent".to_string(),
                });
            }
            None => {}
            Some(parent_id) => {
                let parent = nodes.get(parent_id).ok_or_else(|| TreeError::MissingNode {
                    node_id: parent_id.clone(),
                })?;
                if !parent.tree_child_ids().contains(node.id()) {
                    return Err(TreeError::InconsistentSnapshot {
                        node_id: node.id().clone(),
                        reason: format!("not listed as a child of {parent_id}"),
                    });
                }
            }
        }

        for child_id in node.tree_child_ids() {
            let child = nodes.get(child_id).ok_or_else(|| TreeError::MissingNode {
                node_id: child_id.clone(),
            })?;
            if child.tree_parent_id() != Some(node.id()) {
                return Err(TreeError::InconsistentSnapshot {
                    node_id: child_id.clone(),
                    reason: format!("tree parent does not point back to {}", node.id()),
                });
            }
        }
    }
    Ok(())
}

/// Post-order recomputation of the all-terminal flag below `node_id`. Returns the node's flag.
fn settle_terminal_flags(
    nodes: &mut NodeTable,
    node_id: &NodeId,
    corrected: &mut usize,
) -> Result<bool, TreeError> {
    let node = nodes.get(node_id).ok_or_else(|| TreeError::MissingNode {
        node_id: node_id.clone(),
    })?;
    let child_ids = node.tree_child_ids().to_vec();
    let mut flag = if child_ids.is_empty() {
        node.is_terminal()
    } else {
        true
    };
    for child_id in &child_ids {
        // Every subtree is settled, so no short-circuit.
        if !settle_terminal_flags(nodes, child_id, corrected)? {
            flag = false;
        }
    }

    let node = nodes.get_mut(node_id).ok_or_else(|| TreeError::MissingNode {
        node_id: node_id.clone(),
    })?;
    if node.all_descendants_terminal() != flag {
        node.set_all_descendants_terminal(flag);
        *corrected += 1;
    }
    Ok(flag)
}
