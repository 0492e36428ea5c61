use std::fmt;

use crate::tree::ids::NodeId;

/// Error type for plan tree construction and search operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Attempted to access a node id that does not exist in the node table.
    MissingNode { node_id: NodeId },
    /// A snapshot or table has no root sentinel entry.
    MissingRoot,
    /// Attempted to expand a node that carries the terminal marker.
    TerminalExpansion { node_id: NodeId },
    /// The root cannot be removed or regenerated.
    RootRegeneration,
    /// Retracting statistics would drive an ancestor's visits below zero.
    StatisticsUnderflow {
        node_id: NodeId,
        visits: u64,
        retracted: u64,
    },
    /// Parent/child links in a rehydrated table disagree.
    InconsistentSnapshot { node_id: NodeId, reason: String },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::MissingNode { node_id } => write!(f, "missing node with id {node_id}"),
            TreeError::MissingRoot => write!(f, "node table has no root node"),
            TreeError::TerminalExpansion { node_id } => {
                write!(f, "node {node_id} is terminal and cannot be expanded")
            }
            TreeError::RootRegeneration => write!(f, "the root node cannot be regenerated"),
            TreeError::StatisticsUnderflow {
                node_id,
                visits,
                retracted,
            } => write!(
                f,
                "cannot retract {retracted} visits from node {node_id} with {visits} visits"
            ),
            TreeError::InconsistentSnapshot { node_id, reason } => {
                write!(f, "inconsistent snapshot at node {node_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for TreeError {}
