use std::collections::{
    BTreeMap,
    btree_map::{IntoValues, Values, ValuesMut},
};

use serde::{Deserialize, Serialize};

use crate::tree::{ids::NodeId, node::Node};

/// The single owning table of nodes, keyed by structural id.
/// Serializes as a flat mapping from id to node record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeTable {
    storage: BTreeMap<NodeId, Node>,
}

impl NodeTable {
    /// Create a new empty storage
    pub fn new() -> Self {
        NodeTable {
            storage: BTreeMap::new(),
        }
    }

    /// Insert a node under its own id, returning any node it replaced
    pub(crate) fn insert(&mut self, node: Node) -> Option<Node> {
        self.storage.insert(node.id().clone(), node)
    }

    /// Remove a node from the table
    pub(crate) fn remove(&mut self, node_id: &NodeId) -> Option<Node> {
        self.storage.remove(node_id)
    }

    /// Retrieve an associated node from the table
    pub fn get(&self, node_id: &NodeId) -> Option<&Node> {
        self.storage.get(node_id)
    }

    /// Retrieve an associated node from the table as a mutable borrow
    pub(crate) fn get_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.storage.get_mut(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.storage.contains_key(node_id)
    }

    /// Check the length of the table
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Iteration helper for the table, ordered by id
    pub fn iter(&self) -> Values<'_, NodeId, Node> {
        self.storage.values()
    }

    /// Mutable iteration helper for the table
    pub(crate) fn iter_mut(&mut self) -> ValuesMut<'_, NodeId, Node> {
        self.storage.values_mut()
    }
}

impl FromIterator<Node> for NodeTable {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        let mut table = NodeTable::new();
        for node in iter {
            table.insert(node);
        }
        table
    }
}

/// Iteration support for NodeTable.
/// - `for x in table` (moves nodes out)
impl IntoIterator for NodeTable {
    type Item = Node;
    type IntoIter = IntoValues<NodeId, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.storage.into_values()
    }
}

/// Iteration support for NodeTable.
/// - `for x in &table` (borrows nodes)
impl<'a> IntoIterator for &'a NodeTable {
    type Item = &'a Node;
    type IntoIter = Values<'a, NodeId, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.storage.values()
    }
}
