use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural id of the root node.
pub const ROOT_NODE_ID: &str = "-1";

/// A wraper for the structural id used to key nodes in the node table.
/// Child ids are derived from the parent id and the child index, e.g. `-1/0/1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// The sentinel id of the root node.
    pub fn root() -> Self {
        NodeId(ROOT_NODE_ID.to_string())
    }

    /// Derive the id of the `index`-th child of this node.
    pub fn child(&self, index: usize) -> Self {
        NodeId(format!("{}/{}", self.0, index))
    }

    /// Check if this is the root sentinel
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_NODE_ID
    }

    /// Borrow the raw string form of the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    /// Allow for explicit conversion from a string slice to NodeId
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl From<String> for NodeId {
    /// Allow for explicit conversion from String to NodeId
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_ids_extend_the_parent_path() {
        let root = NodeId::root();
        assert!(root.is_root());
        let grandchild = root.child(1).child(0);
        assert_eq!(grandchild.as_str(), "-1/1/0");
        assert!(!grandchild.is_root());
    }
}
