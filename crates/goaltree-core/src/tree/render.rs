use std::fmt::Write;

use crate::tree::{error::TreeError, search_tree::PlanTree};

impl PlanTree {
    /// Indented outline of the tree, one display label per line in depth-first order.
    pub fn outline(&self) -> Result<String, TreeError> {
        let mut out = String::new();
        let mut stack = vec![self.root_id().clone()];

        while let Some(id) = stack.pop() {
            let node = self.lookup(&id)?;
            let _ = writeln!(out, "{}{}", "  ".repeat(node.level()), node.display_label());
            stack.extend(node.tree_child_ids().iter().rev().cloned());
        }
        Ok(out)
    }
}
