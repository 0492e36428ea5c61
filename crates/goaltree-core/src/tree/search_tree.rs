use tracing::{debug, trace};

use crate::tree::{
    arena::NodeTable,
    error::TreeError,
    evaluation::Evaluation,
    ids::NodeId,
    node::{Node, StepContent},
    policy::SelectionPolicy,
};

/// Statistics removed from the tree by [`PlanTree::detach_subtree`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedSubtree {
    /// Descendant ids deleted from the table, the target itself excluded.
    pub removed: Vec<NodeId>,
    /// Visits retracted from every strict ancestor.
    pub visits: u64,
    /// Value retracted from every strict ancestor.
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
/// Owns the node table (root is always the `-1` sentinel)
/// and provides the tree search and operations.
/// Every mutation of the table goes through this type.
pub struct PlanTree {
    table: NodeTable,
    root_id: NodeId,
}

impl Default for PlanTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanTree {
    /// Create a tree with a single fresh root node.
    pub fn new() -> Self {
        let root = Node::root();
        let root_id = root.id().clone();
        let mut table = NodeTable::new();
        table.insert(root);
        PlanTree { table, root_id }
    }

    /// Wrap an existing table. Consistency is checked by [`PlanTree::rehydrate`].
    pub(crate) fn from_parts(table: NodeTable, root_id: NodeId) -> Self {
        PlanTree { table, root_id }
    }

    /// Return the root node id.
    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    pub fn root(&self) -> Result<&Node, TreeError> {
        self.lookup(&self.root_id)
    }

    /// Borrow the whole node table.
    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    /// Return how many nodes exist in the table.
    pub fn node_count(&self) -> usize {
        self.table.len()
    }

    /// Return an immutable node handle. A missing id is an internal consistency violation.
    pub fn lookup(&self, node_id: &NodeId) -> Result<&Node, TreeError> {
        self.table.get(node_id).ok_or_else(|| TreeError::MissingNode {
            node_id: node_id.clone(),
        })
    }

    /// Return a mutable node handle.
    pub(crate) fn lookup_mut(&mut self, node_id: &NodeId) -> Result<&mut Node, TreeError> {
        self.table
            .get_mut(node_id)
            .ok_or_else(|| TreeError::MissingNode {
                node_id: node_id.clone(),
            })
    }

    /// Walk tree-parent links from `node_id` up to the root, closest first.
    /// The node itself and the root are both included.
    pub fn ancestor_chain(&self, node_id: &NodeId) -> Result<Vec<&Node>, TreeError> {
        let mut chain = Vec::new();
        let mut current = Some(node_id);
        while let Some(id) = current {
            let node = self.lookup(id)?;
            chain.push(node);
            current = node.tree_parent_id();
        }
        Ok(chain)
    }

    /// Decomposition history leading to (and including) `node_id`, oldest step first.
    /// The root is not part of the history.
    pub fn history(&self, node_id: &NodeId) -> Result<Vec<&Node>, TreeError> {
        let mut chain = self.ancestor_chain(node_id)?;
        chain.retain(|node| !node.id().is_root());
        chain.reverse();
        Ok(chain)
    }

    /// Recursive check that every leaf under `node_id` is terminal.
    /// A childless non-terminal node is unexpanded, not terminal.
    pub fn all_descendants_terminal(&self, node_id: &NodeId) -> Result<bool, TreeError> {
        let node = self.lookup(node_id)?;
        if node.tree_child_ids().is_empty() {
            return Ok(node.is_terminal());
        }
        for child_id in node.tree_child_ids() {
            if !self.all_descendants_terminal(child_id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True once every reachable path ends in the terminal marker.
    pub fn is_complete(&self) -> Result<bool, TreeError> {
        Ok(self.root()?.all_descendants_terminal())
    }

    /// Descend from the root to the node that should be expanded next.
    ///
    /// Children whose subtree is all-terminal are skipped. Ties keep the first child in order.
    /// The exploration term uses the visits of the tree-parent of the node being descended from,
    /// so children of the root are ranked by mean alone.
    /// Returns `None` when every eligible child scores negative infinity.
    pub fn select(
        &self,
        policy: SelectionPolicy,
        exploration: f64,
    ) -> Result<Option<NodeId>, TreeError> {
        let mut current = self.root_id.clone();

        loop {
            let node = self.lookup(&current)?;
            if node.tree_child_ids().is_empty() {
                trace!(node_id = %current, "select: reached frontier");
                return Ok(Some(current));
            }

            let parent_visits = match node.tree_parent_id() {
                Some(parent_id) => Some(self.lookup(parent_id)?.visits()),
                None => None,
            };
            let mut best: Option<(&NodeId, f64)> = None;
            for child_id in node.tree_child_ids() {
                let child = self.lookup(child_id)?;
                if child.all_descendants_terminal() {
                    continue;
                }
                let score = policy.score(child, parent_visits, exploration);
                best = match best {
                    Some((best_id, best_score)) if best_score >= score => {
                        Some((best_id, best_score))
                    }
                    _ => Some((child_id, score)),
                };
            }

            match best {
                Some((child_id, score)) if score > f64::NEG_INFINITY => {
                    current = child_id.clone();
                }
                _ => {
                    debug!(node_id = %current, "select: no eligible child");
                    return Ok(None);
                }
            }
        }
    }

    /// Materialize generated steps as new children of `parent_id`.
    /// Ids continue after any existing children. Terminal flags are refreshed upward.
    pub fn add_children(
        &mut self,
        parent_id: &NodeId,
        steps: Vec<StepContent>,
    ) -> Result<Vec<NodeId>, TreeError> {
        let parent = self.lookup(parent_id)?.clone();
        if parent.is_terminal() {
            return Err(TreeError::TerminalExpansion {
                node_id: parent_id.clone(),
            });
        }

        let offset = parent.tree_child_ids().len();
        let mut child_ids = Vec::with_capacity(steps.len());
        for (index, content) in steps.into_iter().enumerate() {
            let child_id = parent_id.child(offset + index);
            let child = Node::child_of(&parent, child_id.clone(), content);
            self.table.insert(child);
            child_ids.push(child_id);
        }

        {
            let parent = self.lookup_mut(parent_id)?;
            for child_id in &child_ids {
                parent.push_child(child_id.clone());
            }
        }

        debug!(parent_id = %parent_id, children = child_ids.len(), "add_children: expanded");
        self.refresh_terminal_flags(parent_id)?;
        Ok(child_ids)
    }

    /// Recompute the stored all-terminal flag from `node_id` up to the root.
    pub fn refresh_terminal_flags(&mut self, node_id: &NodeId) -> Result<(), TreeError> {
        let mut current = Some(node_id.clone());
        while let Some(id) = current {
            let flag = {
                let node = self.lookup(&id)?;
                if node.tree_child_ids().is_empty() {
                    node.is_terminal()
                } else {
                    let mut all = true;
                    for child_id in node.tree_child_ids() {
                        if !self.lookup(child_id)?.all_descendants_terminal() {
                            all = false;
                            break;
                        }
                    }
                    all
                }
            };
            let node = self.lookup_mut(&id)?;
            node.set_all_descendants_terminal(flag);
            current = node.tree_parent_id().cloned();
        }
        Ok(())
    }

    /// Add one visit and `reward` to `node_id` and every ancestor up to the root.
    pub fn backpropagate(&mut self, node_id: &NodeId, reward: f64) -> Result<(), TreeError> {
        let mut current = Some(node_id.clone());
        while let Some(id) = current {
            let node = self.lookup_mut(&id)?;
            node.stats_mut().record(reward);
            node.refresh_display_label();
            current = node.tree_parent_id().cloned();
        }
        trace!(node_id = %node_id, reward, "backpropagate: done");
        Ok(())
    }

    /// Undo the backpropagated effect of `node_id` on its strict ancestors,
    /// using the node's current accumulated visits and value.
    /// Nothing is changed if any ancestor would underflow.
    pub fn retract(&mut self, node_id: &NodeId) -> Result<(u64, f64), TreeError> {
        let (visits, value, ancestors) = {
            let node = self.lookup(node_id)?;
            let chain = self.ancestor_chain(node_id)?;
            let mut ancestors = Vec::with_capacity(chain.len().saturating_sub(1));
            for ancestor in chain.into_iter().skip(1) {
                if ancestor.visits() < node.visits() {
                    return Err(TreeError::StatisticsUnderflow {
                        node_id: ancestor.id().clone(),
                        visits: ancestor.visits(),
                        retracted: node.visits(),
                    });
                }
                ancestors.push(ancestor.id().clone());
            }
            (node.visits(), node.value(), ancestors)
        };

        for ancestor_id in &ancestors {
            let ancestor = self.lookup_mut(ancestor_id)?;
            ancestor.stats_mut().retract(visits, value);
            ancestor.refresh_display_label();
        }
        Ok((visits, value))
    }

    /// Collect every descendant id of `node_id`, depth first, the node itself excluded.
    pub fn descendants(&self, node_id: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut collected = Vec::new();
        let mut stack: Vec<NodeId> = self.lookup(node_id)?.tree_child_ids().to_vec();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let node = self.lookup(&id)?;
            for child_id in node.tree_child_ids().iter().rev() {
                stack.push(child_id.clone());
            }
            collected.push(id);
        }
        Ok(collected)
    }

    /// First half of regeneration: delete the subtree below `node_id` and retract
    /// the node's statistics from its ancestors. The node's own entry stays in place.
    pub fn detach_subtree(&mut self, node_id: &NodeId) -> Result<DetachedSubtree, TreeError> {
        if node_id.is_root() {
            return Err(TreeError::RootRegeneration);
        }
        let removed = self.descendants(node_id)?;
        let (visits, value) = self.retract(node_id)?;

        for id in &removed {
            self.table.remove(id);
        }
        self.lookup_mut(node_id)?.clear_children();

        debug!(node_id = %node_id, removed = removed.len(), visits, value, "detach_subtree: done");
        Ok(DetachedSubtree {
            removed,
            visits,
            value,
        })
    }

    /// Second half of regeneration: put a fresh node at the same id, tree-parent and level.
    pub fn replace_node(&mut self, node_id: &NodeId, content: StepContent) -> Result<(), TreeError> {
        if node_id.is_root() {
            return Err(TreeError::RootRegeneration);
        }
        let parent_id = self
            .lookup(node_id)?
            .tree_parent_id()
            .cloned()
            .ok_or(TreeError::RootRegeneration)?;
        let parent = self.lookup(&parent_id)?;
        let replacement = Node::child_of(parent, node_id.clone(), content);
        self.table.insert(replacement);
        self.refresh_terminal_flags(node_id)
    }

    /// Store a model evaluation and initialize the user copy to the same record.
    pub fn set_evaluation(
        &mut self,
        node_id: &NodeId,
        evaluation: Evaluation,
    ) -> Result<(), TreeError> {
        self.lookup_mut(node_id)?.set_evaluations(evaluation);
        Ok(())
    }

    /// Override the user copy only. The model judgment and statistics are untouched.
    pub fn set_user_evaluation(
        &mut self,
        node_id: &NodeId,
        evaluation: Evaluation,
    ) -> Result<(), TreeError> {
        self.lookup_mut(node_id)?.set_user_evaluation(evaluation);
        Ok(())
    }

    /// Mark every node as previously seen. Called when a new step begins.
    pub fn clear_new_flags(&mut self) {
        for node in self.table.iter_mut() {
            node.set_new_node(false);
        }
    }
}
