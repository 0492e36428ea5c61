use serde::{Deserialize, Serialize};

use crate::tree::{evaluation::Evaluation, ids::NodeId, stats::NodeStats};

/// Reserved label marking a completed decomposition path.
pub const TERMINAL_LABEL: &str = "END";

/// The content of one decomposition step, as produced by a step generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepContent {
    pub label: String,
    pub description: String,
    pub explanation: String,
    /// Dependency ids among earlier steps. Not the tree-parent.
    #[serde(default)]
    pub parent_ids: Vec<String>,
}

impl StepContent {
    /// Check function to see if the step carries the terminal marker
    pub fn is_terminal(&self) -> bool {
        self.label == TERMINAL_LABEL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// One explored or frontier decomposition step in the plan tree.
/// Relatives are referenced by id only, the node table owns every node.
pub struct Node {
    id: NodeId,
    /// Sequential id used for display and ordering.
    step_id: u64,
    label: String,
    description: String,
    explanation: String,
    #[serde(default)]
    parent_ids: Vec<String>,
    tree_parent_id: Option<NodeId>,
    #[serde(default)]
    tree_child_ids: Vec<NodeId>,
    #[serde(flatten)]
    stats: NodeStats,
    is_new_node: bool,
    all_descendants_terminal: bool,
    level: usize,
    #[serde(default)]
    model_evaluation: Option<Evaluation>,
    #[serde(default)]
    user_evaluation: Option<Evaluation>,
    display_label: String,
}

impl Node {
    /// Create the sentinel root: zero visits, not terminal.
    pub fn root() -> Self {
        let mut node = Node {
            id: NodeId::root(),
            step_id: 0,
            label: "Root".to_string(),
            description: "Root node".to_string(),
            explanation: "Root node".to_string(),
            parent_ids: Vec::new(),
            tree_parent_id: None,
            tree_child_ids: Vec::new(),
            stats: NodeStats::new(),
            is_new_node: false,
            all_descendants_terminal: false,
            level: 0,
            model_evaluation: None,
            user_evaluation: None,
            display_label: String::new(),
        };
        node.refresh_display_label();
        node
    }

    /// Create a freshly generated child of `parent`.
    pub(crate) fn child_of(parent: &Node, id: NodeId, content: StepContent) -> Self {
        let terminal = content.is_terminal();
        let mut node = Node {
            id,
            step_id: parent.step_id + 1,
            label: content.label,
            description: content.description,
            explanation: content.explanation,
            parent_ids: content.parent_ids,
            tree_parent_id: Some(parent.id.clone()),
            tree_child_ids: Vec::new(),
            stats: NodeStats::new(),
            is_new_node: true,
            all_descendants_terminal: terminal,
            level: parent.level + 1,
            model_evaluation: None,
            user_evaluation: None,
            display_label: String::new(),
        };
        node.refresh_display_label();
        node
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn step_id(&self) -> u64 {
        self.step_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn parent_ids(&self) -> &[String] {
        &self.parent_ids
    }

    /// Return the tree-parent of a given node, `None` only at the root
    pub fn tree_parent_id(&self) -> Option<&NodeId> {
        self.tree_parent_id.as_ref()
    }

    pub fn tree_child_ids(&self) -> &[NodeId] {
        &self.tree_child_ids
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn visits(&self) -> u64 {
        self.stats.visits()
    }

    pub fn value(&self) -> f64 {
        self.stats.value()
    }

    pub fn is_new_node(&self) -> bool {
        self.is_new_node
    }

    /// Stored flag: every leaf reachable from here carries the terminal marker.
    pub fn all_descendants_terminal(&self) -> bool {
        self.all_descendants_terminal
    }

    /// Tree depth, root = 0
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn model_evaluation(&self) -> Option<&Evaluation> {
        self.model_evaluation.as_ref()
    }

    pub fn user_evaluation(&self) -> Option<&Evaluation> {
        self.user_evaluation.as_ref()
    }

    /// `label (value/visits)`, used for tree visualization
    pub fn display_label(&self) -> &str {
        &self.display_label
    }

    /// Check function to see if a node is terminal
    pub fn is_terminal(&self) -> bool {
        self.label == TERMINAL_LABEL
    }

    /// Clone out the step content of this node
    pub fn content(&self) -> StepContent {
        StepContent {
            label: self.label.clone(),
            description: self.description.clone(),
            explanation: self.explanation.clone(),
            parent_ids: self.parent_ids.clone(),
        }
    }

    pub(crate) fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    pub(crate) fn push_child(&mut self, child_id: NodeId) {
        self.tree_child_ids.push(child_id);
    }

    pub(crate) fn clear_children(&mut self) {
        self.tree_child_ids.clear();
    }

    pub(crate) fn set_all_descendants_terminal(&mut self, flag: bool) {
        self.all_descendants_terminal = flag;
    }

    pub(crate) fn set_new_node(&mut self, flag: bool) {
        self.is_new_node = flag;
    }

    pub(crate) fn set_evaluations(&mut self, model: Evaluation) {
        self.user_evaluation = Some(model.clone());
        self.model_evaluation = Some(model);
    }

    pub(crate) fn set_user_evaluation(&mut self, user: Evaluation) {
        self.user_evaluation = Some(user);
    }

    pub(crate) fn refresh_display_label(&mut self) {
        self.display_label = format!(
            "{} ({}/{})",
            self.label,
            format_value(self.stats.value()),
            self.stats.visits()
        );
    }
}

fn format_value(value: f64) -> String {
    let rounded = format!("{value:.3}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
