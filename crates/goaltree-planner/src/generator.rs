use async_trait::async_trait;
use goaltree_core::{Node, StepContent, TERMINAL_LABEL};
use serde::{Deserialize, Serialize};

use crate::PlannerError;

/// A previously accepted step, as shown to a step generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStep {
    /// Id the generator may reference in a candidate's `parent_ids`.
    pub id: String,
    pub label: String,
    pub description: String,
    pub explanation: String,
    #[serde(default)]
    pub parent_ids: Vec<String>,
}

impl HistoryStep {
    /// History record of a tree node, keyed by its sequential step id.
    pub fn from_node(node: &Node) -> Self {
        HistoryStep {
            id: node.step_id().to_string(),
            label: node.label().to_string(),
            description: node.description().to_string(),
            explanation: node.explanation().to_string(),
            parent_ids: node.parent_ids().to_vec(),
        }
    }
}

/// Produces candidate next steps for a goal given the steps accepted so far.
#[async_trait]
pub trait StepGenerator: Send + Sync {
    /// Return `sample_count` distinct candidate next steps.
    ///
    /// Candidates should carry the terminal label once `remaining_depth` runs out.
    /// Dependency ids in `parent_ids` refer to the `id` of entries in `history`.
    async fn generate_steps(
        &self,
        goal: &str,
        history: &[HistoryStep],
        remaining_depth: usize,
        sample_count: usize,
    ) -> Result<Vec<StepContent>, PlannerError>;
}

/// The single terminal step inserted once the depth bound is reached.
pub fn depth_limit_step() -> StepContent {
    StepContent {
        label: TERMINAL_LABEL.to_string(),
        description: "Maximum decomposition depth reached".to_string(),
        explanation: "No further steps are generated below the depth bound".to_string(),
        parent_ids: Vec::new(),
    }
}
