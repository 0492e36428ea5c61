use crate::tree::{
    evaluation::{Evaluation, Score, Verdict},
    ids::NodeId,
    node::StepContent,
    search_tree::PlanTree,
};

mod property_tree_tests;

pub(super) fn step(label: &str) -> StepContent {
    StepContent {
        label: label.to_string(),
        description: format!("{label} description"),
        explanation: format!("{label} explanation"),
        parent_ids: Vec::new(),
    }
}

pub(super) fn evaluation(complexity: Score, coherence: Score, importance: Score) -> Evaluation {
    Evaluation::single(
        Verdict::new(complexity, "complexity rationale"),
        Verdict::new(coherence, "coherence rationale"),
        Verdict::new(importance, "importance rationale"),
    )
}

/// Expand `parent` with one child per label and return the new ids.
pub(super) fn expand(tree: &mut PlanTree, parent: &NodeId, labels: &[&str]) -> Vec<NodeId> {
    tree.add_children(parent, labels.iter().map(|label| step(label)).collect())
        .expect("expansion should succeed")
}
