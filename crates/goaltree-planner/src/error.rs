use goaltree_core::{SearchConfigError, TreeError};
use thiserror::Error;

#[derive(Debug, Error)]
/// Error type for planning steps, collaborator calls and session handling.
pub enum PlannerError {
    #[error("step generation failed: {0}")]
    Generation(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("tree operation failed: {0}")]
    Tree(#[from] TreeError),

    #[error("invalid search config: {0}")]
    Config(#[from] SearchConfigError),

    #[error("failed to read evaluator config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse evaluator config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("step was cancelled")]
    Cancelled,

    #[error("no node left to expand")]
    NoSelection,

    #[error("unknown session '{session_id}'")]
    UnknownSession { session_id: String },

    #[error("snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("chat model call failed: {0}")]
    Model(String),
}

impl PlannerError {
    /// True for failures that come from an external collaborator rather than the tree.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            PlannerError::Generation(_) | PlannerError::Evaluation(_) | PlannerError::Model(_)
        )
    }
}
