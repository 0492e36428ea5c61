use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tree::{
    error::TreeError,
    evaluation::Evaluation,
    ids::NodeId,
    node::StepContent,
    path::BestPath,
    policy::SelectionPolicy,
    search_tree::{DetachedSubtree, PlanTree},
};

const DEFAULT_SEARCH_CONFIG_YAML: &str = include_str!("../../config/search.default.yaml");

/// Search configuration for the planning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Tree depth bound, independent of generator cooperation.
    pub max_steps: usize,
    /// Candidates generated per expansion.
    pub sample_count: usize,
    /// UCT exploration constant `C`.
    pub exploration: f64,
    pub policy: SelectionPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_steps: 5,
            sample_count: 2,
            exploration: 1.41,
            policy: SelectionPolicy::Uct,
        }
    }
}

impl SearchConfig {
    /// Parse a search config from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SearchConfigError> {
        let config: SearchConfig = serde_yaml::from_str(yaml).map_err(SearchConfigError::Yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a search config from a YAML file path.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, SearchConfigError> {
        let yaml = fs::read_to_string(path).map_err(SearchConfigError::Io)?;
        Self::from_yaml_str(&yaml)
    }

    /// Return the default YAML config included with this crate.
    pub fn default_yaml() -> &'static str {
        DEFAULT_SEARCH_CONFIG_YAML
    }

    /// Parse the default YAML config included with this crate.
    pub fn from_default_yaml() -> Result<Self, SearchConfigError> {
        Self::from_yaml_str(Self::default_yaml())
    }

    pub fn validate(&self) -> Result<(), SearchConfigError> {
        if self.max_steps == 0 {
            return Err(SearchConfigError::Invalid(
                "max_steps must be greater than 0".to_string(),
            ));
        }
        if self.sample_count == 0 {
            return Err(SearchConfigError::Invalid(
                "sample_count must be greater than 0".to_string(),
            ));
        }
        if !self.exploration.is_finite() || self.exploration < 0.0 {
            return Err(SearchConfigError::Invalid(
                "exploration must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Depth budget left below a node at `level`.
    pub fn remaining_depth(&self, level: usize) -> usize {
        self.max_steps.saturating_sub(level)
    }
}

/// Error type for loading and validating `SearchConfig`.
#[derive(Debug)]
pub enum SearchConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for SearchConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchConfigError::Io(err) => write!(f, "failed to read config file: {err}"),
            SearchConfigError::Yaml(err) => write!(f, "failed to parse config YAML: {err}"),
            SearchConfigError::Invalid(err) => write!(f, "invalid search config: {err}"),
        }
    }
}

impl std::error::Error for SearchConfigError {}

/// A generated and evaluated child, ready to be committed to the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedStep {
    pub content: StepContent,
    pub evaluation: Evaluation,
}

/// Per-step result of committing an expansion or a regeneration.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMetrics {
    /// Node that was expanded (or the tree-parent of a regenerated node).
    pub expanded: NodeId,
    /// Ids of the nodes created by this step.
    pub created: Vec<NodeId>,
    /// Reward backpropagated for each created node, in the same order.
    pub rewards: Vec<f64>,
    pub next_selection: Option<NodeId>,
    pub best_path: Option<BestPath>,
    /// Root flag: every path ends in the terminal marker.
    pub complete: bool,
}

impl PlanTree {
    /// Next node to expand under `config`'s selection policy.
    pub fn next_selection(&self, config: &SearchConfig) -> Result<Option<NodeId>, TreeError> {
        self.select(config.policy, config.exploration)
    }

    /// Commit a fully evaluated expansion: insert every child, store its evaluation,
    /// then backpropagate each child's reward independently, in order.
    pub fn commit_expansion(
        &mut self,
        config: &SearchConfig,
        parent_id: &NodeId,
        steps: Vec<EvaluatedStep>,
    ) -> Result<StepMetrics, TreeError> {
        let (contents, evaluations): (Vec<_>, Vec<_>) = steps
            .into_iter()
            .map(|step| (step.content, step.evaluation))
            .unzip();

        let created = self.add_children(parent_id, contents)?;
        let mut rewards = Vec::with_capacity(created.len());
        for (child_id, evaluation) in created.iter().zip(evaluations) {
            let reward = evaluation.reward();
            self.set_evaluation(child_id, evaluation)?;
            self.backpropagate(child_id, reward)?;
            rewards.push(reward);
        }

        debug!(parent_id = %parent_id, created = created.len(), "commit_expansion: done");
        self.finish_step(config, parent_id.clone(), created, rewards)
    }

    /// Commit a regeneration: drop the subtree below `node_id`, retract its statistics,
    /// put the replacement at the same position, then evaluate and backpropagate it.
    pub fn commit_regeneration(
        &mut self,
        config: &SearchConfig,
        node_id: &NodeId,
        step: EvaluatedStep,
    ) -> Result<(DetachedSubtree, StepMetrics), TreeError> {
        let parent_id = self
            .lookup(node_id)?
            .tree_parent_id()
            .cloned()
            .ok_or(TreeError::RootRegeneration)?;

        let detached = self.detach_subtree(node_id)?;
        self.replace_node(node_id, step.content)?;

        let reward = step.evaluation.reward();
        self.set_evaluation(node_id, step.evaluation)?;
        self.backpropagate(node_id, reward)?;

        debug!(node_id = %node_id, reward, "commit_regeneration: done");
        let metrics = self.finish_step(config, parent_id, vec![node_id.clone()], vec![reward])?;
        Ok((detached, metrics))
    }

    fn finish_step(
        &self,
        config: &SearchConfig,
        expanded: NodeId,
        created: Vec<NodeId>,
        rewards: Vec<f64>,
    ) -> Result<StepMetrics, TreeError> {
        Ok(StepMetrics {
            expanded,
            created,
            rewards,
            next_selection: self.next_selection(config)?,
            best_path: self.best_path()?,
            complete: self.is_complete()?,
        })
    }
}
