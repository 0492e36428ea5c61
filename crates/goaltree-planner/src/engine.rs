use std::{future::Future, sync::Arc};

use futures::{Stream, stream};
use goaltree_core::{
    BestPath, EvaluatedStep, NodeId, PlanTree, SearchConfig, StepContent, StepMetrics, TreeError,
    TreeSnapshot,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    PlannerError,
    evaluator::{EvalSubject, EvaluationEnsemble},
    generator::{HistoryStep, StepGenerator, depth_limit_step},
};

/// What one engine step hands back to the caller: the whole tree plus where to go next.
///
/// A terminal signal carries no selection, no best path and the error that ended the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub snapshot: TreeSnapshot,
    pub next_selection: Option<NodeId>,
    pub best_path: Option<BestPath>,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn from_metrics(tree: &PlanTree, metrics: &StepMetrics) -> Self {
        StepOutcome {
            snapshot: tree.snapshot(),
            next_selection: metrics.next_selection.clone(),
            best_path: metrics.best_path.clone(),
            complete: metrics.complete,
            error: None,
        }
    }

    /// The terminal empty signal: unchanged tree, nothing selected, no path.
    pub fn terminal(tree: &PlanTree, error: &PlannerError) -> Self {
        StepOutcome {
            snapshot: tree.snapshot(),
            next_selection: None,
            best_path: None,
            complete: false,
            error: Some(error.to_string()),
        }
    }

    pub fn is_terminal_signal(&self) -> bool {
        self.error.is_some()
    }
}

/// Drives MCTS over a plan tree with an external step generator and evaluation ensemble.
///
/// Generation and evaluation finish before anything is written to the tree,
/// so a failed or cancelled step leaves the tree as it was.
#[derive(Clone)]
pub struct Planner {
    config: SearchConfig,
    generator: Arc<dyn StepGenerator>,
    ensemble: EvaluationEnsemble,
}

impl Planner {
    pub fn new(
        config: SearchConfig,
        generator: Arc<dyn StepGenerator>,
        ensemble: EvaluationEnsemble,
    ) -> Result<Self, PlannerError> {
        config.validate()?;
        Ok(Planner {
            config,
            generator,
            ensemble,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The same planner scoring with a different ensemble.
    pub fn with_ensemble(&self, ensemble: EvaluationEnsemble) -> Planner {
        Planner {
            config: self.config.clone(),
            generator: Arc::clone(&self.generator),
            ensemble,
        }
    }

    /// A fresh tree holding only the root sentinel.
    pub fn init_search(&self) -> PlanTree {
        PlanTree::new()
    }

    /// Rebuild a tree from a client-supplied snapshot.
    pub fn rehydrate(&self, snapshot: TreeSnapshot) -> Result<PlanTree, PlannerError> {
        Ok(PlanTree::from_snapshot(snapshot)?)
    }

    /// One engine step: select (or reuse `prior_selection`), expand, evaluate, backpropagate.
    pub async fn step(
        &self,
        tree: &mut PlanTree,
        goal: &str,
        prior_selection: Option<NodeId>,
        cancel: &CancellationToken,
    ) -> Result<StepMetrics, PlannerError> {
        let selected = self.resolve_selection(tree, prior_selection)?;
        let node = tree.lookup(&selected)?;
        let remaining_depth = self.config.remaining_depth(node.level());
        info!(node_id = %selected, level = node.level(), remaining_depth, "step: expanding");

        let history = history_of(tree, &selected)?;
        let drafts = if remaining_depth == 0 {
            debug!(node_id = %selected, "step: depth bound reached");
            vec![depth_limit_step()]
        } else {
            let drafts = cancellable(
                cancel,
                self.generator.generate_steps(
                    goal,
                    &history,
                    remaining_depth,
                    self.config.sample_count,
                ),
            )
            .await?;
            take_candidates(drafts, self.config.sample_count)?
        };
        let drafts = resolve_dependencies(tree, &selected, drafts)?;

        let parent = (!selected.is_root()).then(|| node.content());
        let subjects: Vec<EvalSubject> = drafts
            .iter()
            .map(|child| EvalSubject {
                goal: goal.to_string(),
                parent: parent.clone(),
                child: child.clone(),
            })
            .collect();
        let evaluations = cancellable(cancel, self.ensemble.evaluate_batch(&subjects)).await?;
        if cancel.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }

        let steps = drafts
            .into_iter()
            .zip(evaluations)
            .map(|(content, evaluation)| EvaluatedStep {
                content,
                evaluation,
            })
            .collect();

        tree.clear_new_flags();
        let metrics = tree.commit_expansion(&self.config, &selected, steps)?;
        info!(
            node_id = %selected,
            created = metrics.created.len(),
            next_selection = ?metrics.next_selection,
            complete = metrics.complete,
            "step: committed"
        );
        Ok(metrics)
    }

    /// Replace `node_id` and drop its subtree with one freshly generated and evaluated step.
    pub async fn regenerate(
        &self,
        tree: &mut PlanTree,
        node_id: &NodeId,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<StepMetrics, PlannerError> {
        let result = self.regenerate_inner(tree, node_id, goal, cancel).await;
        if let Err(err) = &result {
            error!(node_id = %node_id, error = %err, "regenerate: failed");
        }
        result
    }

    async fn regenerate_inner(
        &self,
        tree: &mut PlanTree,
        node_id: &NodeId,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<StepMetrics, PlannerError> {
        let parent_id = tree
            .lookup(node_id)?
            .tree_parent_id()
            .cloned()
            .ok_or(TreeError::RootRegeneration)?;
        let parent = tree.lookup(&parent_id)?;
        let remaining_depth = self.config.remaining_depth(parent.level());
        info!(node_id = %node_id, remaining_depth, "regenerate: called");

        let history = history_of(tree, &parent_id)?;
        let draft = if remaining_depth == 0 {
            depth_limit_step()
        } else {
            let drafts = cancellable(
                cancel,
                self.generator
                    .generate_steps(goal, &history, remaining_depth, 1),
            )
            .await?;
            take_candidates(drafts, 1)?.remove(0)
        };
        let mut drafts = resolve_dependencies(tree, &parent_id, vec![draft])?;
        let draft = drafts.remove(0);

        let subject = EvalSubject {
            goal: goal.to_string(),
            parent: (!parent_id.is_root()).then(|| parent.content()),
            child: draft.clone(),
        };
        let evaluation = cancellable(cancel, self.ensemble.evaluate(&subject)).await?;
        if cancel.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }

        tree.clear_new_flags();
        let (detached, metrics) = tree.commit_regeneration(
            &self.config,
            node_id,
            EvaluatedStep {
                content: draft,
                evaluation,
            },
        )?;
        info!(
            node_id = %node_id,
            removed = detached.removed.len(),
            retracted_visits = detached.visits,
            retracted_value = detached.value,
            "regenerate: committed"
        );
        Ok(metrics)
    }

    /// Run engine steps until every path ends in the terminal marker.
    ///
    /// Each item is one step's outcome. An error ends the stream with a terminal signal.
    pub fn stream(
        &self,
        tree: PlanTree,
        goal: String,
        prior_selection: Option<NodeId>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StepOutcome> + '_ {
        stream::unfold(Some((tree, prior_selection)), move |state| {
            let goal = goal.clone();
            let cancel = cancel.clone();
            async move {
                let (mut tree, selection) = state?;
                match tree.is_complete() {
                    Ok(true) => return None,
                    Ok(false) => {}
                    Err(err) => return Some((StepOutcome::terminal(&tree, &err.into()), None)),
                }

                match self.step(&mut tree, &goal, selection, &cancel).await {
                    Ok(metrics) => {
                        let outcome = StepOutcome::from_metrics(&tree, &metrics);
                        let next = (!metrics.complete).then(|| (tree, metrics.next_selection));
                        Some((outcome, next))
                    }
                    Err(err) => {
                        error!(error = %err, "stream: step failed, ending stream");
                        Some((StepOutcome::terminal(&tree, &err), None))
                    }
                }
            }
        })
    }

    /// Use the caller's selection when it is still expandable, otherwise select afresh.
    fn resolve_selection(
        &self,
        tree: &PlanTree,
        prior_selection: Option<NodeId>,
    ) -> Result<NodeId, PlannerError> {
        if let Some(prior) = prior_selection {
            let node = tree.lookup(&prior)?;
            if !node.is_terminal() && !node.all_descendants_terminal() {
                return Ok(prior);
            }
            warn!(node_id = %prior, "resolve_selection: prior selection is exhausted");
        }
        tree.next_selection(&self.config)?
            .ok_or(PlannerError::NoSelection)
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T, PlannerError>>,
) -> Result<T, PlannerError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlannerError::Cancelled),
        result = future => result,
    }
}

fn history_of(tree: &PlanTree, node_id: &NodeId) -> Result<Vec<HistoryStep>, PlannerError> {
    Ok(tree
        .history(node_id)?
        .into_iter()
        .map(HistoryStep::from_node)
        .collect())
}

fn take_candidates(
    mut drafts: Vec<StepContent>,
    sample_count: usize,
) -> Result<Vec<StepContent>, PlannerError> {
    if drafts.is_empty() {
        return Err(PlannerError::Generation(
            "generator returned no candidates".to_string(),
        ));
    }
    if drafts.len() > sample_count {
        warn!(
            expected = sample_count,
            got = drafts.len(),
            "take_candidates: dropping extra candidates"
        );
        drafts.truncate(sample_count);
    }
    Ok(drafts)
}

/// Map dependency ids from history step ids to structural node ids.
/// Ids that name no step in the history are dropped.
fn resolve_dependencies(
    tree: &PlanTree,
    parent_id: &NodeId,
    drafts: Vec<StepContent>,
) -> Result<Vec<StepContent>, PlannerError> {
    let history = tree.history(parent_id)?;
    Ok(drafts
        .into_iter()
        .map(|mut draft| {
            let parent_ids = draft
                .parent_ids
                .iter()
                .filter_map(|id| {
                    let found = history
                        .iter()
                        .find(|node| node.step_id().to_string() == *id || node.id().as_str() == id);
                    if found.is_none() {
                        warn!(label = %draft.label, dependency = %id, "resolve_dependencies: unknown id dropped");
                    }
                    found.map(|node| node.id().to_string())
                })
                .collect();
            draft.parent_ids = parent_ids;
            draft
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use goaltree_core::TERMINAL_LABEL;

    use super::*;

    fn step(label: &str, parent_ids: &[&str]) -> StepContent {
        StepContent {
            label: label.to_string(),
            description: String::new(),
            explanation: String::new(),
            parent_ids: parent_ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    #[test]
    fn dependencies_map_to_structural_ids() {
        let mut tree = PlanTree::new();
        let root = tree.root_id().clone();
        let first = tree.add_children(&root, vec![step("Collect", &[])]).expect("add");
        let second = tree
            .add_children(&first[0], vec![step("Clean", &[])])
            .expect("add");

        let resolved = resolve_dependencies(
            &tree,
            &second[0],
            vec![step("Train", &["1", "2", "7"])],
        )
        .expect("resolve");
        assert_eq!(
            resolved[0].parent_ids,
            vec![first[0].to_string(), second[0].to_string()]
        );
    }

    #[test]
    fn candidate_lists_are_capped_and_never_empty() {
        let drafts = vec![step("A", &[]), step("B", &[]), step("C", &[])];
        assert_eq!(take_candidates(drafts, 2).expect("take").len(), 2);
        assert!(matches!(
            take_candidates(Vec::new(), 2),
            Err(PlannerError::Generation(_))
        ));
    }

    #[test]
    fn terminal_outcome_has_no_selection() {
        let tree = PlanTree::new();
        let outcome = StepOutcome::terminal(&tree, &PlannerError::NoSelection);
        assert!(outcome.is_terminal_signal());
        assert_eq!(outcome.next_selection, None);
        assert_eq!(outcome.best_path, None);
        assert_eq!(outcome.snapshot, tree.snapshot());
    }

    #[test]
    fn depth_limit_step_is_terminal() {
        let step = depth_limit_step();
        assert_eq!(step.label, TERMINAL_LABEL);
        assert!(step.is_terminal());
    }
}
