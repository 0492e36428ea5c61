use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use futures::{Stream, stream};
use goaltree_core::{BestPath, NodeId, PlanTree, TreeSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    PlannerError,
    config::EvalConfig,
    engine::{Planner, StepOutcome},
    evaluator::EnsembleFactory,
};

/// Everything a session keeps between client round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub goal: String,
    pub snapshot: TreeSnapshot,
    pub next_selection: Option<NodeId>,
    pub best_path: Option<BestPath>,
    /// Session-specific criterion definitions and few-shot examples.
    /// `None` scores with the planner's own ensemble.
    #[serde(default)]
    pub eval_config: Option<EvalConfig>,
}

/// Keyed storage for session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, PlannerError>;

    async fn put(&self, session_id: &str, state: SessionState) -> Result<(), PlannerError>;

    /// Remove a session, returning its last state if it existed.
    async fn delete(&self, session_id: &str) -> Result<Option<SessionState>, PlannerError>;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, PlannerError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn put(&self, session_id: &str, state: SessionState) -> Result<(), PlannerError> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<Option<SessionState>, PlannerError> {
        Ok(self.sessions.write().await.remove(session_id))
    }
}

/// One engine step per call, with all state round-tripping through the session store.
pub struct SessionDriver<S> {
    planner: Planner,
    store: S,
    ensembles: Option<Arc<dyn EnsembleFactory>>,
}

impl<S: SessionStore> SessionDriver<S> {
    pub fn new(planner: Planner, store: S) -> Self {
        SessionDriver {
            planner,
            store,
            ensembles: None,
        }
    }

    /// Allow sessions to carry their own evaluator config, scored by ensembles from `factory`.
    pub fn with_ensemble_factory(mut self, factory: impl EnsembleFactory + 'static) -> Self {
        self.ensembles = Some(Arc::new(factory));
        self
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a session with a fresh tree. The root is the first selection.
    pub async fn start(&self, session_id: &str, goal: &str) -> Result<SessionState, PlannerError> {
        self.create(session_id, goal, None).await
    }

    /// Create a session whose judges use `eval_config` instead of the planner's ensemble.
    pub async fn start_with_eval_config(
        &self,
        session_id: &str,
        goal: &str,
        eval_config: EvalConfig,
    ) -> Result<SessionState, PlannerError> {
        self.check_eval_config(&eval_config)?;
        self.create(session_id, goal, Some(eval_config)).await
    }

    async fn create(
        &self,
        session_id: &str,
        goal: &str,
        eval_config: Option<EvalConfig>,
    ) -> Result<SessionState, PlannerError> {
        let tree = self.planner.init_search();
        let state = SessionState {
            goal: goal.to_string(),
            snapshot: tree.snapshot(),
            next_selection: tree.next_selection(self.planner.config())?,
            best_path: None,
            eval_config,
        };
        self.store.put(session_id, state.clone()).await?;
        info!(
            session_id,
            goal,
            custom_eval = state.eval_config.is_some(),
            "start: session created"
        );
        Ok(state)
    }

    /// Replace (or with `None`, drop) the session's evaluator config.
    /// Nodes already scored keep their evaluations.
    pub async fn set_eval_config(
        &self,
        session_id: &str,
        eval_config: Option<EvalConfig>,
    ) -> Result<SessionState, PlannerError> {
        if let Some(config) = &eval_config {
            self.check_eval_config(config)?;
        }
        let (mut state, _) = self.load(session_id).await?;
        state.eval_config = eval_config;
        self.store.put(session_id, state.clone()).await?;
        info!(
            session_id,
            custom_eval = state.eval_config.is_some(),
            "set_eval_config: stored"
        );
        Ok(state)
    }

    fn check_eval_config(&self, eval_config: &EvalConfig) -> Result<(), PlannerError> {
        if self.ensembles.is_none() {
            return Err(missing_factory());
        }
        eval_config.validate()
    }

    /// The planner scoring with the session's own ensemble, if it has one.
    fn planner_for(&self, state: &SessionState) -> Result<Planner, PlannerError> {
        match (&state.eval_config, &self.ensembles) {
            (None, _) => Ok(self.planner.clone()),
            (Some(config), Some(factory)) => Ok(self.planner.with_ensemble(factory.build(config)?)),
            (Some(_), None) => Err(missing_factory()),
        }
    }

    async fn load(&self, session_id: &str) -> Result<(SessionState, PlanTree), PlannerError> {
        let state = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| PlannerError::UnknownSession {
                session_id: session_id.to_string(),
            })?;
        let tree = self.planner.rehydrate(state.snapshot.clone())?;
        Ok((state, tree))
    }

    async fn persist(
        &self,
        session_id: &str,
        previous: SessionState,
        outcome: &StepOutcome,
    ) -> Result<(), PlannerError> {
        let state = SessionState {
            goal: previous.goal,
            snapshot: outcome.snapshot.clone(),
            next_selection: outcome.next_selection.clone(),
            best_path: outcome.best_path.clone(),
            eval_config: previous.eval_config,
        };
        self.store.put(session_id, state).await
    }

    /// Run exactly one engine step for the session.
    ///
    /// Engine failures come back as the terminal signal and leave the stored state untouched.
    /// Only a missing session or a failing store is an `Err`.
    pub async fn advance(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, PlannerError> {
        let (state, mut tree) = self.load(session_id).await?;
        if tree.is_complete()? {
            debug!(session_id, "advance: search already complete");
            return Ok(StepOutcome {
                snapshot: state.snapshot,
                next_selection: None,
                best_path: state.best_path,
                complete: true,
                error: None,
            });
        }

        let result = match self.planner_for(&state) {
            Ok(planner) => {
                planner
                    .step(&mut tree, &state.goal, state.next_selection.clone(), cancel)
                    .await
            }
            Err(err) => Err(err),
        };
        match result {
            Ok(metrics) => {
                let outcome = StepOutcome::from_metrics(&tree, &metrics);
                self.persist(session_id, state, &outcome).await?;
                info!(
                    session_id,
                    nodes = outcome.snapshot.node_count,
                    complete = outcome.complete,
                    "advance: step persisted"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(session_id, error = %err, "advance: step failed");
                Ok(StepOutcome::terminal(&tree, &err))
            }
        }
    }

    /// Regenerate one node. Failures are returned as errors and nothing is persisted.
    pub async fn regenerate(
        &self,
        session_id: &str,
        node_id: &NodeId,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, PlannerError> {
        let (state, mut tree) = self.load(session_id).await?;
        let metrics = self
            .planner_for(&state)?
            .regenerate(&mut tree, node_id, &state.goal, cancel)
            .await?;
        let outcome = StepOutcome::from_metrics(&tree, &metrics);
        self.persist(session_id, state, &outcome).await?;
        info!(session_id, node_id = %node_id, "regenerate: persisted");
        Ok(outcome)
    }

    /// Advance until the search completes, yielding each step's outcome.
    ///
    /// The stream ends after the completing step, after a terminal signal,
    /// or after an `Err` for a missing session.
    pub fn stream<'a>(
        &'a self,
        session_id: &'a str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<StepOutcome, PlannerError>> + 'a {
        stream::unfold(false, move |finished| {
            let cancel = cancel.clone();
            async move {
                if finished {
                    return None;
                }
                match self.load(session_id).await {
                    Ok((_, tree)) => match tree.is_complete() {
                        Ok(true) => return None,
                        Ok(false) => {}
                        Err(err) => return Some((Err(err.into()), true)),
                    },
                    Err(err) => return Some((Err(err), true)),
                }
                match self.advance(session_id, &cancel).await {
                    Ok(outcome) => {
                        let done = outcome.complete || outcome.is_terminal_signal();
                        Some((Ok(outcome), done))
                    }
                    Err(err) => Some((Err(err), true)),
                }
            }
        })
    }

    /// Drop the session.
    pub async fn end(&self, session_id: &str) -> Result<Option<SessionState>, PlannerError> {
        let removed = self.store.delete(session_id).await?;
        info!(session_id, existed = removed.is_some(), "end: session removed");
        Ok(removed)
    }
}

fn missing_factory() -> PlannerError {
    PlannerError::Evaluation("session evaluator config needs an ensemble factory".to_string())
}
