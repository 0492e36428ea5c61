#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use goaltree_core::{Score, SearchConfig, StepContent, TERMINAL_LABEL, Verdict};
use goaltree_planner::{
    CriterionJudge, EvalSubject, EvaluationEnsemble, HistoryStep, Planner, PlannerError,
    StepGenerator,
};

pub const GOAL: &str = "Build a sentiment classifier";

pub fn step(label: &str) -> StepContent {
    StepContent {
        label: label.to_string(),
        description: format!("{label} description"),
        explanation: format!("{label} explanation"),
        parent_ids: Vec::new(),
    }
}

pub fn end_step() -> StepContent {
    step(TERMINAL_LABEL)
}

/// Arguments of one `generate_steps` call.
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub history: Vec<HistoryStep>,
    pub remaining_depth: usize,
    pub sample_count: usize,
}

/// Hands out pre-scripted batches in order; fails once they run out.
#[derive(Default)]
pub struct ScriptedGenerator {
    batches: Mutex<VecDeque<Vec<StepContent>>>,
    calls: Mutex<Vec<GenerateCall>>,
    pending: bool,
}

impl ScriptedGenerator {
    pub fn new(batches: Vec<Vec<StepContent>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            ..Self::default()
        }
    }

    /// A generator whose calls never complete.
    pub fn pending() -> Self {
        Self {
            pending: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl StepGenerator for ScriptedGenerator {
    async fn generate_steps(
        &self,
        _goal: &str,
        history: &[HistoryStep],
        remaining_depth: usize,
        sample_count: usize,
    ) -> Result<Vec<StepContent>, PlannerError> {
        self.calls.lock().expect("calls lock").push(GenerateCall {
            history: history.to_vec(),
            remaining_depth,
            sample_count,
        });
        if self.pending {
            std::future::pending::<()>().await;
        }
        self.batches
            .lock()
            .expect("batches lock")
            .pop_front()
            .ok_or_else(|| PlannerError::Generation("script exhausted".to_string()))
    }
}

type ScoreFn = dyn Fn(&EvalSubject) -> Score + Send + Sync;

/// Scores with a closure and uses the child label as rationale.
pub struct FnJudge {
    score: Box<ScoreFn>,
    delay_for: Option<(String, Duration)>,
    calls: AtomicUsize,
}

impl FnJudge {
    pub fn new(score: impl Fn(&EvalSubject) -> Score + Send + Sync + 'static) -> Self {
        Self {
            score: Box::new(score),
            delay_for: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(score: Score) -> Arc<dyn CriterionJudge> {
        Arc::new(Self::new(move |_| score))
    }

    /// Sleep before answering for the child with this label.
    pub fn delayed(mut self, label: &str, delay: Duration) -> Self {
        self.delay_for = Some((label.to_string(), delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CriterionJudge for FnJudge {
    async fn judge(&self, subject: &EvalSubject) -> Result<Verdict, PlannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((label, delay)) = &self.delay_for {
            if *label == subject.child.label {
                tokio::time::sleep(*delay).await;
            }
        }
        Ok(Verdict::new(
            (self.score)(subject),
            subject.child.label.clone(),
        ))
    }
}

/// A judge that never answers.
pub struct PendingJudge;

#[async_trait]
impl CriterionJudge for PendingJudge {
    async fn judge(&self, _subject: &EvalSubject) -> Result<Verdict, PlannerError> {
        std::future::pending::<()>().await;
        Err(PlannerError::Evaluation("unreachable".to_string()))
    }
}

pub fn all_yes() -> EvaluationEnsemble {
    EvaluationEnsemble::single(
        FnJudge::always(Score::Yes),
        FnJudge::always(Score::Yes),
        FnJudge::always(Score::Yes),
    )
}

/// Complexity and importance say Yes; coherence says No for the `incoherent` label.
pub fn scenario_ensemble(incoherent: &'static str) -> EvaluationEnsemble {
    EvaluationEnsemble::single(
        FnJudge::always(Score::Yes),
        Arc::new(FnJudge::new(move |subject| {
            if subject.child.label == incoherent {
                Score::No
            } else {
                Score::Yes
            }
        })),
        FnJudge::always(Score::Yes),
    )
}

pub fn planner(generator: Arc<ScriptedGenerator>, ensemble: EvaluationEnsemble) -> Planner {
    planner_with(SearchConfig::default(), generator, ensemble)
}

pub fn planner_with(
    config: SearchConfig,
    generator: Arc<ScriptedGenerator>,
    ensemble: EvaluationEnsemble,
) -> Planner {
    Planner::new(config, generator, ensemble).expect("valid planner")
}
