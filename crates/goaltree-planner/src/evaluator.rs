use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use goaltree_core::{Criterion, Evaluation, StepContent, Verdict};
use tracing::debug;

use crate::{PlannerError, config::EvalConfig};

/// One (parent, child) pair to be judged against a goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalSubject {
    pub goal: String,
    /// Tree-parent of `child`, `None` when the child hangs directly under the root.
    pub parent: Option<StepContent>,
    pub child: StepContent,
}

/// Judges a single criterion for one subject.
///
/// An unparseable model reply is a valid `Score::Unparsed` verdict, not an error.
/// Errors are reserved for failed calls and abort the whole evaluation batch.
#[async_trait]
pub trait CriterionJudge: Send + Sync {
    async fn judge(&self, subject: &EvalSubject) -> Result<Verdict, PlannerError>;
}

/// Builds the judge ensemble for an evaluator configuration.
///
/// Sessions that carry their own definitions or few-shot examples get an ensemble built
/// from them on every step. Closures taking `&EvalConfig` implement this trait.
pub trait EnsembleFactory: Send + Sync {
    fn build(&self, config: &EvalConfig) -> Result<EvaluationEnsemble, PlannerError>;
}

impl<F> EnsembleFactory for F
where
    F: Fn(&EvalConfig) -> Result<EvaluationEnsemble, PlannerError> + Send + Sync,
{
    fn build(&self, config: &EvalConfig) -> Result<EvaluationEnsemble, PlannerError> {
        self(config)
    }
}

/// Judges grouped per criterion. Every criterion has the same number of members.
#[derive(Clone)]
pub struct EvaluationEnsemble {
    complexity: Vec<Arc<dyn CriterionJudge>>,
    coherence: Vec<Arc<dyn CriterionJudge>>,
    importance: Vec<Arc<dyn CriterionJudge>>,
}

impl std::fmt::Debug for EvaluationEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationEnsemble")
            .field("evaluator_count", &self.evaluator_count())
            .finish()
    }
}

impl EvaluationEnsemble {
    /// Build an ensemble. Fails unless every criterion has the same, non-zero number of judges.
    pub fn new(
        complexity: Vec<Arc<dyn CriterionJudge>>,
        coherence: Vec<Arc<dyn CriterionJudge>>,
        importance: Vec<Arc<dyn CriterionJudge>>,
    ) -> Result<Self, PlannerError> {
        let sizes = [complexity.len(), coherence.len(), importance.len()];
        if sizes[0] == 0 || sizes.iter().any(|size| *size != sizes[0]) {
            return Err(PlannerError::Evaluation(format!(
                "every criterion needs the same non-zero number of judges, got {sizes:?}"
            )));
        }
        Ok(EvaluationEnsemble {
            complexity,
            coherence,
            importance,
        })
    }

    /// Single-evaluator ensemble.
    pub fn single(
        complexity: Arc<dyn CriterionJudge>,
        coherence: Arc<dyn CriterionJudge>,
        importance: Arc<dyn CriterionJudge>,
    ) -> Self {
        EvaluationEnsemble {
            complexity: vec![complexity],
            coherence: vec![coherence],
            importance: vec![importance],
        }
    }

    /// Number of judges consulted per criterion.
    pub fn evaluator_count(&self) -> usize {
        self.complexity.len()
    }

    fn judges(&self, criterion: Criterion) -> &[Arc<dyn CriterionJudge>] {
        match criterion {
            Criterion::Complexity => &self.complexity,
            Criterion::Coherence => &self.coherence,
            Criterion::Importance => &self.importance,
        }
    }

    async fn judge_criterion(
        &self,
        criterion: Criterion,
        subject: &EvalSubject,
    ) -> Result<Vec<Verdict>, PlannerError> {
        try_join_all(
            self.judges(criterion)
                .iter()
                .map(|judge| judge.judge(subject)),
        )
        .await
    }

    /// Judge one subject on all three criteria, every judge call running concurrently.
    pub async fn evaluate(&self, subject: &EvalSubject) -> Result<Evaluation, PlannerError> {
        let (complexity, coherence, importance) = futures::try_join!(
            self.judge_criterion(Criterion::Complexity, subject),
            self.judge_criterion(Criterion::Coherence, subject),
            self.judge_criterion(Criterion::Importance, subject),
        )?;
        Ok(Evaluation {
            complexity,
            coherence,
            importance,
        })
    }

    /// Judge a batch concurrently. Results come back in input order.
    pub async fn evaluate_batch(
        &self,
        subjects: &[EvalSubject],
    ) -> Result<Vec<Evaluation>, PlannerError> {
        debug!(
            subjects = subjects.len(),
            evaluators = self.evaluator_count(),
            "evaluate_batch: called"
        );
        let evaluations = try_join_all(subjects.iter().map(|subject| self.evaluate(subject))).await?;
        debug!(evaluations = evaluations.len(), "evaluate_batch: done");
        Ok(evaluations)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use goaltree_core::Score;

    use super::*;

    /// Answers Yes for labels starting with `yes`, with a delay that finishes later inputs first.
    struct LabelJudge {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CriterionJudge for LabelJudge {
        async fn judge(&self, subject: &EvalSubject) -> Result<Verdict, PlannerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(call as u64 * 5))).await;
            let score = if subject.child.label.starts_with("yes") {
                Score::Yes
            } else {
                Score::No
            };
            Ok(Verdict::new(score, subject.child.label.clone()))
        }
    }

    struct FailingJudge;

    #[async_trait]
    impl CriterionJudge for FailingJudge {
        async fn judge(&self, _subject: &EvalSubject) -> Result<Verdict, PlannerError> {
            Err(PlannerError::Model("connection reset".to_string()))
        }
    }

    fn subject(label: &str) -> EvalSubject {
        EvalSubject {
            goal: "goal".to_string(),
            parent: None,
            child: StepContent {
                label: label.to_string(),
                description: String::new(),
                explanation: String::new(),
                parent_ids: Vec::new(),
            },
        }
    }

    fn label_judge() -> Arc<dyn CriterionJudge> {
        Arc::new(LabelJudge {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn batch_results_keep_input_order() {
        let ensemble = EvaluationEnsemble::single(label_judge(), label_judge(), label_judge());
        let subjects = vec![subject("yes-first"), subject("no-second"), subject("yes-third")];

        let evaluations = ensemble.evaluate_batch(&subjects).await.expect("evaluate");

        let rationales: Vec<&str> = evaluations
            .iter()
            .map(|evaluation| evaluation.coherence[0].rationale.as_str())
            .collect();
        assert_eq!(rationales, vec!["yes-first", "no-second", "yes-third"]);
        assert_eq!(evaluations[0].reward(), 1.0);
        assert_eq!(evaluations[1].reward(), 0.0);
    }

    #[tokio::test]
    async fn ensemble_members_are_summed() {
        let ensemble = EvaluationEnsemble::new(
            vec![label_judge(), label_judge()],
            vec![label_judge(), label_judge()],
            vec![label_judge(), label_judge()],
        )
        .expect("ensemble");

        let evaluation = ensemble.evaluate(&subject("yes")).await.expect("evaluate");
        assert_eq!(evaluation.evaluator_count(), 2);
        assert_eq!(evaluation.reward(), 1.0);
    }

    #[test]
    fn uneven_ensembles_are_rejected() {
        let err = EvaluationEnsemble::new(vec![label_judge()], vec![], vec![label_judge()])
            .expect_err("uneven ensemble");
        assert!(matches!(err, PlannerError::Evaluation(_)));
    }

    #[tokio::test]
    async fn one_failed_call_fails_the_batch() {
        let ensemble =
            EvaluationEnsemble::single(label_judge(), Arc::new(FailingJudge), label_judge());
        let err = ensemble
            .evaluate_batch(&[subject("yes"), subject("no")])
            .await
            .expect_err("batch should fail");
        assert!(matches!(err, PlannerError::Model(_)));
    }
}
