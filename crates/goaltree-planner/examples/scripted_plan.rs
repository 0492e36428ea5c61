use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use goaltree_core::{PlanTree, Score, SearchConfig, StepContent, TERMINAL_LABEL, Verdict};
use goaltree_planner::{
    CriterionJudge, EvalSubject, EvaluationEnsemble, HistoryStep, Planner, PlannerError,
    StepGenerator,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Offline generator: proposes canned analysis steps and ends once the budget runs low.
struct CannedGenerator;

const STEPS: [(&str, &str); 4] = [
    ("Collect reviews", "Gather product reviews with star ratings"),
    ("Embed text", "Turn each review into a sentence embedding"),
    ("Train classifier", "Fit a classifier on the embeddings"),
    ("Write a memo", "Summarize the work for stakeholders"),
];

#[async_trait]
impl StepGenerator for CannedGenerator {
    async fn generate_steps(
        &self,
        _goal: &str,
        history: &[HistoryStep],
        remaining_depth: usize,
        sample_count: usize,
    ) -> Result<Vec<StepContent>, PlannerError> {
        let offset = history.len();
        Ok((0..sample_count)
            .map(|i| {
                let (label, description) = if remaining_depth <= 2 || offset + i >= STEPS.len() {
                    (TERMINAL_LABEL, "Plan is complete")
                } else {
                    STEPS[offset + i]
                };
                StepContent {
                    label: label.to_string(),
                    description: description.to_string(),
                    explanation: String::new(),
                    parent_ids: history.last().map(|step| step.id.clone()).into_iter().collect(),
                }
            })
            .collect())
    }
}

/// Keyword judge standing in for a model.
struct KeywordJudge {
    rejects: &'static str,
}

#[async_trait]
impl CriterionJudge for KeywordJudge {
    async fn judge(&self, subject: &EvalSubject) -> Result<Verdict, PlannerError> {
        let score = if subject.child.label.contains(self.rejects) {
            Score::No
        } else {
            Score::Yes
        };
        Ok(Verdict::new(score, format!("keyword check on '{}'", self.rejects)))
    }
}

fn print_tree(tree: &PlanTree) -> Result<(), PlannerError> {
    println!("{}", tree.outline()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SearchConfig::from_default_yaml()?;
    let ensemble = EvaluationEnsemble::single(
        Arc::new(KeywordJudge { rejects: "Train" }),
        Arc::new(KeywordJudge { rejects: "memo" }),
        Arc::new(KeywordJudge { rejects: "memo" }),
    );
    let planner = Planner::new(config, Arc::new(CannedGenerator), ensemble)?;

    let goal = "Build a sentiment classifier".to_string();
    let mut outcomes = Box::pin(planner.stream(
        planner.init_search(),
        goal,
        None,
        CancellationToken::new(),
    ));

    let mut last = None;
    while let Some(outcome) = outcomes.next().await {
        println!(
            "step: {} nodes, next selection {:?}, complete {}",
            outcome.snapshot.node_count, outcome.next_selection, outcome.complete
        );
        last = Some(outcome);
    }

    if let Some(outcome) = last {
        let tree = planner.rehydrate(outcome.snapshot)?;
        print_tree(&tree)?;
        if let Some(best) = tree.best_path()? {
            println!("best path (leaf first): {:?} = {:.3}", best.node_ids, best.value);
        }
    }
    Ok(())
}
