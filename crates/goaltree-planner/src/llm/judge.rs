use std::sync::Arc;

use async_trait::async_trait;
use goaltree_core::{Criterion, Score, StepContent, Verdict};
use tracing::{debug, warn};

use crate::{
    PlannerError,
    config::{EvalConfig, FewShotExample, balance_few_shot},
    evaluator::{CriterionJudge, EnsembleFactory, EvalSubject, EvaluationEnsemble},
    llm::{ChatMessage, ChatModel, ChatRequest},
};

const MAX_FEW_SHOT_IMBALANCE: usize = 1;

const ANSWER_FORMAT: &str = "Reply in exactly this format:\n\
    <REASONING>your reasoning in one or two sentences</REASONING>\n\
    <RESULT>Yes or No</RESULT>";

/// Judges one criterion by asking a chat model a Yes/No question.
///
/// Complexity is asked as "is this task complex?" and the answer is flipped,
/// so simple, directly executable steps earn the point.
pub struct LlmJudge {
    criterion: Criterion,
    model: Arc<dyn ChatModel>,
    definition: String,
    examples: Vec<FewShotExample>,
}

impl LlmJudge {
    pub fn new(criterion: Criterion, model: Arc<dyn ChatModel>, config: &EvalConfig) -> Self {
        LlmJudge {
            criterion,
            model,
            definition: config.definitions.get(criterion).to_string(),
            examples: balance_few_shot(config.few_shot.get(criterion), MAX_FEW_SHOT_IMBALANCE),
        }
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    fn flips(&self) -> bool {
        self.criterion == Criterion::Complexity
    }

    fn system_prompt(&self) -> String {
        let task = match self.criterion {
            Criterion::Complexity => {
                "You will be given a task. Decide whether the task is complex."
            }
            Criterion::Coherence => {
                "You will be given a parent part and a child part of a task plan. \
                 Decide whether the child part is coherent with the parent part."
            }
            Criterion::Importance => {
                "You will be given a final task goal and a subtask. \
                 Decide whether the subtask is important for the goal."
            }
        };
        format!(
            "You evaluate steps of a text analytics plan.\n{task}\nDefinition: {}\n{ANSWER_FORMAT}",
            self.definition
        )
    }

    fn question(&self, goal: &str, parent: Option<&StepContent>, child: &StepContent) -> String {
        match self.criterion {
            Criterion::Complexity => render_step(child),
            Criterion::Coherence => format!(
                "- Parent Part: {}\n- Child Part: {}",
                parent.map(render_step).unwrap_or_else(|| goal.to_string()),
                render_step(child)
            ),
            Criterion::Importance => format!(
                "- A final task goal: {goal}\n- A subtask description: {}",
                render_step(child)
            ),
        }
    }

    /// Few-shot examples as prior user/assistant turns.
    /// Examples without a user rationale get one written by the model.
    async fn example_turns(&self, goal: &str) -> Result<Vec<ChatMessage>, PlannerError> {
        let mut turns = Vec::with_capacity(self.examples.len() * 2);
        for example in &self.examples {
            let question = self.question(goal, example.parent.as_ref(), &example.node);
            let reasoning = match example.user_reasoning.as_deref().map(str::trim) {
                Some(reasoning) if !reasoning.is_empty() => reasoning.to_string(),
                _ => self.explain_answer(&question, example.user_evaluation).await?,
            };
            turns.push(ChatMessage::user(question));
            turns.push(ChatMessage::assistant(format!(
                "<REASONING>{reasoning}</REASONING>\n<RESULT>{}</RESULT>",
                yes_no(example.user_evaluation)
            )));
        }
        Ok(turns)
    }

    async fn explain_answer(&self, question: &str, answer: bool) -> Result<String, PlannerError> {
        debug!(criterion = %self.criterion, "explain_answer: called");
        let request = ChatRequest {
            system_prompt: format!(
                "You explain evaluation decisions about {}.\nDefinition: {}",
                self.criterion, self.definition
            ),
            messages: vec![ChatMessage::user(format!(
                "{question}\nThe correct answer is {}. Explain why in one or two sentences.",
                yes_no(answer)
            ))],
            temperature: 0.0,
        };
        let reply = self.model.complete(request).await?;
        Ok(reply.trim().to_string())
    }
}

#[async_trait]
impl CriterionJudge for LlmJudge {
    async fn judge(&self, subject: &EvalSubject) -> Result<Verdict, PlannerError> {
        debug!(
            criterion = %self.criterion,
            model = self.model.name(),
            label = %subject.child.label,
            "judge: called"
        );
        let mut messages = self.example_turns(&subject.goal).await?;
        messages.push(ChatMessage::user(self.question(
            &subject.goal,
            subject.parent.as_ref(),
            &subject.child,
        )));

        let reply = self
            .model
            .complete(ChatRequest {
                system_prompt: self.system_prompt(),
                messages,
                temperature: 0.0,
            })
            .await?;

        let verdict = parse_verdict(&reply, self.flips());
        if verdict.score == Score::Unparsed {
            warn!(
                criterion = %self.criterion,
                model = self.model.name(),
                "judge: reply could not be parsed"
            );
        }
        Ok(verdict)
    }
}

/// Build an ensemble with one judge per criterion for every model.
pub fn llm_ensemble(
    models: &[Arc<dyn ChatModel>],
    config: &EvalConfig,
) -> Result<EvaluationEnsemble, PlannerError> {
    let judges = |criterion: Criterion| -> Vec<Arc<dyn CriterionJudge>> {
        models
            .iter()
            .map(|model| {
                Arc::new(LlmJudge::new(criterion, Arc::clone(model), config))
                    as Arc<dyn CriterionJudge>
            })
            .collect()
    };
    EvaluationEnsemble::new(
        judges(Criterion::Complexity),
        judges(Criterion::Coherence),
        judges(Criterion::Importance),
    )
}

/// Ensemble factory over a fixed set of chat models.
#[derive(Clone)]
pub struct LlmEnsembleFactory {
    models: Vec<Arc<dyn ChatModel>>,
}

impl LlmEnsembleFactory {
    pub fn new(models: Vec<Arc<dyn ChatModel>>) -> Self {
        LlmEnsembleFactory { models }
    }
}

impl EnsembleFactory for LlmEnsembleFactory {
    fn build(&self, config: &EvalConfig) -> Result<EvaluationEnsemble, PlannerError> {
        config.validate()?;
        llm_ensemble(&self.models, config)
    }
}

/// Parse a `<REASONING>…</REASONING><RESULT>Yes|No</RESULT>` reply.
///
/// Anything else is `Score::Unparsed` with the raw reply kept as rationale.
/// `flip` swaps Yes and No.
pub fn parse_verdict(reply: &str, flip: bool) -> Verdict {
    let reasoning = tag_content(reply, "REASONING");
    let result = tag_content(reply, "RESULT");

    let answer = match result {
        Some("Yes") => Some(true),
        Some("No") => Some(false),
        _ => None,
    };

    match (reasoning, answer) {
        (Some(reasoning), Some(answer)) => {
            let score = if answer != flip { Score::Yes } else { Score::No };
            Verdict::new(score, reasoning)
        }
        _ => Verdict::new(Score::Unparsed, reply.trim()),
    }
}

fn tag_content<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    Some(text[start..end].trim())
}

fn render_step(step: &StepContent) -> String {
    format!("Task: {}\nDescription: {}", step.label, step.description)
}

fn yes_no(answer: bool) -> &'static str {
    if answer { "Yes" } else { "No" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::FewShotExamples, llm::mock::ScriptedChatModel};

    fn step(label: &str) -> StepContent {
        StepContent {
            label: label.to_string(),
            description: format!("{label} description"),
            explanation: String::new(),
            parent_ids: Vec::new(),
        }
    }

    fn subject(parent: Option<&str>, child: &str) -> EvalSubject {
        EvalSubject {
            goal: "Build a sentiment classifier".to_string(),
            parent: parent.map(step),
            child: step(child),
        }
    }

    #[test]
    fn well_formed_replies_parse() {
        let verdict = parse_verdict(
            "<REASONING> It follows directly. </REASONING>\n<RESULT>Yes</RESULT>",
            false,
        );
        assert_eq!(verdict, Verdict::new(Score::Yes, "It follows directly."));
    }

    #[test]
    fn flipped_criteria_invert_the_answer() {
        let reply = "<REASONING>One model call.</REASONING><RESULT>No</RESULT>";
        assert_eq!(parse_verdict(reply, true).score, Score::Yes);
        assert_eq!(parse_verdict(reply, false).score, Score::No);
    }

    #[test]
    fn malformed_replies_are_unparsed_not_errors() {
        for reply in [
            "Yes, definitely.",
            "<REASONING>fine</REASONING>",
            "<REASONING>fine</REASONING><RESULT>Maybe</RESULT>",
        ] {
            let verdict = parse_verdict(reply, false);
            assert_eq!(verdict.score, Score::Unparsed);
            assert_eq!(verdict.rationale, reply.trim());
        }
    }

    #[tokio::test]
    async fn coherence_question_uses_goal_for_root_children() {
        let model = Arc::new(ScriptedChatModel::new(vec![
            "<REASONING>ok</REASONING><RESULT>Yes</RESULT>",
        ]));
        let judge = LlmJudge::new(Criterion::Coherence, model.clone(), &EvalConfig::default());

        let verdict = judge
            .judge(&subject(None, "Collect reviews"))
            .await
            .expect("judge");
        assert_eq!(verdict.score, Score::Yes);

        let request = &model.requests()[0];
        let question = &request.messages[0].content;
        assert!(question.contains("- Parent Part: Build a sentiment classifier"));
        assert!(question.contains("Task: Collect reviews"));
        assert!(request.system_prompt.contains(&EvalConfig::default().definitions.coherence));
    }

    #[tokio::test]
    async fn complexity_judgments_reward_simple_steps() {
        let model = Arc::new(ScriptedChatModel::new(vec![
            "<REASONING>A single classifier call.</REASONING><RESULT>No</RESULT>",
        ]));
        let judge = LlmJudge::new(Criterion::Complexity, model, &EvalConfig::default());

        let verdict = judge
            .judge(&subject(Some("Collect reviews"), "Tokenize"))
            .await
            .expect("judge");
        assert_eq!(verdict.score, Score::Yes);
        assert_eq!(verdict.rationale, "A single classifier call.");
    }

    #[tokio::test]
    async fn few_shot_examples_become_prior_turns() {
        let model = Arc::new(ScriptedChatModel::new(vec![
            "Because the goal needs labelled data.",
            "<REASONING>ok</REASONING><RESULT>No</RESULT>",
        ]));
        let config = EvalConfig {
            few_shot: FewShotExamples {
                importance: vec![
                    FewShotExample {
                        node: step("Label data"),
                        parent: None,
                        user_evaluation: true,
                        user_reasoning: None,
                    },
                    FewShotExample {
                        node: step("Email the team"),
                        parent: None,
                        user_evaluation: false,
                        user_reasoning: Some("Communication is optional.".to_string()),
                    },
                ],
                ..FewShotExamples::default()
            },
            ..EvalConfig::default()
        };
        let judge = LlmJudge::new(Criterion::Importance, model.clone(), &config);

        let verdict = judge
            .judge(&subject(None, "Write a poem"))
            .await
            .expect("judge");
        assert_eq!(verdict.score, Score::No);
        assert_eq!(model.call_count(), 2);

        let messages = &model.requests()[1].messages;
        assert_eq!(messages.len(), 5);
        assert_eq!(
            messages[1].content,
            "<REASONING>Because the goal needs labelled data.</REASONING>\n<RESULT>Yes</RESULT>"
        );
        assert!(messages[3].content.contains("Communication is optional."));
        assert!(messages[4].content.contains("Write a poem"));
    }

    #[tokio::test]
    async fn model_failures_propagate() {
        let model = Arc::new(ScriptedChatModel::new(vec![]));
        let judge = LlmJudge::new(Criterion::Importance, model, &EvalConfig::default());
        let err = judge
            .judge(&subject(None, "Anything"))
            .await
            .expect_err("no replies left");
        assert!(matches!(err, PlannerError::Model(_)));
    }

    #[test]
    fn ensembles_have_one_judge_per_model() {
        let models: Vec<Arc<dyn ChatModel>> = vec![
            Arc::new(ScriptedChatModel::new(vec![])),
            Arc::new(ScriptedChatModel::new(vec![])),
        ];
        let ensemble = llm_ensemble(&models, &EvalConfig::default()).expect("ensemble");
        assert_eq!(ensemble.evaluator_count(), 2);
        assert!(llm_ensemble(&[], &EvalConfig::default()).is_err());
    }
}
