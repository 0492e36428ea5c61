use std::{fmt::Write, sync::Arc};

use async_trait::async_trait;
use goaltree_core::{StepContent, TERMINAL_LABEL};
use serde::{Deserialize, Deserializer, de::Error as _};
use tracing::{debug, warn};

use crate::{
    PlannerError,
    generator::{HistoryStep, StepGenerator},
    llm::{ChatMessage, ChatModel, ChatRequest},
};

const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Step generator that asks a chat model for `{"steps": [...]}` JSON.
pub struct LlmStepGenerator {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl LlmStepGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        LlmStepGenerator {
            model,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn system_prompt(sample_count: usize) -> String {
        format!(
            "You are a text analytics task planner. The user has a collection of documents, \
             describes a goal and lists the steps taken so far.\n\
             Propose the logical next step. Skip practical chores such as data collection, \
             cleaning or visualization and focus on the conceptual step.\n\
             If no further step is needed, use the label \"{TERMINAL_LABEL}\".\n\
             In parentIds list the ids of earlier steps whose output this step directly uses.\n\
             Give {sample_count} different next steps so the user has a choice.\n\
             Reply with JSON only, in this shape:\n\
             {{\"steps\": [{{\"label\": string, \"description\": string, \
             \"explanation\": string, \"parentIds\": string[]}}]}}"
        )
    }

    fn user_message(goal: &str, history: &[HistoryStep], remaining_depth: usize) -> String {
        let mut message = format!("My goal is: {goal}\n");
        if history.is_empty() {
            message.push_str("No steps have been taken yet.\n");
        } else {
            message.push_str("Steps taken so far:\n");
            for step in history {
                let _ = write!(message, "{}. {}: {}", step.id, step.label, step.description);
                if !step.parent_ids.is_empty() {
                    let _ = write!(message, " (uses {})", step.parent_ids.join(", "));
                }
                message.push('\n');
            }
        }
        if remaining_depth <= 1 {
            let _ = write!(
                message,
                "This is the last step that fits in the plan. Prefer \"{TERMINAL_LABEL}\" unless one essential step remains."
            );
        } else {
            let _ = write!(
                message,
                "At most {remaining_depth} more steps fit in the plan."
            );
        }
        message
    }
}

#[async_trait]
impl StepGenerator for LlmStepGenerator {
    async fn generate_steps(
        &self,
        goal: &str,
        history: &[HistoryStep],
        remaining_depth: usize,
        sample_count: usize,
    ) -> Result<Vec<StepContent>, PlannerError> {
        debug!(
            model = self.model.name(),
            history = history.len(),
            remaining_depth,
            sample_count,
            "generate_steps: called"
        );
        let request = ChatRequest {
            system_prompt: Self::system_prompt(sample_count),
            messages: vec![ChatMessage::user(Self::user_message(
                goal,
                history,
                remaining_depth,
            ))],
            temperature: self.temperature,
        };
        let reply = self.model.complete(request).await?;
        let steps = parse_steps(&reply)?;
        if steps.len() != sample_count {
            warn!(
                expected = sample_count,
                got = steps.len(),
                "generate_steps: unexpected candidate count"
            );
        }
        Ok(steps)
    }
}

#[derive(Deserialize)]
struct StepsReply {
    #[serde(alias = "next_steps")]
    steps: Vec<DraftStep>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftStep {
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    explanation: String,
    #[serde(default, deserialize_with = "string_or_number_ids")]
    parent_ids: Vec<String>,
}

fn string_or_number_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Vec::<serde_json::Value>::deserialize(deserializer)?
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(id) => Ok(id),
            serde_json::Value::Number(id) => Ok(id.to_string()),
            other => Err(D::Error::custom(format!("invalid step id {other}"))),
        })
        .collect()
}

/// Parse the JSON object embedded in a model reply. Code fences and chatter around it are ignored.
pub(crate) fn parse_steps(reply: &str) -> Result<Vec<StepContent>, PlannerError> {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(PlannerError::Generation(
                "reply does not contain a JSON object".to_string(),
            ));
        }
    };
    let parsed: StepsReply = serde_json::from_str(json)
        .map_err(|err| PlannerError::Generation(format!("malformed steps JSON: {err}")))?;
    if parsed.steps.is_empty() {
        return Err(PlannerError::Generation("reply contains no steps".to_string()));
    }

    Ok(parsed
        .steps
        .into_iter()
        .map(|draft| StepContent {
            label: draft.label.trim().to_string(),
            description: draft.description,
            explanation: draft.explanation,
            parent_ids: draft.parent_ids,
        })
        .collect())
}
