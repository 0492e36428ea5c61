//! Chat-model backed step generator and criterion judges.
//!
//! Transports are not part of this crate: anything implementing [`ChatModel`] plugs in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod decompose;
mod judge;

pub use decompose::LlmStepGenerator;
pub use judge::{LlmEnsembleFactory, LlmJudge, llm_ensemble, parse_verdict};

use crate::PlannerError;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything needed for one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: String,
    /// Prior turns (few-shot examples) followed by the actual question.
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Stateless chat completion: every request carries its whole conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, used in logs.
    fn name(&self) -> &str;

    /// Return the text of the assistant reply.
    async fn complete(&self, request: ChatRequest) -> Result<String, PlannerError>;
}
