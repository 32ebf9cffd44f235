//! LLM chat client.
//!
//! The agent loop only depends on [`ChatClient`]; [`OpenRouterClient`] talks
//! to any OpenAI-compatible chat completions endpoint.

mod openrouter;
mod types;

pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::{Conversation, Message};
use crate::tools::ToolDefinition;

/// Failures talking to the model endpoint. Always fatal to the task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatBackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed ({status})")]
    Unauthorized { status: u16 },

    #[error("chat backend returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("chat backend error: {0}")]
    Upstream(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Produces the model's next assistant message for a conversation.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// The returned message either carries text content (a final answer) or
    /// one or more tool calls.
    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<Message, ChatBackendError>;
}
