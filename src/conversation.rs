//! Conversation history for a single task.
//!
//! A [`Conversation`] is append-only. Appends that would leave a tool result
//! without a matching request in the immediately preceding assistant message
//! are rejected, so the history handed to the chat backend is always
//! well-formed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A model-issued request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier assigned by the model (or generated if it omitted one)
    pub id: String,
    /// Tool name as the model spelled it
    pub name: String,
    /// Raw argument payload, validated by the dispatcher before execution
    pub arguments: Value,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Present only on `tool` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message requesting tool calls, optionally with commentary.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("tool message is missing a call identifier")]
    MissingCallId,

    #[error("tool result '{0}' does not answer a call from the preceding assistant message")]
    UnknownCallId(String),

    #[error("tool call '{0}' already has a result")]
    DuplicateResult(String),

    #[error("cannot append {role:?} message while {pending} tool call(s) await results")]
    PendingToolCalls { role: Role, pending: usize },

    #[error("only assistant messages may carry tool calls")]
    MisplacedToolCalls,
}

/// Append-only ordered message history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Seed a conversation with the system instruction and the user's query.
    pub fn seeded(system_prompt: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt), Message::user(query)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message, enforcing the tool-call pairing invariants.
    pub fn push(&mut self, message: Message) -> Result<(), ConversationError> {
        if message.has_tool_calls() && message.role != Role::Assistant {
            return Err(ConversationError::MisplacedToolCalls);
        }

        match message.role {
            Role::Tool => {
                let call_id = message
                    .tool_call_id
                    .as_deref()
                    .ok_or(ConversationError::MissingCallId)?;
                let (issued, answered) = self.open_turn();
                if !issued.iter().any(|id| *id == call_id) {
                    return Err(ConversationError::UnknownCallId(call_id.to_string()));
                }
                if answered.iter().any(|id| *id == call_id) {
                    return Err(ConversationError::DuplicateResult(call_id.to_string()));
                }
            }
            role => {
                let pending = self.pending_tool_calls().len();
                if pending > 0 {
                    return Err(ConversationError::PendingToolCalls { role, pending });
                }
            }
        }

        self.messages.push(message);
        Ok(())
    }

    /// Call identifiers from the latest assistant turn that have no result yet.
    pub fn pending_tool_calls(&self) -> Vec<&str> {
        let (issued, answered) = self.open_turn();
        issued
            .into_iter()
            .filter(|id| !answered.contains(id))
            .collect()
    }

    /// Text of the last assistant message, if it has any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.content.as_deref())
    }

    /// Calls issued by the trailing assistant message and the ids answered
    /// after it. Empty when the history does not end in a tool turn.
    fn open_turn(&self) -> (Vec<&str>, Vec<&str>) {
        let mut answered = Vec::new();
        for message in self.messages.iter().rev() {
            match message.role {
                Role::Tool => {
                    if let Some(id) = message.tool_call_id.as_deref() {
                        answered.push(id);
                    }
                }
                Role::Assistant => {
                    let issued = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
                    return (issued, answered);
                }
                _ => break,
            }
        }
        (Vec::new(), answered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: "get_recent_commits".to_string(),
            arguments: json!({"repo_name": "facebook/react"}),
        }
    }

    #[test]
    fn seeded_conversation_has_system_then_user() {
        let conv = Conversation::seeded("be helpful", "what changed?");
        let roles: Vec<Role> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
    }

    #[test]
    fn tool_results_must_answer_the_preceding_assistant_turn() {
        let mut conv = Conversation::seeded("sys", "q");
        let err = conv.push(Message::tool("call_1", "{}")).unwrap_err();
        assert_eq!(err, ConversationError::UnknownCallId("call_1".to_string()));

        conv.push(Message::assistant_tool_calls(None, vec![call("call_1"), call("call_2")]))
            .unwrap();
        assert_eq!(conv.pending_tool_calls(), vec!["call_1", "call_2"]);

        conv.push(Message::tool("call_1", "{}")).unwrap();
        assert_eq!(
            conv.push(Message::tool("call_1", "{}")).unwrap_err(),
            ConversationError::DuplicateResult("call_1".to_string())
        );
        assert_eq!(
            conv.push(Message::tool("call_9", "{}")).unwrap_err(),
            ConversationError::UnknownCallId("call_9".to_string())
        );
        conv.push(Message::tool("call_2", "{}")).unwrap();
        assert!(conv.pending_tool_calls().is_empty());
    }

    #[test]
    fn cannot_move_on_while_calls_are_unanswered() {
        let mut conv = Conversation::seeded("sys", "q");
        conv.push(Message::assistant_tool_calls(None, vec![call("a")]))
            .unwrap();
        let err = conv.push(Message::assistant("done")).unwrap_err();
        assert_eq!(
            err,
            ConversationError::PendingToolCalls {
                role: Role::Assistant,
                pending: 1
            }
        );
    }

    #[test]
    fn old_call_ids_cannot_be_answered_after_a_new_turn() {
        let mut conv = Conversation::seeded("sys", "q");
        conv.push(Message::assistant_tool_calls(None, vec![call("a")]))
            .unwrap();
        conv.push(Message::tool("a", "{}")).unwrap();
        conv.push(Message::assistant_tool_calls(None, vec![call("b")]))
            .unwrap();
        assert!(matches!(
            conv.push(Message::tool("a", "{}")),
            Err(ConversationError::UnknownCallId(_))
        ));
    }

    #[test]
    fn last_assistant_text_skips_tool_messages() {
        let mut conv = Conversation::seeded("sys", "q");
        assert_eq!(conv.last_assistant_text(), None);
        conv.push(Message::assistant("final answer")).unwrap();
        assert_eq!(conv.last_assistant_text(), Some("final answer"));
    }
}
