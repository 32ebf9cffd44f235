//! Tool registry, argument validation and dispatch.
//!
//! The agent exposes a fixed set of tools, identified by [`ToolId`]. Each
//! [`ToolSpec`] binds an id to a parameter schema and a [`ToolHandler`]. The
//! [`Dispatcher`] turns every outcome of a model's tool call, including
//! failures, into a [`ToolResult`] the model can read.

mod dispatcher;
mod error;
mod github;
mod registry;
mod schema;

pub use dispatcher::Dispatcher;
pub use error::{RegistryError, ToolError};
pub use github::github_toolset;
pub use registry::{ToolInfo, ToolRegistry};
pub use schema::{ParamKind, ParamSpec, ToolArgs};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The tools this agent knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolId {
    GetUserRepositories,
    GetRecentCommits,
    SearchRepositories,
}

impl ToolId {
    pub const ALL: [ToolId; 3] = [
        ToolId::GetUserRepositories,
        ToolId::GetRecentCommits,
        ToolId::SearchRepositories,
    ];

    /// Name used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::GetUserRepositories => "get_user_repositories",
            Self::GetRecentCommits => "get_recent_commits",
            Self::SearchRepositories => "search_repositories",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| RegistryError::UnknownTool(s.to_string()))
    }
}

/// Executable behind a tool. Receives arguments that already passed schema
/// validation, with defaults filled in.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError>;
}

/// Everything the registry knows about one tool.
#[derive(Clone)]
pub struct ToolSpec {
    pub id: ToolId,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ToolSpec {
    pub fn new(
        id: ToolId,
        description: impl Into<String>,
        params: Vec<ParamSpec>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            params,
            handler,
        }
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    /// JSON schema for the function-calling `parameters` field.
    pub fn parameters_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tool description as sent to the chat backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Outcome of one tool call, always produced, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, payload: Value) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            payload,
        }
    }

    pub fn error(call_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            payload: json!({
                "error": {
                    "category": error.category(),
                    "message": error.to_string(),
                }
            }),
        }
    }

    /// Failure category, for unsuccessful results.
    pub fn error_category(&self) -> Option<&str> {
        if self.success {
            return None;
        }
        self.payload["error"]["category"].as_str()
    }

    /// Content of the `tool` message that carries this result.
    pub fn to_message_content(&self) -> String {
        json!({ "success": self.success, "result": self.payload }).to_string()
    }
}
