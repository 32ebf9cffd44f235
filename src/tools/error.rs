use thiserror::Error;

use crate::github::GitHubError;

/// Registry construction and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Recoverable tool failures. These are reported to the model as data and
/// never end a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ToolError {
    /// Stable category name reported to the model.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown-tool",
            Self::InvalidArguments(_) => "invalid-arguments",
            Self::Network(_) => "network",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not-found",
            Self::RateLimited(_) => "rate-limited",
            Self::Upstream(_) => "upstream",
        }
    }
}

impl From<GitHubError> for ToolError {
    fn from(err: GitHubError) -> Self {
        let message = err.to_string();
        match err {
            GitHubError::Network(_) => Self::Network(message),
            GitHubError::Unauthorized(_) => Self::Unauthorized(message),
            GitHubError::NotFound(_) => Self::NotFound(message),
            GitHubError::RateLimited { .. } => Self::RateLimited(message),
            GitHubError::InvalidRequest(_) => Self::InvalidArguments(message),
            GitHubError::Upstream { .. } => Self::Upstream(message),
        }
    }
}
