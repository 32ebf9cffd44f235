//! GitHub access layer.
//!
//! The tools only talk to GitHub through [`GitHubApi`], so tests can swap in a
//! deterministic stub. [`RestGitHubClient`] is the production implementation
//! over the REST v3 API.

mod client;

pub use client::RestGitHubClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Repository summary returned to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
}

/// Commit summary returned to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Abbreviated SHA (first 8 characters)
    pub sha: String,
    /// First line of the commit message
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub url: String,
}

/// Sort order accepted by repository search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    Updated,
    Stars,
    Forks,
}

impl SearchSort {
    pub const NAMES: &'static [&'static str] = &["updated", "stars", "forks"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Stars => "stars",
            Self::Forks => "forks",
        }
    }
}

/// Faults raised by the GitHub access layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitHubError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded{}", reset_hint(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("GitHub returned {status}: {message}")]
    Upstream { status: u16, message: String },
}

fn reset_hint(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" (resets at {})", at.to_rfc3339()),
        None => String::new(),
    }
}

/// Read-only GitHub queries used by the toolset.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Repositories of `username` (or of the authenticated user), most recently
    /// updated first, keeping only those updated at or after `since`.
    async fn user_repositories(
        &self,
        username: Option<&str>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Repository>, GitHubError>;

    /// Commits on the default branch of `owner/repo` since `since`.
    async fn recent_commits(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Commit>, GitHubError>;

    /// Repository search; `query` is passed through verbatim.
    async fn search_repositories(
        &self,
        query: &str,
        sort: SearchSort,
        limit: usize,
    ) -> Result<Vec<Repository>, GitHubError>;
}
