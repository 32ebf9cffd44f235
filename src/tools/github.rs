//! The GitHub toolset: three read-only queries exposed to the model.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    ParamSpec, RegistryError, ToolArgs, ToolError, ToolHandler, ToolId, ToolRegistry, ToolSpec,
};
use crate::github::{GitHubApi, SearchSort};

const MAX_LIMIT: i64 = 100;
/// Longest look-back window a tool accepts.
const MAX_DAYS: i64 = 3650;
/// Search only returns repositories pushed within this window.
const SEARCH_ACTIVITY_DAYS: i64 = 30;

/// Build the registry holding all GitHub tools bound to `api`.
pub fn github_toolset(api: Arc<dyn GitHubApi>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(ToolSpec::new(
        ToolId::GetUserRepositories,
        "Get a user's repositories with recent updates, most recently updated first.",
        vec![
            ParamSpec::string(
                "username",
                "GitHub username (optional, defaults to the authenticated user)",
            ),
            ParamSpec::integer("days", "Number of days to look back for updates (default: 30)")
                .with_default(json!(30))
                .min(1)
                .max(MAX_DAYS),
            ParamSpec::integer("limit", "Maximum number of repositories to return (default: 10)")
                .with_default(json!(10))
                .min(1),
        ],
        Arc::new(UserRepositories { api: api.clone() }),
    ))?;

    registry.register(ToolSpec::new(
        ToolId::GetRecentCommits,
        "Get recent commits for a repository.",
        vec![
            ParamSpec::string("repo_name", "Repository name in format 'owner/repo'").required(),
            ParamSpec::integer("days", "Number of days to look back for commits (default: 7)")
                .with_default(json!(7))
                .min(1)
                .max(MAX_DAYS),
            ParamSpec::integer("limit", "Maximum number of commits to return (default: 10)")
                .with_default(json!(10))
                .min(1),
        ],
        Arc::new(RecentCommits { api: api.clone() }),
    ))?;

    registry.register(ToolSpec::new(
        ToolId::SearchRepositories,
        "Search for repositories with recent activity.",
        vec![
            ParamSpec::string("query", "Search query for repositories").required(),
            ParamSpec::string(
                "sort",
                "Sort results by: 'updated', 'stars', 'forks' (default: 'updated')",
            )
            .with_default(json!("updated"))
                .one_of(SearchSort::NAMES),
            ParamSpec::integer("limit", "Maximum number of repositories to return (default: 10)")
                .with_default(json!(10))
                .min(1),
        ],
        Arc::new(SearchRepositories { api }),
    ))?;

    Ok(registry)
}

/// Start of a look-back window of `days` days ending now.
fn days_ago(days: i64) -> Result<DateTime<Utc>, ToolError> {
    Duration::try_days(days)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| ToolError::InvalidArguments(format!("'days' is out of range: {}", days)))
}

fn clamp_limit(limit: i64) -> usize {
    limit.clamp(1, MAX_LIMIT) as usize
}

fn to_payload<T: serde::Serialize>(value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Upstream(e.to_string()))
}

/// Split `owner/repo`, rejecting anything else.
fn split_repo_name(repo_name: &str) -> Result<(&str, &str), ToolError> {
    let trimmed = repo_name.trim().trim_matches('/');
    match trimmed.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(ToolError::InvalidArguments(format!(
            "repo_name must look like 'owner/repo', got '{}'",
            repo_name
        ))),
    }
}

struct UserRepositories {
    api: Arc<dyn GitHubApi>,
}

#[derive(Debug, Deserialize)]
struct UserRepositoriesArgs {
    username: Option<String>,
    days: i64,
    limit: i64,
}

#[async_trait]
impl ToolHandler for UserRepositories {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let args: UserRepositoriesArgs = args.parse()?;
        let since = days_ago(args.days)?;
        let username = args.username.as_deref().filter(|u| !u.trim().is_empty());
        let repos = self
            .api
            .user_repositories(username, since, clamp_limit(args.limit))
            .await?;
        to_payload(repos)
    }
}

struct RecentCommits {
    api: Arc<dyn GitHubApi>,
}

#[derive(Debug, Deserialize)]
struct RecentCommitsArgs {
    repo_name: String,
    days: i64,
    limit: i64,
}

#[async_trait]
impl ToolHandler for RecentCommits {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let args: RecentCommitsArgs = args.parse()?;
        let (owner, repo) = split_repo_name(&args.repo_name)?;
        let since = days_ago(args.days)?;
        let commits = self
            .api
            .recent_commits(owner, repo, since, clamp_limit(args.limit))
            .await?;
        to_payload(commits)
    }
}

struct SearchRepositories {
    api: Arc<dyn GitHubApi>,
}

#[derive(Debug, Deserialize)]
struct SearchRepositoriesArgs {
    query: String,
    sort: SearchSort,
    limit: i64,
}

#[async_trait]
impl ToolHandler for SearchRepositories {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let args: SearchRepositoriesArgs = args.parse()?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        let pushed_after = days_ago(SEARCH_ACTIVITY_DAYS)?.format("%Y-%m-%d");
        let query = format!("{} pushed:>={}", args.query.trim(), pushed_after);
        let repos = self
            .api
            .search_repositories(&query, args.sort, clamp_limit(args.limit))
            .await?;
        to_payload(repos)
    }
}
