//! System prompt for the GitHub agent.

use chrono::{DateTime, Utc};

use crate::tools::ToolRegistry;

/// Build the system prompt with tool descriptions and the current date.
pub fn build_system_prompt(tools: &ToolRegistry, now: DateTime<Utc>) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a GitHub agent that helps users query information about GitHub repositories and recent project updates.

Users will ask about:
- Recent updates to their repositories
- Recent commits in specific repositories
- Repositories with recent activity matching a search
- General GitHub project information

## Available Tools
{tool_descriptions}

## Rules
1. Use the tools to query the GitHub API. Don't guess repository data.
2. If a tool returns an error, read its category. Retry with corrected arguments when the arguments were wrong; otherwise explain the limitation to the user.
3. When displaying repository information, include relevant details:
   - Repository name and description
   - Last updated time
   - Programming language
   - Stars and forks count
   - Recent commit information when available

Today is {today}."#,
        tool_descriptions = tool_descriptions,
        today = now.format("%Y-%m-%d %H:%M UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{Commit, GitHubApi, GitHubError, Repository, SearchSort};
    use crate::tools::github_toolset;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Arc;

    struct NoApi;

    #[async_trait]
    impl GitHubApi for NoApi {
        async fn user_repositories(
            &self,
            _: Option<&str>,
            _: DateTime<Utc>,
            _: usize,
        ) -> Result<Vec<Repository>, GitHubError> {
            Ok(vec![])
        }
        async fn recent_commits(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
            _: usize,
        ) -> Result<Vec<Commit>, GitHubError> {
            Ok(vec![])
        }
        async fn search_repositories(
            &self,
            _: &str,
            _: SearchSort,
            _: usize,
        ) -> Result<Vec<Repository>, GitHubError> {
            Ok(vec![])
        }
    }

    #[test]
    fn prompt_lists_tools_and_date() {
        let registry = github_toolset(Arc::new(NoApi)).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        let prompt = build_system_prompt(&registry, now);

        assert!(prompt.contains("- **get_recent_commits**: Get recent commits for a repository."));
        assert!(prompt.contains("- **search_repositories**"));
        assert!(prompt.contains("Today is 2024-06-01 12:30 UTC."));
    }
}
