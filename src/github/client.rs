//! REST v3 implementation of [`GitHubApi`].

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{Commit, GitHubApi, GitHubError, Repository, SearchSort};

const PER_PAGE_MAX: usize = 100;

/// GitHub REST client with optional token authentication.
#[derive(Debug, Clone)]
pub struct RestGitHubClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl RestGitHubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GitHubError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "GitHub request");

        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "github-agent")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| GitHubError::Network(e.to_string()))?;

        let response = check_status(response, path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GitHubError::Upstream {
                status: 200,
                message: format!("malformed response body: {}", e),
            })
    }
}

/// Map non-success statuses onto the fault categories the tools report.
async fn check_status(response: Response, path: &str) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let headers = response.headers().clone();
    let message = response
        .json::<ApiErrorBody>()
        .await
        .map(|b| b.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());

    Err(classify(status, &headers, path, message))
}

fn classify(status: StatusCode, headers: &HeaderMap, path: &str, message: String) -> GitHubError {
    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let reset_at = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    match status {
        StatusCode::TOO_MANY_REQUESTS => GitHubError::RateLimited { reset_at },
        StatusCode::FORBIDDEN if remaining == Some(0) => GitHubError::RateLimited { reset_at },
        StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => {
            GitHubError::RateLimited { reset_at }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GitHubError::Unauthorized(message),
        StatusCode::NOT_FOUND => GitHubError::NotFound(path.to_string()),
        StatusCode::UNPROCESSABLE_ENTITY => GitHubError::InvalidRequest(message),
        other => GitHubError::Upstream {
            status: other.as_u16(),
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    name: String,
    full_name: String,
    description: Option<String>,
    html_url: String,
    updated_at: DateTime<Utc>,
    pushed_at: Option<DateTime<Utc>>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
}

impl From<ApiRepository> for Repository {
    fn from(r: ApiRepository) -> Self {
        Self {
            name: r.name,
            full_name: r.full_name,
            description: r.description,
            url: r.html_url,
            updated_at: r.updated_at,
            pushed_at: r.pushed_at,
            language: r.language,
            stars: r.stargazers_count,
            forks: r.forks_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    html_url: String,
    commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: Option<ApiCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl From<ApiCommit> for Commit {
    fn from(c: ApiCommit) -> Self {
        let (author, date) = match c.commit.author {
            Some(a) => (a.name.unwrap_or_else(|| "unknown".to_string()), a.date),
            None => ("unknown".to_string(), None),
        };
        Self {
            sha: c.sha.chars().take(8).collect(),
            message: c.commit.message.lines().next().unwrap_or_default().to_string(),
            author,
            date,
            url: c.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiSearchResults {
    items: Vec<ApiRepository>,
}

#[async_trait]
impl GitHubApi for RestGitHubClient {
    async fn user_repositories(
        &self,
        username: Option<&str>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Repository>, GitHubError> {
        let path = match username {
            Some(user) => format!("/users/{}/repos", urlencoding::encode(user)),
            None if self.is_authenticated() => "/user/repos".to_string(),
            None => {
                return Err(GitHubError::Unauthorized(
                    "listing your own repositories requires a GitHub token; pass a username instead"
                        .to_string(),
                ))
            }
        };

        let query = [
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
            ("per_page", PER_PAGE_MAX.to_string()),
        ];
        let repos: Vec<ApiRepository> = self.get_json(&path, &query).await?;

        // Sorted newest first, so the first stale repository ends the scan.
        Ok(repos
            .into_iter()
            .take_while(|r| r.updated_at >= since)
            .take(limit)
            .map(Repository::from)
            .collect())
    }

    async fn recent_commits(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Commit>, GitHubError> {
        let path = format!(
            "/repos/{}/{}/commits",
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        );
        let query = [
            ("since", since.to_rfc3339()),
            ("per_page", limit.clamp(1, PER_PAGE_MAX).to_string()),
        ];
        let commits: Vec<ApiCommit> = self.get_json(&path, &query).await?;
        Ok(commits.into_iter().take(limit).map(Commit::from).collect())
    }

    async fn search_repositories(
        &self,
        query: &str,
        sort: SearchSort,
        limit: usize,
    ) -> Result<Vec<Repository>, GitHubError> {
        let params = [
            ("q", query.to_string()),
            ("sort", sort.as_str().to_string()),
            ("order", "desc".to_string()),
            ("per_page", limit.clamp(1, PER_PAGE_MAX).to_string()),
        ];
        let results: ApiSearchResults = self.get_json("/search/repositories", &params).await?;
        Ok(results
            .items
            .into_iter()
            .take(limit)
            .map(Repository::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn repo_json(name: &str, updated_at: &str) -> serde_json::Value {
        json!({
            "name": name,
            "full_name": format!("octocat/{}", name),
            "description": null,
            "html_url": format!("https://github.com/octocat/{}", name),
            "updated_at": updated_at,
            "pushed_at": updated_at,
            "language": "Rust",
            "stargazers_count": 3,
            "forks_count": 1
        })
    }

    fn client_for(server: &Server, token: Option<&str>) -> RestGitHubClient {
        RestGitHubClient::new(server.url_str(""), token.map(str::to_string)).unwrap()
    }

    #[tokio::test]
    async fn commits_are_summarised() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/repos/facebook/react/commits"),
                request::query(url_decoded(contains(("per_page", "2")))),
            ])
            .respond_with(json_encoded(json!([
                {
                    "sha": "0123456789abcdef",
                    "html_url": "https://github.com/facebook/react/commit/0123456789abcdef",
                    "commit": {
                        "message": "Fix hydration bug\n\nLonger body here",
                        "author": {"name": "Dan", "date": "2024-05-01T10:00:00Z"}
                    }
                },
                {
                    "sha": "fedcba9876543210",
                    "html_url": "https://github.com/facebook/react/commit/fedcba9876543210",
                    "commit": {"message": "Bump version", "author": null}
                }
            ]))),
        );

        let client = client_for(&server, None);
        let commits = client
            .recent_commits("facebook", "react", Utc::now() - Duration::days(7), 2)
            .await
            .unwrap();

        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "01234567");
        assert_eq!(commits[0].message, "Fix hydration bug");
        assert_eq!(commits[0].author, "Dan");
        assert_eq!(commits[1].author, "unknown");
        assert!(commits[1].date.is_none());
    }

    #[tokio::test]
    async fn user_repositories_stop_at_the_cutoff() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/users/octocat/repos"))
                .respond_with(json_encoded(json!([
                    repo_json("fresh", "2024-06-10T00:00:00Z"),
                    repo_json("recent", "2024-06-05T00:00:00Z"),
                    repo_json("stale", "2023-01-01T00:00:00Z"),
                ]))),
        );

        let since = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let repos = client_for(&server, None)
            .user_repositories(Some("octocat"), since, 10)
            .await
            .unwrap();

        let names: Vec<&str> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["fresh", "recent"]);
        assert_eq!(repos[0].stars, 3);
        assert_eq!(repos[0].url, "https://github.com/octocat/fresh");
    }

    #[tokio::test]
    async fn own_repositories_need_a_token() {
        let server = Server::run();
        let err = client_for(&server, None)
            .user_repositories(None, Utc::now(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn token_enables_own_repositories() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/user/repos"),
                request::headers(contains(key("authorization"))),
            ])
            .respond_with(json_encoded(json!([]))),
        );

        let repos = client_for(&server, Some("ghp_test"))
            .user_repositories(None, Utc::now(), 10)
            .await
            .unwrap();
        assert!(repos.is_empty());
    }

    #[tokio::test]
    async fn missing_repository_maps_to_not_found() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/repos/nobody/nothing/commits"))
                .respond_with(status_code(404).body(r#"{"message":"Not Found"}"#)),
        );

        let err = client_for(&server, None)
            .recent_commits("nobody", "nothing", Utc::now(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::NotFound(_)));
    }

    #[tokio::test]
    async fn exhausted_quota_maps_to_rate_limited() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/search/repositories"))
                .respond_with(
                    status_code(403)
                        .append_header("x-ratelimit-remaining", "0")
                        .append_header("x-ratelimit-reset", "1717200000")
                        .body(r#"{"message":"API rate limit exceeded"}"#),
                ),
        );

        let err = client_for(&server, None)
            .search_repositories("language:rust", SearchSort::Stars, 5)
            .await
            .unwrap_err();
        match err {
            GitHubError::RateLimited { reset_at } => {
                assert_eq!(reset_at.map(|t| t.timestamp()), Some(1_717_200_000));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_credentials_map_to_unauthorized() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/search/repositories"))
                .respond_with(status_code(401).body(r#"{"message":"Bad credentials"}"#)),
        );

        let err = client_for(&server, Some("bad"))
            .search_repositories("tokio", SearchSort::Updated, 5)
            .await
            .unwrap_err();
        assert_eq!(err, GitHubError::Unauthorized("Bad credentials".to_string()));
    }

    #[test]
    fn server_errors_keep_their_status() {
        let err = classify(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            "/search/repositories",
            "Bad Gateway".to_string(),
        );
        assert_eq!(
            err,
            GitHubError::Upstream {
                status: 502,
                message: "Bad Gateway".to_string()
            }
        );
    }
}
