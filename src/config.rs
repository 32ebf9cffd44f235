//! Configuration management for the GitHub agent.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required. Your OpenRouter API key.
//! - `OPENROUTER_BASE_URL` - Optional. Defaults to `https://openrouter.ai/api/v1`.
//! - `DEFAULT_MODEL` - Optional. The LLM model to use. Defaults to
//!   `anthropic/claude-3.5-sonnet`.
//! - `GITHUB_TOKEN` - Optional. Personal access token; unauthenticated requests get
//!   a lower rate limit.
//! - `GITHUB_API_URL` - Optional. Defaults to `https://api.github.com`.
//! - `HOST` - Optional. Server host. Defaults to `localhost`.
//! - `PORT` - Optional. Server port. Defaults to `10007`.
//! - `MAX_ITERATIONS` - Optional. Maximum tool rounds per task. Defaults to `8`.
//! - `PARALLEL_TOOL_CALLS` - Optional. Dispatch one turn's tool calls concurrently.
//!   Defaults to `true`.
//!
//! Only the binary reads the environment. Everything below `main` receives an
//! explicit [`Config`] (or the pieces of it it needs).

use thiserror::Error;

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// OpenAI-compatible endpoint base (without `/chat/completions`)
    pub llm_base_url: String,

    /// LLM model identifier (OpenRouter format)
    pub model: String,

    /// GitHub token, if any
    pub github_token: Option<String>,

    /// GitHub REST API base URL
    pub github_api_url: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum tool rounds for the agent loop
    pub max_iterations: usize,

    /// Run the tool calls of one model turn concurrently
    pub parallel_tool_calls: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` for unparsable numeric/boolean values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let llm_base_url = lookup("OPENROUTER_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string());

        let model = lookup("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let github_token = lookup("GITHUB_TOKEN").filter(|v| !v.trim().is_empty());

        let github_api_url =
            lookup("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string());

        let host = lookup("HOST").unwrap_or_else(|| "localhost".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "10007".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let max_iterations: usize = lookup("MAX_ITERATIONS")
            .unwrap_or_else(|| DEFAULT_MAX_ITERATIONS.to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("MAX_ITERATIONS".to_string(), format!("{}", e))
            })?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let parallel_tool_calls = lookup("PARALLEL_TOOL_CALLS")
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("PARALLEL_TOOL_CALLS".to_string(), e))
            })
            .transpose()?
            .unwrap_or(true);

        Ok(Self {
            api_key,
            llm_base_url,
            model,
            github_token,
            github_api_url,
            host,
            port,
            max_iterations,
            parallel_tool_calls,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            llm_base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
            model,
            github_token: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            host: "localhost".to_string(),
            port: 10007,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            parallel_tool_calls: true,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
