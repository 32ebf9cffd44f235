//! # GitHub Agent
//!
//! A question-answering agent over public GitHub data.
//!
//! This library provides:
//! - A tool-calling conversation loop driven by an OpenRouter chat model
//! - Three GitHub tools: user repositories, recent commits, repository search
//! - An HTTP API that streams task progress as Server-Sent Events
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Receive a question via the API
//! 2. Build context with the system prompt and the available tools
//! 3. Call the model, dispatch any tool calls it requests
//! 4. Feed results back to the model, repeat until it answers in text
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use github_agent::{agent::Agent, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = Arc::new(Agent::from_config(&config)?);
//! let handle = agent.start("Show me recent commits in facebook/react");
//! let report = handle.join.await?;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod conversation;
pub mod github;
pub mod llm;
pub mod tools;

pub use config::Config;
