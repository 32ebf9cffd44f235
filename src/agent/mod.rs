//! Agent module - the tool-calling conversation loop.
//!
//! The agent follows a "tools in a loop" pattern, run as an explicit state
//! machine:
//! 1. Seed the conversation with the system prompt and the user's query
//! 2. Ask the model for its next message, offering the GitHub tools
//! 3. If it requests tool calls, dispatch them and append the results in order
//! 4. Repeat until the model answers in text or the round limit is hit
//!
//! Progress is reported through an ordered [`ProgressEvent`] channel.

mod agent_loop;
mod events;
mod prompt;


pub use agent_loop::{
    Agent, AgentError, LoopSettings, LoopState, TaskHandle, TaskOutcome, TaskReport,
};
pub use events::{ProgressEvent, ProgressKind, StatusStreamer};
pub use prompt::build_system_prompt;
