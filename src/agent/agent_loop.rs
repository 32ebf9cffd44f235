//! Core agent loop implementation.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_MAX_ITERATIONS};
use crate::conversation::{Conversation, ConversationError, Message, ToolCallRequest};
use crate::github::RestGitHubClient;
use crate::llm::{ChatBackendError, ChatClient, OpenRouterClient};
use crate::tools::{github_toolset, Dispatcher, ToolRegistry, ToolResult};

use super::events::{ProgressEvent, ProgressKind, StatusStreamer};
use super::prompt::build_system_prompt;

/// Fatal task failures.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("chat backend failed: {0}")]
    ChatBackend(#[from] ChatBackendError),

    #[error("no final answer after {limit} tool rounds")]
    IterationLimitExceeded { limit: usize },

    #[error("conversation invariant violated: {0}")]
    Conversation(#[from] ConversationError),
}

/// Loop tuning, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Maximum number of tool rounds before the task fails
    pub max_rounds: usize,
    /// Dispatch one turn's tool calls concurrently
    pub parallel_tool_calls: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ITERATIONS,
            parallel_tool_calls: true,
        }
    }
}

impl From<&Config> for LoopSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_rounds: config.max_iterations,
            parallel_tool_calls: config.parallel_tool_calls,
        }
    }
}

/// States of the conversation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Start,
    AwaitingModel,
    ExecutingTools,
    Final,
    Failed,
}

impl LoopState {
    /// Whether `self -> next` is a legal transition.
    pub fn allows(self, next: LoopState) -> bool {
        use LoopState::*;
        match (self, next) {
            (Final | Failed, _) => false,
            (_, Failed) => true,
            (Start, AwaitingModel) => true,
            (AwaitingModel, ExecutingTools | Final) => true,
            (ExecutingTools, AwaitingModel) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Final | LoopState::Failed)
    }
}

/// How a task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    Final { answer: String },
    Failed(AgentError),
    Cancelled,
}

impl TaskOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            TaskOutcome::Final { answer } => Some(answer),
            _ => None,
        }
    }
}

/// Everything known about a finished task.
#[derive(Debug)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub outcome: TaskOutcome,
    /// State the loop was in when it stopped
    pub last_state: LoopState,
    /// Tool rounds counted (including one that tripped the limit)
    pub rounds: usize,
    pub conversation: Conversation,
}

/// A task running on its own tokio task.
pub struct TaskHandle {
    pub task_id: Uuid,
    pub events: mpsc::UnboundedReceiver<ProgressEvent>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<TaskReport>,
}

impl TaskHandle {
    /// Stop the task. No progress events are emitted once this is observed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Loop position, with the data each state needs.
enum Phase {
    Start,
    AwaitingModel,
    ExecutingTools(Vec<ToolCallRequest>),
    Final(String),
    Failed(AgentError),
}

impl Phase {
    fn state(&self) -> LoopState {
        match self {
            Phase::Start => LoopState::Start,
            Phase::AwaitingModel => LoopState::AwaitingModel,
            Phase::ExecutingTools(_) => LoopState::ExecutingTools,
            Phase::Final(_) => LoopState::Final,
            Phase::Failed(_) => LoopState::Failed,
        }
    }
}

/// The GitHub question-answering agent.
pub struct Agent {
    chat: Arc<dyn ChatClient>,
    dispatcher: Dispatcher,
    settings: LoopSettings,
}

impl Agent {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            chat,
            dispatcher: Dispatcher::new(registry),
            settings,
        }
    }

    /// Wire up the OpenRouter client and the GitHub toolset from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let chat = OpenRouterClient::new(&config.llm_base_url, &config.api_key, &config.model)?;
        let github = RestGitHubClient::new(&config.github_api_url, config.github_token.clone())?;
        let registry = github_toolset(Arc::new(github))?;
        Ok(Self::new(
            Arc::new(chat),
            Arc::new(registry),
            LoopSettings::from(config),
        ))
    }

    /// Spawn a task for `query` and return its progress stream.
    pub fn start(self: &Arc<Self>, query: impl Into<String>) -> TaskHandle {
        let task_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (mut streamer, events) = StatusStreamer::new(task_id, cancel.clone());

        let agent = Arc::clone(self);
        let query = query.into();
        let task_cancel = cancel.clone();
        let join =
            tokio::spawn(async move { agent.run(&query, &mut streamer, &task_cancel).await });

        TaskHandle {
            task_id,
            events,
            cancel,
            join,
        }
    }

    /// Drive one task to a terminal state (or until cancelled).
    pub async fn run(
        &self,
        query: &str,
        streamer: &mut StatusStreamer,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let task_id = streamer.task_id();
        let definitions = self.dispatcher.registry().definitions();
        let mut conversation = Conversation::default();
        let mut rounds = 0usize;
        let mut phase = Phase::Start;

        tracing::info!(%task_id, query = %query, "Task started");

        let (outcome, last_state) = loop {
            let state = phase.state();
            if cancel.is_cancelled() {
                break (TaskOutcome::Cancelled, state);
            }

            let next = match phase {
                Phase::Start => {
                    let prompt = build_system_prompt(self.dispatcher.registry(), Utc::now());
                    conversation = Conversation::seeded(prompt, query);
                    streamer.emit(ProgressKind::Started {
                        query: query.to_string(),
                    });
                    Phase::AwaitingModel
                }
                Phase::AwaitingModel => {
                    streamer.emit(ProgressKind::ModelThinking { round: rounds });
                    let reply = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break (TaskOutcome::Cancelled, state),
                        reply = self.chat.complete(&conversation, &definitions) => reply,
                    };
                    match reply {
                        Ok(message) => self.accept_reply(&mut conversation, message),
                        Err(e) => Phase::Failed(e.into()),
                    }
                }
                Phase::ExecutingTools(calls) => {
                    rounds += 1;
                    if rounds > self.settings.max_rounds {
                        Phase::Failed(AgentError::IterationLimitExceeded {
                            limit: self.settings.max_rounds,
                        })
                    } else {
                        tracing::debug!(
                            %task_id,
                            round = rounds,
                            calls = calls.len(),
                            "Executing tools"
                        );
                        match self
                            .execute_tools(&calls, &mut conversation, streamer, cancel)
                            .await
                        {
                            Some(next) => next,
                            None => break (TaskOutcome::Cancelled, state),
                        }
                    }
                }
                Phase::Final(answer) => {
                    tracing::info!(%task_id, rounds, "Task completed");
                    streamer.emit(ProgressKind::Final {
                        answer: answer.clone(),
                    });
                    break (TaskOutcome::Final { answer }, state);
                }
                Phase::Failed(error) => {
                    tracing::warn!(%task_id, rounds, error = %error, "Task failed");
                    streamer.emit(ProgressKind::Failed {
                        reason: error.to_string(),
                    });
                    break (TaskOutcome::Failed(error), state);
                }
            };

            debug_assert!(
                state.allows(next.state()),
                "illegal transition {:?} -> {:?}",
                state,
                next.state()
            );
            tracing::trace!(%task_id, from = ?state, to = ?next.state(), "Loop transition");
            phase = next;
        };

        if matches!(outcome, TaskOutcome::Cancelled) {
            tracing::info!(%task_id, state = ?last_state, "Task cancelled");
        }

        TaskReport {
            task_id,
            outcome,
            last_state,
            rounds,
            conversation,
        }
    }

    /// Append the model's reply and pick the next phase from it. A reply with
    /// neither text nor tool calls is malformed, whichever client produced it.
    fn accept_reply(&self, conversation: &mut Conversation, message: Message) -> Phase {
        let calls = message.tool_calls.clone();
        let answer = message.content.clone().filter(|t| !t.trim().is_empty());
        if calls.is_empty() && answer.is_none() {
            return Phase::Failed(
                ChatBackendError::MalformedResponse(
                    "assistant message has neither content nor tool calls".to_string(),
                )
                .into(),
            );
        }
        if let Err(e) = conversation.push(message) {
            return Phase::Failed(e.into());
        }
        match answer {
            Some(answer) if calls.is_empty() => Phase::Final(answer),
            _ => Phase::ExecutingTools(calls),
        }
    }

    /// Run one turn's tool calls and append their results in call order.
    /// Returns `None` if the task was cancelled mid-turn.
    async fn execute_tools(
        &self,
        calls: &[ToolCallRequest],
        conversation: &mut Conversation,
        streamer: &mut StatusStreamer,
        cancel: &CancellationToken,
    ) -> Option<Phase> {
        let results = if self.settings.parallel_tool_calls {
            for call in calls {
                emit_invoked(streamer, call);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                results = self.dispatcher.execute_all(calls) => results,
            }
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                emit_invoked(streamer, call);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    result = self.dispatcher.execute(call) => result,
                };
                emit_completed(streamer, call, &result);
                results.push(result);
            }
            results
        };

        for (call, result) in calls.iter().zip(results) {
            if self.settings.parallel_tool_calls {
                emit_completed(streamer, call, &result);
            }
            let message = Message::tool(result.call_id.clone(), result.to_message_content());
            if let Err(e) = conversation.push(message) {
                return Some(Phase::Failed(e.into()));
            }
        }

        if cancel.is_cancelled() {
            return None;
        }
        Some(Phase::AwaitingModel)
    }
}

fn emit_invoked(streamer: &mut StatusStreamer, call: &ToolCallRequest) {
    streamer.emit(ProgressKind::ToolInvoked {
        call_id: call.id.clone(),
        name: call.name.clone(),
        arguments: call.arguments.clone(),
    });
}

fn emit_completed(streamer: &mut StatusStreamer, call: &ToolCallRequest, result: &ToolResult) {
    streamer.emit(ProgressKind::ToolCompleted {
        call_id: call.id.clone(),
        name: call.name.clone(),
        success: result.success,
        error_category: result.error_category().map(str::to_string),
    });
}
