//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{TaskOutcome, TaskReport};

/// Request to submit a new task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    /// The user's question
    pub query: String,
}

/// Terminal task status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task completed with a final answer
    Completed,
    /// Task failed with an error
    Failed,
    /// Task was cancelled
    Cancelled,
}

/// Result of a task run to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultResponse {
    /// Unique task identifier
    pub id: Uuid,

    /// Terminal status
    pub status: TaskStatus,

    /// Final answer or error message
    pub result: Option<String>,

    /// Tool rounds used
    pub rounds: usize,
}

impl From<TaskReport> for TaskResultResponse {
    fn from(report: TaskReport) -> Self {
        let (status, result) = match report.outcome {
            TaskOutcome::Final { answer } => (TaskStatus::Completed, Some(answer)),
            TaskOutcome::Failed(e) => (TaskStatus::Failed, Some(e.to_string())),
            TaskOutcome::Cancelled => (TaskStatus::Cancelled, None),
        };
        Self {
            id: report.task_id,
            status,
            result,
            rounds: report.rounds,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}
