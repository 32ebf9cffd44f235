//! Tool dispatch.

use std::sync::Arc;

use futures::future::join_all;

use super::schema::validate;
use super::{ToolError, ToolRegistry, ToolResult};
use crate::conversation::ToolCallRequest;

/// Validates and runs tool calls against a shared registry.
///
/// `execute` never fails: unknown tools, bad arguments and GitHub faults all
/// come back as unsuccessful [`ToolResult`]s.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a single tool call.
    pub async fn execute(&self, request: &ToolCallRequest) -> ToolResult {
        match self.try_execute(request).await {
            Ok(payload) => {
                tracing::debug!(call_id = %request.id, tool = %request.name, "Tool call succeeded");
                ToolResult::ok(&request.id, payload)
            }
            Err(e) => {
                tracing::warn!(
                    call_id = %request.id,
                    tool = %request.name,
                    category = e.category(),
                    error = %e,
                    "Tool call failed"
                );
                ToolResult::error(&request.id, &e)
            }
        }
    }

    /// Execute several calls concurrently. Results come back in request order.
    pub async fn execute_all(&self, requests: &[ToolCallRequest]) -> Vec<ToolResult> {
        join_all(requests.iter().map(|r| self.execute(r))).await
    }

    async fn try_execute(&self, request: &ToolCallRequest) -> Result<serde_json::Value, ToolError> {
        let spec = self
            .registry
            .lookup(&request.name)
            .map_err(|_| ToolError::UnknownTool(request.name.clone()))?;
        let args = validate(&spec.params, &request.arguments)?;
        spec.handler.call(args).await
    }
}
