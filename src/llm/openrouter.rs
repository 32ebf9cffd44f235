//! OpenRouter (OpenAI-compatible) chat completions client.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::types::{
    ChatRequest, ChatResponse, WireFunctionCall, WireFunctionDef, WireMessage, WireTool,
    WireToolCall,
};
use super::{ChatBackendError, ChatClient};
use crate::conversation::{Conversation, Message, Role, ToolCallRequest};
use crate::tools::ToolDefinition;

/// Client for `{base_url}/chat/completions` with bearer authentication.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    base_url: String,
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ChatBackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| ChatBackendError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<Message, ChatBackendError> {
        let request = build_request(&self.model, conversation, tools);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("X-Title", "github-agent")
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatBackendError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ChatBackendError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatBackendError::Http {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ChatBackendError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = &body.usage {
            tracing::debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        parse_response(body)
    }
}

/// Convert the conversation and tool list into the wire request.
fn build_request<'a>(
    model: &'a str,
    conversation: &Conversation,
    tools: &'a [ToolDefinition],
) -> ChatRequest<'a> {
    let messages = conversation
        .messages()
        .iter()
        .map(|m| WireMessage {
            role: role_name(m.role).to_string(),
            content: m.content.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: Some(c.id.clone()),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect();

    let tools = tools
        .iter()
        .map(|t| WireTool {
            kind: "function",
            function: WireFunctionDef {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        })
        .collect();

    ChatRequest {
        model,
        messages,
        tools,
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Turn the first choice into an assistant [`Message`].
fn parse_response(body: ChatResponse) -> Result<Message, ChatBackendError> {
    if let Some(err) = body.error {
        return Err(ChatBackendError::Upstream(err.message));
    }

    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatBackendError::MalformedResponse("response has no choices".to_string()))?;
    let message = choice.message;

    let content = message.content.filter(|c| !c.trim().is_empty());
    if message.tool_calls.is_empty() {
        return match content {
            Some(text) => Ok(Message::assistant(text)),
            None => Err(ChatBackendError::MalformedResponse(format!(
                "assistant message has neither content nor tool calls (finish_reason: {})",
                choice.finish_reason.as_deref().unwrap_or("unknown")
            ))),
        };
    }

    // Results are matched to calls by id, so ids must be present and distinct.
    let mut seen = HashSet::new();
    let calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let id = call
                .id
                .filter(|id| !id.is_empty() && !seen.contains(id))
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
            seen.insert(id.clone());
            ToolCallRequest {
                id,
                name: call.function.name,
                arguments: parse_arguments(&call.function.arguments),
            }
        })
        .collect();

    Ok(Message::assistant_tool_calls(content, calls))
}

/// Decode the JSON-encoded argument string. Text that is not JSON is kept as
/// a string so the dispatcher can report it back to the model.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}... [truncated]", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> OpenRouterClient {
        OpenRouterClient::new(server.url_str("/api/v1"), "sk-test", "test/model").unwrap()
    }

    fn conversation() -> Conversation {
        Conversation::seeded("You are a GitHub agent.", "Show commits for facebook/react")
    }

    #[tokio::test]
    async fn text_reply_becomes_final_message() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/v1/chat/completions"),
                request::headers(contains(key("authorization"))),
            ])
            .respond_with(json_encoded(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Here is the summary."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 5}
            }))),
        );

        let message = client_for(&server)
            .complete(&conversation(), &[])
            .await
            .unwrap();
        assert_eq!(message, Message::assistant("Here is the summary."));
    }

    #[tokio::test]
    async fn tool_calls_are_decoded_in_order() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/chat/completions"))
                .respond_with(json_encoded(json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "Let me look that up.",
                            "tool_calls": [
                                {
                                    "id": "call_a",
                                    "type": "function",
                                    "function": {
                                        "name": "get_recent_commits",
                                        "arguments": "{\"repo_name\":\"facebook/react\",\"days\":7}"
                                    }
                                },
                                {
                                    "type": "function",
                                    "function": {
                                        "name": "search_repositories",
                                        "arguments": "not json"
                                    }
                                }
                            ]
                        },
                        "finish_reason": "tool_calls"
                    }]
                }))),
        );

        let message = client_for(&server)
            .complete(&conversation(), &[])
            .await
            .unwrap();

        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content.as_deref(), Some("Let me look that up."));
        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(message.tool_calls[0].id, "call_a");
        assert_eq!(
            message.tool_calls[0].arguments,
            json!({"repo_name": "facebook/react", "days": 7})
        );
        assert!(message.tool_calls[1].id.starts_with("call_"));
        assert_eq!(message.tool_calls[1].arguments, json!("not json"));
    }

    #[tokio::test]
    async fn unauthorized_is_reported() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/chat/completions"))
                .respond_with(status_code(401)),
        );
        let err = client_for(&server)
            .complete(&conversation(), &[])
            .await
            .unwrap_err();
        assert_eq!(err, ChatBackendError::Unauthorized { status: 401 });
    }

    #[tokio::test]
    async fn server_errors_are_reported_with_body() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/chat/completions"))
                .respond_with(status_code(503).body("overloaded")),
        );
        let err = client_for(&server)
            .complete(&conversation(), &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChatBackendError::Http {
                status: 503,
                body: "overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unparsable_body_is_malformed() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/chat/completions"))
                .respond_with(status_code(200).body("<html>gateway</html>")),
        );
        let err = client_for(&server)
            .complete(&conversation(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatBackendError::MalformedResponse(_)));
    }

    #[test]
    fn empty_choice_is_malformed() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "  "}}]
        }))
        .unwrap();
        assert!(matches!(
            parse_response(body),
            Err(ChatBackendError::MalformedResponse(_))
        ));

        let body: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(parse_response(body).is_err());
    }

    #[test]
    fn embedded_error_object_is_upstream_failure() {
        let body: ChatResponse = serde_json::from_value(json!({
            "error": {"message": "model not available", "code": 404}
        }))
        .unwrap();
        assert_eq!(
            parse_response(body).unwrap_err(),
            ChatBackendError::Upstream("model not available".to_string())
        );
    }

    #[test]
    fn request_carries_history_and_tools() {
        let mut conv = conversation();
        conv.push(Message::assistant_tool_calls(
            None,
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "get_recent_commits".into(),
                arguments: json!({"repo_name": "facebook/react"}),
            }],
        ))
        .unwrap();
        conv.push(Message::tool("call_1", "{\"success\":true}")).unwrap();

        let tools = vec![ToolDefinition {
            name: "get_recent_commits".into(),
            description: "Get recent commits".into(),
            parameters: json!({"type": "object"}),
        }];
        let request = serde_json::to_value(build_request("m", &conv, &tools)).unwrap();

        assert_eq!(request["model"], "m");
        let roles: Vec<&str> = request["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(
            request["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"repo_name\":\"facebook/react\"}"
        );
        assert_eq!(request["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(request["tools"][0]["type"], "function");
        assert_eq!(request["tools"][0]["function"]["name"], "get_recent_commits");
    }

    #[test]
    fn repeated_call_ids_are_replaced() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "tool_calls": [
                {"id": "dup", "function": {"name": "search_repositories", "arguments": "{}"}},
                {"id": "dup", "function": {"name": "search_repositories", "arguments": "{}"}}
            ]}}]
        }))
        .unwrap();
        let message = parse_response(body).unwrap();
        assert_eq!(message.content, None);
        assert_eq!(message.tool_calls[0].id, "dup");
        assert_ne!(message.tool_calls[1].id, "dup");
    }

    #[test]
    fn blank_arguments_mean_empty_object() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
    }
}
