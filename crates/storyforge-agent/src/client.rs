// ABOUTME: CompletionClient trait and the OpenAI-compatible adapter behind it.
// ABOUTME: Translates transcripts + tool schemas into chat-completion calls and parses replies.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o";
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f64 = 0.7;

/// One entry of the ordered message list sent to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A full completion request: transcript plus the tool schemas the calling
/// agent is permitted to use. Tool choice is "auto" whenever schemas are
/// present.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tool_schemas: Vec<Value>,
}

/// A tool invocation requested by the model, with its arguments already
/// decoded from the wire's JSON-encoded string.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// What the completion service produced: free text, tool invocations, or both.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl CompletionResponse {
    /// A text-only response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A response containing a single tool invocation.
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolInvocation {
                name: name.into(),
                arguments,
            }],
        }
    }
}

/// Errors from the external completion service.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limited")]
    RateLimited,
}

/// The external text-generation capability. One call per agent turn; the
/// adapter owns transport concerns, the core never retries transport errors.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, req: &CompletionRequest)
    -> Result<CompletionResponse, CompletionError>;

    /// Provider name for logging and display.
    fn provider_name(&self) -> &str;
}

/// Adapter for OpenAI-compatible chat-completion APIs.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Read configuration from the environment.
    /// Required: `OPENAI_API_KEY`. Optional: `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, CompletionError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| CompletionError::Provider("OPENAI_API_KEY not set".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(api_key, base_url))
    }

    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    /// Build the JSON request body for the chat-completions endpoint.
    pub fn build_request_body(req: &CompletionRequest) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = json!({
            "model": req.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "messages": messages,
        });

        if !req.tool_schemas.is_empty() {
            let tools: Vec<Value> = req
                .tool_schemas
                .iter()
                .map(|schema| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": schema.get("name").cloned().unwrap_or(Value::Null),
                            "description": schema.get("description").cloned().unwrap_or(Value::Null),
                            "parameters": schema
                                .get("parameters")
                                .cloned()
                                .unwrap_or(json!({ "type": "object" })),
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = Value::String("auto".to_string());
        }

        body
    }

    /// Parse a chat-completions response body into a CompletionResponse.
    pub fn parse_response(response_body: &Value) -> Result<CompletionResponse, CompletionError> {
        let choice = response_body
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| {
                CompletionError::InvalidResponse("missing choices in response".to_string())
            })?;

        let message = choice.get("message").ok_or_else(|| {
            CompletionError::InvalidResponse("missing message in choice".to_string())
        })?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(String::from);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                tool_calls.push(parse_tool_call(call)?);
            }
        }

        if content.is_none() && tool_calls.is_empty() {
            return Err(CompletionError::InvalidResponse(
                "no content or tool calls in response".to_string(),
            ));
        }

        Ok(CompletionResponse {
            content,
            tool_calls,
        })
    }
}

fn parse_tool_call(call: &Value) -> Result<ToolInvocation, CompletionError> {
    let function = call.get("function").ok_or_else(|| {
        CompletionError::InvalidResponse("tool_call missing function".to_string())
    })?;

    let name = function
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| CompletionError::InvalidResponse("function missing name".to_string()))?
        .to_string();

    let arguments_str = function
        .get("arguments")
        .and_then(|a| a.as_str())
        .unwrap_or("{}");

    let arguments: Value = serde_json::from_str(arguments_str).map_err(|e| {
        CompletionError::InvalidResponse(format!("failed to parse function arguments: {e}"))
    })?;

    Ok(ToolInvocation { name, arguments })
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let body = Self::build_request_body(req);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Provider(format!("HTTP request failed: {e}")))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CompletionError::Provider(
                "Unauthorized: check OPENAI_API_KEY".to_string(),
            ));
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Provider(format!(
                "API error {status}: {error_body}"
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(format!("failed to parse JSON: {e}")))?;

        Self::parse_response(&response_body)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Create a completion client for the given provider name.
///
/// Returns a tuple of (client, resolved_model). The model is resolved from:
/// 1. The explicit `model` parameter (if Some)
/// 2. The provider's model environment variable (e.g. OPENAI_MODEL)
/// 3. The provider's default
pub fn create_completion_client(
    provider: &str,
    model: Option<&str>,
) -> Result<(Arc<dyn CompletionClient>, String), anyhow::Error> {
    match provider {
        "openai" => {
            let client = OpenAiClient::from_env()
                .map_err(|e| anyhow::anyhow!("failed to configure openai client: {e}"))?;
            let resolved_model = model
                .map(String::from)
                .or_else(|| env::var("OPENAI_MODEL").ok())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
            Ok((Arc::new(client), resolved_model))
        }
        unknown => Err(anyhow::anyhow!("unsupported completion provider: {unknown}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(schemas: Vec<Value>) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![
                ChatMessage::new("system", "You are a Technical Analyst."),
                ChatMessage::new("user", "Optimize this story."),
            ],
            tool_schemas: schemas,
        }
    }

    #[test]
    fn request_body_without_tools_omits_tool_choice() {
        let body = OpenAiClient::build_request_body(&sample_request(vec![]));
        assert_eq!(body.get("model").and_then(|m| m.as_str()), Some("gpt-4o"));
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());

        let messages = body.get("messages").and_then(|m| m.as_array()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
    }

    #[test]
    fn request_body_with_tools_sets_auto_choice() {
        let schema = json!({
            "name": "look_up_item",
            "description": "Look up an item.",
            "parameters": { "type": "object", "properties": {}, "required": [] }
        });
        let body = OpenAiClient::build_request_body(&sample_request(vec![schema]));

        assert_eq!(body["tool_choice"], "auto");
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "look_up_item");
    }

    #[test]
    fn parses_text_response() {
        let response = json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Here is my analysis." },
                "finish_reason": "stop"
            }]
        });

        let parsed = OpenAiClient::parse_response(&response).unwrap();
        assert_eq!(parsed.content.as_deref(), Some("Here is my analysis."));
        assert!(parsed.tool_calls.is_empty());
    }

    #[test]
    fn parses_multiple_tool_calls_in_order() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "look_up_item", "arguments": "{\"item_id\": \"42\"}" }
                        },
                        {
                            "id": "call_2",
                            "type": "function",
                            "function": { "name": "transfer_to_master", "arguments": "{}" }
                        }
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });

        let parsed = OpenAiClient::parse_response(&response).unwrap();
        assert!(parsed.content.is_none());
        assert_eq!(parsed.tool_calls.len(), 2);
        assert_eq!(parsed.tool_calls[0].name, "look_up_item");
        assert_eq!(parsed.tool_calls[0].arguments["item_id"], "42");
        assert_eq!(parsed.tool_calls[1].name, "transfer_to_master");
    }

    #[test]
    fn rejects_response_without_choices() {
        let response = json!({ "error": "boom" });
        let err = OpenAiClient::parse_response(&response).unwrap_err();
        assert!(err.to_string().contains("missing choices"));
    }

    #[test]
    fn rejects_unparseable_arguments() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "look_up_item", "arguments": "not json" }
                    }]
                }
            }]
        });

        let err = OpenAiClient::parse_response(&response).unwrap_err();
        assert!(err.to_string().contains("arguments"));
    }

    #[test]
    fn rejects_empty_response() {
        let response = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "" }
            }]
        });
        assert!(OpenAiClient::parse_response(&response).is_err());
    }

    #[test]
    fn unknown_provider_returns_error() {
        let result = create_completion_client("unknown", None);
        let err = match result {
            Err(e) => e.to_string(),
            Ok((_, model)) => panic!("expected error, got Ok with model {model}"),
        };
        assert!(err.contains("unsupported completion provider"));
    }
}
