//! Anthropic Messages API Adapter
//!
//! Tool calls arrive as `tool_use` content blocks inside the assistant
//! message; results go back as `tool_result` blocks in a user message.

use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{
    error::{BridgeError, Result},
    message::{Conversation, ConversationTurn},
    provider::{GenerationOptions, InvocationResult, ProviderAdapter, ProviderKind, RequestedCall},
    tool::{AnthropicTool, ProviderToolSchema, ToolDescriptor, to_wire_schema},
    ToolRequest,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";

/// Anthropic adapter configuration
#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub api_version: String,
    pub timeout: Option<Duration>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            api_version: API_VERSION.into(),
            timeout: None,
        }
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnthropicConfig {
    /// Read `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL` and `PROVIDER_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: http::credential(ProviderKind::Anthropic.credential_var())?,
            base_url: http::base_url("ANTHROPIC_BASE_URL", DEFAULT_BASE_URL),
            timeout: http::timeout_from_env()?,
            ..Default::default()
        })
    }
}

// Request types

#[derive(Debug, Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

// Response types

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    content: Vec<ResponseContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Anthropic provider adapter
#[derive(Debug)]
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(AnthropicConfig::from_env()?)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key)
                .map_err(|_| BridgeError::Auth("API key contains invalid header characters".into()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.config.api_version)
                .map_err(|_| BridgeError::Config("API version contains invalid header characters".into()))?,
        );
        Ok(headers)
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<InvocationResult> {
        let body = build_request(conversation, tools, options)?;
        let request = self.client.post(self.messages_url()).headers(self.headers()?);

        let response: Response = http::post_json(request, &body).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %options.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = ?response.stop_reason,
                "Anthropic usage"
            );
        }

        Ok(convert_response(response))
    }
}

fn build_request<'a>(
    conversation: &Conversation,
    tools: &[ToolDescriptor],
    options: &'a GenerationOptions,
) -> Result<Request<'a>> {
    let tools = match to_wire_schema(tools, ProviderKind::Anthropic)? {
        ProviderToolSchema::Anthropic(tools) if !tools.is_empty() => Some(tools),
        _ => None,
    };

    Ok(Request {
        model: &options.model,
        max_tokens: options.max_tokens,
        messages: convert_messages(conversation),
        tools,
        temperature: options.temperature,
    })
}

/// Append `block` to the last message when it has the same role
fn push_block(messages: &mut Vec<Message>, role: &'static str, block: ContentBlock) {
    match messages.last_mut() {
        Some(last) if last.role == role => last.content.push(block),
        _ => messages.push(Message {
            role,
            content: vec![block],
        }),
    }
}

fn convert_messages(conversation: &Conversation) -> Vec<Message> {
    let mut messages = Vec::new();

    for turn in conversation.turns() {
        match turn {
            ConversationTurn::User { text } if !text.is_empty() => {
                push_block(&mut messages, "user", ContentBlock::Text { text: text.clone() });
            }
            ConversationTurn::AssistantText { text } if !text.is_empty() => {
                push_block(&mut messages, "assistant", ContentBlock::Text { text: text.clone() });
            }
            ConversationTurn::AssistantToolRequest(request) => push_block(
                &mut messages,
                "assistant",
                ContentBlock::ToolUse {
                    id: request.request_id.clone(),
                    name: request.name.clone(),
                    input: Value::Object(request.arguments.clone()),
                },
            ),
            ConversationTurn::ToolResult { request_id, text, ok } => push_block(
                &mut messages,
                "user",
                ContentBlock::ToolResult {
                    tool_use_id: request_id.clone(),
                    content: text.clone(),
                    is_error: !ok,
                },
            ),
            _ => {}
        }
    }

    messages
}

fn convert_response(response: Response) -> InvocationResult {
    let mut texts = Vec::new();
    let mut calls = Vec::new();

    for block in response.content {
        match block.content_type.as_str() {
            "text" => {
                if let Some(text) = block.text.filter(|t| !t.is_empty()) {
                    texts.push(text);
                }
            }
            "tool_use" => calls.push(convert_tool_use(block)),
            other => tracing::debug!(block_type = other, "Ignoring content block"),
        }
    }

    let text = (!texts.is_empty()).then(|| texts.join("\n"));
    InvocationResult::from_parts(text, calls)
}

fn convert_tool_use(block: ResponseContent) -> RequestedCall {
    let name = block.name.unwrap_or_default();
    let request_id = block
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));

    match block.input {
        Some(Value::Object(arguments)) => RequestedCall::Ready(ToolRequest::new(name, arguments, request_id)),
        None | Some(Value::Null) => RequestedCall::Ready(ToolRequest::new(name, Map::new(), request_id)),
        Some(other) => RequestedCall::Malformed {
            name,
            request_id,
            reason: format!("tool input is not an object: {other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn weather_request(id: &str) -> ToolRequest {
        let Value::Object(args) = json!({"city": "Paris"}) else {
            unreachable!()
        };
        ToolRequest::new("get_weather", args, id)
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = AnthropicConfig {
            api_key: "sk-ant-super-secret".into(),
            ..Default::default()
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sk-ant-super-secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_messages_url() {
        let adapter = AnthropicAdapter::new(AnthropicConfig {
            base_url: "http://localhost:8080/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(adapter.messages_url(), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn test_request_shape_with_tool_round_trip() {
        let conversation = Conversation::from_turns(vec![
            ConversationTurn::user("What's the weather in Paris?"),
            ConversationTurn::assistant("Let me check."),
            ConversationTurn::AssistantToolRequest(weather_request("toolu_01")),
            ConversationTurn::tool_result("toolu_01", "18C, clear", true),
        ]);
        let tools = vec![ToolDescriptor::new("get_weather", "Weather lookup", json!({"type": "object"}))];
        let options = GenerationOptions::new("claude-3-7-sonnet-latest");

        let body = serde_json::to_value(build_request(&conversation, &tools, &options).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-3-7-sonnet-latest",
                "max_tokens": 1000,
                "messages": [
                    {"role": "user", "content": [{"type": "text", "text": "What's the weather in Paris?"}]},
                    {"role": "assistant", "content": [
                        {"type": "text", "text": "Let me check."},
                        {"type": "tool_use", "id": "toolu_01", "name": "get_weather", "input": {"city": "Paris"}}
                    ]},
                    {"role": "user", "content": [
                        {"type": "tool_result", "tool_use_id": "toolu_01", "content": "18C, clear"}
                    ]}
                ],
                "tools": [{"name": "get_weather", "description": "Weather lookup", "input_schema": {"type": "object"}}]
            })
        );
    }

    #[test]
    fn test_failed_results_share_one_user_message() {
        let conversation = Conversation::from_turns(vec![
            ConversationTurn::user("Two things"),
            ConversationTurn::AssistantToolRequest(weather_request("toolu_a")),
            ConversationTurn::AssistantToolRequest(weather_request("toolu_b")),
            ConversationTurn::tool_result("toolu_a", "ok", true),
            ConversationTurn::tool_result("toolu_b", "Error calling tool get_weather: boom", false),
        ]);

        let messages = convert_messages(&conversation);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content.len(), 2);
        assert_eq!(
            messages[2].content[1],
            ContentBlock::ToolResult {
                tool_use_id: "toolu_b".into(),
                content: "Error calling tool get_weather: boom".into(),
                is_error: true,
            }
        );
    }

    #[test]
    fn test_empty_catalog_omits_tools_and_empty_text() {
        let conversation = Conversation::from_turns(vec![
            ConversationTurn::user("Hi"),
            ConversationTurn::assistant(""),
        ]);
        let options = GenerationOptions::new("claude-3-opus-latest");

        let body = serde_json::to_value(build_request(&conversation, &[], &options).unwrap()).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_response_with_multiple_tool_uses() {
        let response: Response = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Checking both."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}},
                {"type": "tool_use", "id": "toolu_2", "name": "get_time", "input": {}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 30}
        }))
        .unwrap();

        let InvocationResult::ToolRequests { text, calls } = convert_response(response) else {
            panic!("expected tool requests");
        };
        assert_eq!(text.as_deref(), Some("Checking both."));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], RequestedCall::Ready(weather_request("toolu_1")));
        assert_eq!(calls[1].name(), "get_time");
    }

    #[test]
    fn test_text_only_response_is_final() {
        let response: Response = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "Hello!"}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(convert_response(response), InvocationResult::FinalText("Hello!".into()));
    }

    #[test]
    fn test_tool_use_without_id_gets_one() {
        let response: Response = serde_json::from_value(json!({
            "content": [{"type": "tool_use", "name": "get_time"}]
        }))
        .unwrap();

        let InvocationResult::ToolRequests { calls, .. } = convert_response(response) else {
            panic!("expected tool requests");
        };
        let RequestedCall::Ready(request) = &calls[0] else {
            panic!("expected ready call");
        };
        assert!(request.request_id.starts_with("toolu_"));
        assert!(request.arguments.is_empty());
    }
}
