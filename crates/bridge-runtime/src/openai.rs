//! OpenAI Chat Completions Adapter
//!
//! Tool calls arrive in a separate `tool_calls` list whose arguments are a
//! JSON-encoded string; results go back as `role: tool` messages.

use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{
    error::Result,
    message::{Conversation, ConversationTurn},
    provider::{GenerationOptions, InvocationResult, ProviderAdapter, ProviderKind, RequestedCall},
    tool::{OpenAiTool, ProviderToolSchema, ToolDescriptor, to_wire_schema},
    BridgeError, ToolRequest,
};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI adapter configuration
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout: None,
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `PROVIDER_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: http::credential(ProviderKind::OpenAi.credential_var())?,
            base_url: http::base_url("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            timeout: http::timeout_from_env()?,
        })
    }
}

// Request types

#[derive(Debug, Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    const fn new(role: &'static str, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: FunctionCall,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".into()
}

// Response types

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// OpenAI provider adapter
#[derive(Debug)]
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn auth_header(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| BridgeError::Auth("API key contains invalid header characters".into()))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<InvocationResult> {
        let body = build_request(conversation, tools, options)?;
        let request = self
            .client
            .post(self.completions_url())
            .header(AUTHORIZATION, self.auth_header()?);

        let response: Response = http::post_json(request, &body).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %options.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        convert_response(response)
    }
}

fn build_request<'a>(
    conversation: &Conversation,
    tools: &[ToolDescriptor],
    options: &'a GenerationOptions,
) -> Result<Request<'a>> {
    let tools = match to_wire_schema(tools, ProviderKind::OpenAi)? {
        ProviderToolSchema::OpenAi(tools) if !tools.is_empty() => Some(tools),
        _ => None,
    };

    Ok(Request {
        model: &options.model,
        messages: convert_messages(conversation),
        tools,
        max_tokens: options.max_tokens,
        temperature: options.temperature,
    })
}

/// The assistant message to extend, opening one if the last message isn't
fn assistant_message(messages: &mut Vec<ChatMessage>) -> &mut ChatMessage {
    if messages.last().is_none_or(|m| m.role != "assistant") {
        messages.push(ChatMessage::new("assistant", None));
    }
    let last = messages.len() - 1;
    &mut messages[last]
}

fn convert_messages(conversation: &Conversation) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    for turn in conversation.turns() {
        match turn {
            ConversationTurn::User { text } if !text.is_empty() => {
                messages.push(ChatMessage::new("user", Some(text.clone())));
            }
            ConversationTurn::AssistantText { text } if !text.is_empty() => {
                let message = assistant_message(&mut messages);
                message.content = Some(match message.content.take() {
                    Some(existing) => format!("{existing}\n{text}"),
                    None => text.clone(),
                });
            }
            ConversationTurn::AssistantToolRequest(request) => {
                assistant_message(&mut messages).tool_calls.push(ToolCall {
                    id: request.request_id.clone(),
                    call_type: function_type(),
                    function: FunctionCall {
                        name: request.name.clone(),
                        arguments: request.arguments_json(),
                    },
                });
            }
            ConversationTurn::ToolResult { request_id, text, .. } => {
                let mut message = ChatMessage::new("tool", Some(text.clone()));
                message.tool_call_id = Some(request_id.clone());
                messages.push(message);
            }
            _ => {}
        }
    }

    messages
}

fn convert_response(response: Response) -> Result<InvocationResult> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BridgeError::Provider("response contained no choices".into()))?;
    tracing::trace!(finish_reason = ?choice.finish_reason, "OpenAI choice");

    let calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(convert_tool_call)
        .collect();
    Ok(InvocationResult::from_parts(choice.message.content, calls))
}

fn convert_tool_call(call: ToolCall) -> RequestedCall {
    let name = call.function.name;
    let request_id = if call.id.is_empty() {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    } else {
        call.id
    };

    match decode_arguments(&call.function.arguments) {
        Ok(arguments) => RequestedCall::Ready(ToolRequest::new(name, arguments, request_id)),
        Err(reason) => {
            tracing::warn!(tool = %name, request_id = %request_id, reason = %reason, "Undecodable tool arguments");
            RequestedCall::Malformed {
                name,
                request_id,
                reason,
            }
        }
    }
}

/// Decode a JSON-string argument payload; an empty string is `{}`
fn decode_arguments(raw: &str) -> std::result::Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(format!("arguments are not a JSON object: {other}")),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(name: &str, args: Value, id: &str) -> ToolRequest {
        let Value::Object(args) = args else {
            unreachable!()
        };
        ToolRequest::new(name, args, id)
    }

    fn response(message: Value) -> Response {
        serde_json::from_value(json!({
            "choices": [{"message": message, "finish_reason": "tool_calls"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }))
        .unwrap()
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = OpenAiConfig {
            api_key: "sk-proj-secret".into(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("sk-proj-secret"));
    }

    #[test]
    fn test_completions_url() {
        let adapter = OpenAiAdapter::new(OpenAiConfig::default()).unwrap();
        assert_eq!(adapter.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_request_shape_with_tool_round_trip() {
        let conversation = Conversation::from_turns(vec![
            ConversationTurn::user("Weather in Paris?"),
            ConversationTurn::AssistantToolRequest(request("get_weather", json!({"city": "Paris"}), "call_1")),
            ConversationTurn::tool_result("call_1", "Sunny", true),
            ConversationTurn::assistant("It's sunny."),
        ]);
        let tools = vec![ToolDescriptor::new("get_weather", "", json!({"type": "object"}))];
        let options = GenerationOptions::new("gpt-4o");

        let body = serde_json::to_value(build_request(&conversation, &tools, &options).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "user", "content": "Weather in Paris?"},
                    {"role": "assistant", "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                    }]},
                    {"role": "tool", "content": "Sunny", "tool_call_id": "call_1"},
                    {"role": "assistant", "content": "It's sunny."}
                ],
                "tools": [{
                    "type": "function",
                    "function": {"name": "get_weather", "description": "", "parameters": {"type": "object"}}
                }],
                "max_tokens": 1000
            })
        );
    }

    #[test]
    fn test_text_and_calls_merge_into_one_assistant_message() {
        let conversation = Conversation::from_turns(vec![
            ConversationTurn::user("Go"),
            ConversationTurn::assistant("Looking up."),
            ConversationTurn::AssistantToolRequest(request("a", json!({}), "call_a")),
            ConversationTurn::AssistantToolRequest(request("b", json!({}), "call_b")),
            ConversationTurn::tool_result("call_a", "1", true),
            ConversationTurn::tool_result("call_b", "Error calling tool b: nope", false),
        ]);

        let messages = convert_messages(&conversation);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content.as_deref(), Some("Looking up."));
        assert_eq!(messages[1].tool_calls.len(), 2);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_b"));
    }

    #[test]
    fn test_one_bad_argument_string_of_three() {
        let result = convert_response(response(json!({
            "content": null,
            "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}},
                {"id": "call_2", "type": "function", "function": {"name": "search_web", "arguments": "{not json"}},
                {"id": "call_3", "type": "function", "function": {"name": "get_time", "arguments": ""}}
            ]
        })))
        .unwrap();

        let InvocationResult::ToolRequests { text, calls } = result else {
            panic!("expected tool requests");
        };
        assert!(text.is_none());
        assert_eq!(calls[0], RequestedCall::Ready(request("get_weather", json!({"city": "Oslo"}), "call_1")));
        assert!(matches!(&calls[1], RequestedCall::Malformed { name, .. } if name == "search_web"));
        assert_eq!(calls[2], RequestedCall::Ready(request("get_time", json!({}), "call_3")));
    }

    #[test]
    fn test_non_object_arguments_are_malformed() {
        assert!(decode_arguments("[1, 2]").is_err());
        assert!(decode_arguments("\"Paris\"").is_err());
        assert_eq!(decode_arguments("  ").unwrap(), Map::new());
    }

    #[test]
    fn test_plain_answer_is_final() {
        let result = convert_response(response(json!({"content": "Hi there"}))).unwrap();
        assert_eq!(result, InvocationResult::FinalText("Hi there".into()));
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let response: Response = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(convert_response(response), Err(BridgeError::Provider(_))));
    }
}
