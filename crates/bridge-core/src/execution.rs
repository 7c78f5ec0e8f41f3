//! Tool Execution Bridge
//!
//! Runs model-requested tool calls against the tool-hosting session and
//! turns every outcome, success or failure, into conversation content.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::message::{ConversationTurn, ToolRequest};
use crate::tool::ToolDescriptor;

/// One content item of a tool result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type", default = "default_content_type")]
    pub content_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_content_type() -> String {
    "text".into()
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: default_content_type(),
            text: Some(text.into()),
        }
    }
}

/// Result of a `call_tool` on the tool session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,

    /// Set by the server when the tool itself reported a failure
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    /// Newline-joined text parts; non-text parts are dropped
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Session with the external tool-hosting process
///
/// Implementations must serialize calls onto their underlying channel;
/// callers may share one session across tasks.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// List the tools the server advertises
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke one tool
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<CallToolResult>;
}

/// Outcome of executing one tool request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub request_id: String,
    pub text: String,
    pub ok: bool,
}

impl From<ExecutionOutcome> for ConversationTurn {
    fn from(outcome: ExecutionOutcome) -> Self {
        Self::ToolResult {
            request_id: outcome.request_id,
            text: outcome.text,
            ok: outcome.ok,
        }
    }
}

/// Executes tool requests against a shared tool session
#[derive(Clone)]
pub struct ToolExecutor {
    session: Arc<dyn ToolSession>,
}

impl ToolExecutor {
    pub fn new(session: Arc<dyn ToolSession>) -> Self {
        Self { session }
    }

    pub const fn session(&self) -> &Arc<dyn ToolSession> {
        &self.session
    }

    /// Execute a request. Never fails: errors become `ok = false` outcomes.
    pub async fn execute(&self, request: &ToolRequest) -> ExecutionOutcome {
        tracing::info!(tool = %request.name, request_id = %request.request_id, "Calling tool");

        let failure = match self.session.call_tool(&request.name, &request.arguments).await {
            Ok(result) if !result.is_error => {
                return ExecutionOutcome {
                    request_id: request.request_id.clone(),
                    text: result.joined_text(),
                    ok: true,
                };
            }
            Ok(result) => result.joined_text(),
            Err(e) => e.to_string(),
        };

        tracing::error!(tool = %request.name, error = %failure, "Error calling tool");
        ExecutionOutcome {
            request_id: request.request_id.clone(),
            text: format!("Error calling tool {}: {}", request.name, failure),
            ok: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::mock::ScriptedToolSession;
    use serde_json::json;

    fn weather_request() -> ToolRequest {
        let Value::Object(args) = json!({"city": "Paris"}) else {
            unreachable!()
        };
        ToolRequest::new("get_weather", args, "toolu_01")
    }

    #[test]
    fn joined_text_skips_non_text_parts() {
        let result = CallToolResult {
            content: vec![
                ToolContent::text("line one"),
                ToolContent {
                    content_type: "image".into(),
                    text: None,
                },
                ToolContent::text("line two"),
            ],
            is_error: false,
        };
        assert_eq!(result.joined_text(), "line one\nline two");
    }

    #[test]
    fn call_result_parses_mcp_shape() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "Sunny"}],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.joined_text(), "Sunny");
    }

    #[tokio::test]
    async fn success_yields_ok_outcome() {
        let session = ScriptedToolSession::new(Vec::new())
            .respond("get_weather", Ok(CallToolResult::text("Weather in Paris: 18C")));
        let executor = ToolExecutor::new(Arc::new(session));

        let outcome = executor.execute(&weather_request()).await;
        assert_eq!(
            outcome,
            ExecutionOutcome {
                request_id: "toolu_01".into(),
                text: "Weather in Paris: 18C".into(),
                ok: true,
            }
        );
    }

    #[tokio::test]
    async fn transport_failure_embeds_tool_name_and_cause() {
        let session = ScriptedToolSession::new(Vec::new()).respond(
            "get_weather",
            Err(BridgeError::ToolExecution("invalid arguments".into())),
        );
        let executor = ToolExecutor::new(Arc::new(session));

        let outcome = executor.execute(&weather_request()).await;
        assert!(!outcome.ok);
        assert_eq!(
            outcome.text,
            "Error calling tool get_weather: Tool execution error: invalid arguments"
        );
    }

    #[tokio::test]
    async fn server_reported_error_is_a_failure() {
        let session = ScriptedToolSession::new(Vec::new()).respond(
            "get_weather",
            Ok(CallToolResult {
                content: vec![ToolContent::text("City not found: Atlantis")],
                is_error: true,
            }),
        );
        let executor = ToolExecutor::new(Arc::new(session));

        let outcome = executor.execute(&weather_request()).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.text, "Error calling tool get_weather: City not found: Atlantis");
    }
}
