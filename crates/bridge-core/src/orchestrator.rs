//! Orchestration Loop
//!
//! Alternates between asking the provider and executing the tools it
//! requests until it answers without a tool request:
//!
//! ```text
//! AwaitingProviderResponse ──FinalText──▶ Done
//!          ▲                │
//!          │           ToolRequests
//!          │                ▼
//!          └────────── ExecutingTools
//! ```
//!
//! Every line shown to the user (accompanying text, tool call traces,
//! errors, the final answer) is collected into the query's visible output.

use crate::error::Result;
use crate::execution::ToolExecutor;
use crate::message::{Conversation, ConversationTurn, ToolRequest};
use crate::provider::{DEFAULT_MAX_TOKENS, InvocationResult, RequestedCall};
use crate::session::ProviderSession;
use crate::tool::ToolDescriptor;

pub const DEFAULT_MAX_ROUND_TRIPS: usize = 10;

/// Orchestration configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Maximum provider calls per query
    pub max_round_trips: usize,

    /// Token cap applied to every provider call
    pub max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// How a query ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStatus {
    /// The provider answered without requesting tools
    Completed,
    /// A follow-up provider call failed; output is partial
    ProviderFailed,
    /// The model kept requesting tools past the configured bound
    RoundTripLimitExceeded { limit: usize },
}

/// Visible output and status of one query
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    pub lines: Vec<String>,
    pub status: QueryStatus,
    /// Provider calls made
    pub round_trips: usize,
}

impl QueryOutcome {
    /// Visible output joined by newlines
    pub fn response(&self) -> String {
        self.lines.join("\n")
    }
}

/// Drives provider calls and tool executions for one query at a time
#[derive(Clone)]
pub struct Orchestrator {
    executor: ToolExecutor,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub const fn new(executor: ToolExecutor, config: OrchestratorConfig) -> Self {
        Self { executor, config }
    }

    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `query` against `session`, appending every turn to `conversation`.
    ///
    /// A failure of the first provider call is returned as an error; later
    /// provider failures end the query with partial output instead.
    pub async fn run(
        &self,
        session: &ProviderSession,
        tools: &[ToolDescriptor],
        conversation: &mut Conversation,
        query: &str,
    ) -> Result<QueryOutcome> {
        conversation.push(ConversationTurn::user(query));

        let options = session.options(self.config.max_tokens);
        let mut lines = Vec::new();
        let mut round_trips = 0;

        let status = loop {
            if round_trips >= self.config.max_round_trips {
                tracing::warn!(limit = self.config.max_round_trips, "Round trip limit reached");
                lines.push(format!("[Round trip limit of {} reached]", self.config.max_round_trips));
                break QueryStatus::RoundTripLimitExceeded {
                    limit: self.config.max_round_trips,
                };
            }
            round_trips += 1;

            tracing::debug!(
                provider = %session.kind(),
                model = %session.model_id(),
                round_trip = round_trips,
                turns = conversation.len(),
                "Invoking provider"
            );

            let result = match session.adapter().invoke(conversation, tools, &options).await {
                Ok(result) => result,
                Err(e) if round_trips == 1 => {
                    tracing::error!(provider = %session.kind(), error = %e, "Provider call failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(provider = %session.kind(), error = %e, "Follow-up provider call failed");
                    lines.push(format!("[Error getting response after tool call: {e}]"));
                    break QueryStatus::ProviderFailed;
                }
            };

            match result {
                InvocationResult::FinalText(text) => {
                    if !text.is_empty() {
                        lines.push(text.clone());
                    }
                    conversation.push(ConversationTurn::assistant(text));
                    break QueryStatus::Completed;
                }
                InvocationResult::ToolRequests { text, calls } => {
                    if let Some(text) = text.filter(|t| !t.is_empty()) {
                        lines.push(text.clone());
                        conversation.push(ConversationTurn::assistant(text));
                    }
                    let mut executed = 0;
                    for call in calls {
                        if self.run_call(call, conversation, &mut lines).await {
                            executed += 1;
                        }
                    }
                    // Nothing new for the provider to react to
                    if executed == 0 {
                        tracing::warn!("No tool call in the response could be executed");
                        break QueryStatus::Completed;
                    }
                }
            }
        };

        tracing::info!(round_trips, status = ?status, "Query finished");
        Ok(QueryOutcome {
            lines,
            status,
            round_trips,
        })
    }

    /// Execute one requested call; `false` when it was skipped as malformed
    async fn run_call(&self, call: RequestedCall, conversation: &mut Conversation, lines: &mut Vec<String>) -> bool {
        let request: ToolRequest = match call {
            RequestedCall::Ready(request) => request,
            RequestedCall::Malformed { name, request_id, reason } => {
                tracing::error!(tool = %name, request_id = %request_id, reason = %reason, "Failed to parse tool arguments");
                lines.push(format!("[Error: Could not parse arguments for {name}]"));
                return false;
            }
        };

        conversation.push(ConversationTurn::AssistantToolRequest(request.clone()));
        let outcome = self.executor.execute(&request).await;

        if outcome.ok {
            lines.push(format!(
                "[Calling tool {} with args {}]",
                request.name,
                request.arguments_json()
            ));
            lines.push(format!("[Tool result: {}]", outcome.text));
        } else {
            lines.push(format!("[{}]", outcome.text));
        }

        conversation.push(outcome.into());
        true
    }
}
