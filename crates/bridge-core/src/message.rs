//! Conversation State
//!
//! Provider-neutral conversation model shared by every adapter. A
//! conversation is an append-only list of turns; only the orchestration
//! loop appends to it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Role of a turn's author
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input
    User,
    /// Assistant (LLM) output
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool identifier
    pub name: String,

    /// Decoded arguments
    pub arguments: Map<String, Value>,

    /// Provider-assigned call ID, echoed back on the result
    pub request_id: String,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>, request_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            request_id: request_id.into(),
        }
    }

    /// Arguments rendered as compact JSON
    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

/// A single turn in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationTurn {
    User {
        text: String,
    },
    AssistantText {
        text: String,
    },
    AssistantToolRequest(ToolRequest),
    ToolResult {
        request_id: String,
        text: String,
        ok: bool,
    },
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantText { text: text.into() }
    }

    pub fn tool_result(request_id: impl Into<String>, text: impl Into<String>, ok: bool) -> Self {
        Self::ToolResult {
            request_id: request_id.into(),
            text: text.into(),
            ok,
        }
    }

    pub const fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::AssistantText { .. } | Self::AssistantToolRequest(_) => Role::Assistant,
            Self::ToolResult { .. } => Role::Tool,
        }
    }
}

/// Unique conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered, append-only conversation history
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    turns: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a conversation from previously recorded turns
    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        let mut conversation = Self::new();
        conversation.turns = turns;
        conversation
    }

    pub(crate) fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Tool results in append order as `(request_id, text, ok)`
    pub fn tool_results(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        self.turns.iter().filter_map(|turn| match turn {
            ConversationTurn::ToolResult { request_id, text, ok } => {
                Some((request_id.as_str(), text.as_str(), *ok))
            }
            _ => None,
        })
    }

    /// Request IDs that have no matching tool result yet
    pub fn unanswered_requests(&self) -> Vec<&str> {
        let answered: Vec<&str> = self.tool_results().map(|(id, _, _)| id).collect();
        self.turns
            .iter()
            .filter_map(|turn| match turn {
                ConversationTurn::AssistantToolRequest(request)
                    if !answered.contains(&request.request_id.as_str()) =>
                {
                    Some(request.request_id.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Every tool request has exactly one later result with the same ID,
    /// and no result lacks a request
    pub fn is_well_formed(&self) -> bool {
        let mut open: HashMap<&str, usize> = HashMap::new();

        for turn in &self.turns {
            match turn {
                ConversationTurn::AssistantToolRequest(request) => {
                    *open.entry(request.request_id.as_str()).or_default() += 1;
                }
                ConversationTurn::ToolResult { request_id, .. } => {
                    match open.get_mut(request_id.as_str()) {
                        Some(count) if *count > 0 => *count -= 1,
                        _ => return false,
                    }
                }
                _ => {}
            }
        }

        open.values().all(|count| *count == 0)
    }
}
