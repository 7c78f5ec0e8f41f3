//! Provider Invocation Strategy
//!
//! Defines a common interface for the LLM chat APIs the bridge can drive.
//! Each adapter translates the neutral [`Conversation`] into its vendor's
//! wire format and normalizes the reply into an [`InvocationResult`], so the
//! orchestration loop never inspects provider-specific shapes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_core::provider::{GenerationOptions, ProviderAdapter};
//!
//! let adapter = AnthropicAdapter::from_env()?;
//! let result = adapter.invoke(&conversation, catalog.as_slice(), &options).await?;
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::message::{Conversation, ToolRequest};
use crate::tool::ToolDescriptor;

/// Supported LLM providers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Content-block tool calling (format A)
    Anthropic,
    /// Separate tool-call list with JSON-string arguments (format B)
    #[serde(rename = "openai")]
    OpenAi,
}

const ANTHROPIC_MODELS: &[(&str, &str)] = &[
    ("claude-3-opus", "claude-3-opus-latest"),
    ("claude-3-sonnet", "claude-3-7-sonnet-latest"),
    ("claude-3-haiku", "claude-3-5-haiku-latest"),
];

const OPENAI_MODELS: &[(&str, &str)] = &[
    ("gpt-4-turbo", "gpt-4-turbo"),
    ("gpt-4", "gpt-4o"),
    ("gpt-3.5-turbo", "gpt-3.5-turbo"),
];

impl ProviderKind {
    pub const ALL: [Self; 2] = [Self::Anthropic, Self::OpenAi];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable holding this provider's API key
    pub const fn credential_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Model alias used when none is given
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-sonnet",
            Self::OpenAi => "gpt-4-turbo",
        }
    }

    /// Known `(alias, wire id)` pairs
    pub const fn models(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Anthropic => ANTHROPIC_MODELS,
            Self::OpenAi => OPENAI_MODELS,
        }
    }

    /// Map a model alias to the vendor's wire identifier.
    ///
    /// Unknown names pass through verbatim so newly released models work
    /// without a table update.
    pub fn resolve_model(self, name: &str) -> String {
        self.models()
            .iter()
            .find(|(alias, _)| *alias == name)
            .map_or_else(|| name.to_string(), |(_, id)| (*id).to_string())
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(BridgeError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Configuration for one provider call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Wire model identifier (e.g., "claude-3-7-sonnet-latest", "gpt-4o")
    pub model: String,

    /// Maximum tokens to generate per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; provider default when unset
    #[serde(default)]
    pub temperature: Option<f32>,
}

pub const DEFAULT_MAX_TOKENS: u32 = 1000;

const fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl GenerationOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A tool call as reported by the provider
#[derive(Clone, Debug, PartialEq)]
pub enum RequestedCall {
    /// Arguments decoded into an object
    Ready(ToolRequest),
    /// Arguments could not be decoded; the call is skipped
    Malformed {
        name: String,
        request_id: String,
        reason: String,
    },
}

impl RequestedCall {
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(request) => &request.name,
            Self::Malformed { name, .. } => name,
        }
    }
}

/// Normalized provider response
#[derive(Clone, Debug, PartialEq)]
pub enum InvocationResult {
    /// No tool requested; the query is answered
    FinalText(String),
    /// One or more tool calls, in the order the provider listed them
    ToolRequests {
        text: Option<String>,
        calls: Vec<RequestedCall>,
    },
}

impl InvocationResult {
    /// Build a result from accompanying text and calls, collapsing to
    /// `FinalText` when no calls were requested
    pub fn from_parts(text: Option<String>, calls: Vec<RequestedCall>) -> Self {
        if calls.is_empty() {
            Self::FinalText(text.unwrap_or_default())
        } else {
            Self::ToolRequests {
                text: text.filter(|t| !t.is_empty()),
                calls,
            }
        }
    }
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for a new chat API. The
/// orchestration loop works exclusively through this interface.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which wire format this adapter speaks
    fn kind(&self) -> ProviderKind;

    /// Send the conversation and tool schemas; return the normalized reply.
    ///
    /// Transport, auth and rate-limit failures are returned as errors and
    /// are not retried here.
    async fn invoke(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<InvocationResult>;
}

/// Builds adapters (with credentials) for a provider on demand
pub trait AdapterFactory: Send + Sync {
    fn build(&self, kind: ProviderKind) -> Result<std::sync::Arc<dyn ProviderAdapter>>;
}
