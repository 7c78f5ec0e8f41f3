//! # bridge-runtime
//!
//! Concrete runtime pieces for tool-bridge.
//!
//! ## Components
//!
//! - **Anthropic**: Messages API adapter (content-block tool calls)
//! - **OpenAI**: Chat Completions adapter (separate tool-call list)
//! - **MCP**: stdio JSON-RPC tool session for `.py` / `.js` servers
//! - **Worker**: background task owning the client for front ends
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_runtime::{EnvAdapterFactory, McpServerConfig, McpToolSession};
//!
//! let session = Arc::new(McpToolSession::connect(McpServerConfig::for_script("weather.py")?).await?);
//! let client = BridgeClient::builder()
//!     .tool_session(session.clone())
//!     .adapter_factory(Arc::new(EnvAdapterFactory))
//!     .build()
//!     .await?;
//! ```

pub mod anthropic;
pub mod factory;
mod http;
pub mod mcp;
pub mod openai;
pub mod worker;

pub use anthropic::{AnthropicAdapter, AnthropicConfig};
pub use factory::EnvAdapterFactory;
pub use mcp::{McpError, McpServerConfig, McpToolSession};
pub use openai::{OpenAiAdapter, OpenAiConfig};
pub use worker::{QueryWorker, WorkerHandle};

// Re-export core types for convenience
pub use bridge_core::{
    BridgeClient, BridgeError, Conversation, OrchestratorConfig, ProviderKind, QueryOutcome, QueryStatus, Result,
};
