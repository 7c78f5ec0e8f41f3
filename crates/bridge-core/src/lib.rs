//! # bridge-core
//!
//! Provider-agnostic tool-calling orchestration between LLM chat APIs and an
//! MCP tool session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          BridgeClient                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ Orchestrator │──│ ToolExecutor │──│ ToolSession (MCP)      │  │
//! │  │    Loop      │  └──────────────┘  └────────────────────────┘  │
//! │  │              │  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │              │──│SwitchManager │──│ ProviderAdapter        │  │
//! │  └──────────────┘  └──────────────┘  │ (Strategy)             │  │
//! │                                      └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ProviderAdapter` trait hides the Anthropic and OpenAI function-calling
//! wire formats, so the loop and the conversation model never branch on the
//! provider.

pub mod client;
pub mod error;
pub mod execution;
pub mod message;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod orchestrator;
pub mod provider;
pub mod session;
pub mod tool;

pub use client::{BridgeClient, BridgeClientBuilder};
pub use error::{BridgeError, Result};
pub use execution::{CallToolResult, ExecutionOutcome, ToolContent, ToolExecutor, ToolSession};
pub use message::{Conversation, ConversationTurn, Role, ToolRequest};
pub use orchestrator::{Orchestrator, OrchestratorConfig, QueryOutcome, QueryStatus};
pub use provider::{AdapterFactory, GenerationOptions, InvocationResult, ProviderAdapter, ProviderKind, RequestedCall};
pub use session::{ProviderSession, SwitchManager, SwitchOutcome};
pub use tool::{ProviderToolSchema, ToolCatalog, ToolDescriptor, to_wire_schema};
