//! Scripted fakes for tests.
//!
//! [`ScriptedAdapter`] is a queue-based provider adapter: each `invoke`
//! pops the next queued result and records the conversation it was given.
//! [`ScriptedToolSession`] does the same for tool calls, and
//! [`StaticAdapterFactory`] hands out adapters to a switch manager without
//! reading credentials.
//!
//! # Panics
//!
//! `ScriptedAdapter::invoke` panics when its queue is empty and no
//! repeating result was set.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::execution::{CallToolResult, ToolSession};
use crate::message::{Conversation, ToolRequest};
use crate::provider::{
    AdapterFactory, GenerationOptions, InvocationResult, ProviderAdapter, ProviderKind, RequestedCall,
};
use crate::tool::ToolDescriptor;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a ready tool call from a JSON object literal
///
/// # Panics
///
/// Panics if `arguments` is not a JSON object.
pub fn ready_call(name: &str, arguments: Value, request_id: &str) -> RequestedCall {
    let Value::Object(arguments) = arguments else {
        panic!("tool arguments must be a JSON object");
    };
    RequestedCall::Ready(ToolRequest::new(name, arguments, request_id))
}

/// One recorded `invoke`
#[derive(Clone, Debug)]
pub struct RecordedInvocation {
    pub conversation: Conversation,
    pub tool_names: Vec<String>,
    pub options: GenerationOptions,
}

/// Queue-based provider adapter
pub struct ScriptedAdapter {
    kind: ProviderKind,
    responses: Mutex<VecDeque<Result<InvocationResult>>>,
    repeating: Mutex<Option<InvocationResult>>,
    calls: Mutex<Vec<RecordedInvocation>>,
}

impl ScriptedAdapter {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            responses: Mutex::new(VecDeque::new()),
            repeating: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a final text reply
    #[must_use]
    pub fn then_text(self, text: &str) -> Self {
        self.then(Ok(InvocationResult::FinalText(text.into())))
    }

    /// Queue a tool-request reply
    #[must_use]
    pub fn then_tools(self, text: Option<&str>, calls: Vec<RequestedCall>) -> Self {
        self.then(Ok(InvocationResult::ToolRequests {
            text: text.map(str::to_string),
            calls,
        }))
    }

    /// Queue a provider failure
    #[must_use]
    pub fn then_error(self, error: BridgeError) -> Self {
        self.then(Err(error))
    }

    #[must_use]
    pub fn then(self, result: Result<InvocationResult>) -> Self {
        lock(&self.responses).push_back(result);
        self
    }

    /// Reply with `result` whenever the queue is empty
    #[must_use]
    pub fn repeating(self, result: InvocationResult) -> Self {
        *lock(&self.repeating) = Some(result);
        self
    }

    pub fn recorded(&self) -> Vec<RecordedInvocation> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<InvocationResult> {
        lock(&self.calls).push(RecordedInvocation {
            conversation: conversation.clone(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            options: options.clone(),
        });

        if let Some(next) = lock(&self.responses).pop_front() {
            return next;
        }

        lock(&self.repeating)
            .clone()
            .map_or_else(|| panic!("ScriptedAdapter: no response queued"), Ok)
    }
}

/// Tool session with per-tool queued results
pub struct ScriptedToolSession {
    tools: Vec<ToolDescriptor>,
    responses: Mutex<HashMap<String, VecDeque<Result<CallToolResult>>>>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl ScriptedToolSession {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next result for `tool`
    #[must_use]
    pub fn respond(self, tool: &str, result: Result<CallToolResult>) -> Self {
        lock(&self.responses)
            .entry(tool.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Calls received so far as `(tool, arguments)`
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ToolSession for ScriptedToolSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<CallToolResult> {
        lock(&self.calls).push((name.to_string(), arguments.clone()));

        lock(&self.responses)
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(BridgeError::ToolExecution(format!("Unknown tool: {name}"))))
    }
}

enum Slot {
    Fresh,
    Fixed(Arc<dyn ProviderAdapter>),
    Missing,
}

/// Adapter factory that never reads the environment
pub struct StaticAdapterFactory {
    slots: HashMap<ProviderKind, Slot>,
}

impl StaticAdapterFactory {
    /// Every provider builds a new, empty [`ScriptedAdapter`]
    pub fn scripted() -> Self {
        Self {
            slots: ProviderKind::ALL.into_iter().map(|k| (k, Slot::Fresh)).collect(),
        }
    }

    /// Always hand out `adapter` for `kind`
    #[must_use]
    pub fn with(mut self, kind: ProviderKind, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.slots.insert(kind, Slot::Fixed(adapter));
        self
    }

    /// Behave as if `kind` had no credentials
    #[must_use]
    pub fn without(mut self, kind: ProviderKind) -> Self {
        self.slots.insert(kind, Slot::Missing);
        self
    }
}

impl AdapterFactory for StaticAdapterFactory {
    fn build(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderAdapter>> {
        match self.slots.get(&kind) {
            Some(Slot::Fixed(adapter)) => Ok(adapter.clone()),
            Some(Slot::Fresh) => Ok(Arc::new(ScriptedAdapter::new(kind))),
            Some(Slot::Missing) | None => Err(BridgeError::Config(format!(
                "{} not set in environment or .env file",
                kind.credential_var()
            ))),
        }
    }
}
