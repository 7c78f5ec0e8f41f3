//! Bridge Client
//!
//! Ties one tool session, its tool catalog, the provider switch manager and
//! the orchestration loop together behind a single handle.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{BridgeError, Result};
use crate::execution::{ToolExecutor, ToolSession};
use crate::message::Conversation;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, QueryOutcome};
use crate::provider::{AdapterFactory, ProviderKind};
use crate::session::{ProviderSession, SwitchManager, SwitchOutcome};
use crate::tool::ToolCatalog;

/// A connected bridge between one tool session and the active provider
pub struct BridgeClient {
    tool_session: Arc<dyn ToolSession>,
    catalog: RwLock<Arc<ToolCatalog>>,
    switcher: SwitchManager,
    orchestrator: Orchestrator,
}

impl BridgeClient {
    pub fn builder() -> BridgeClientBuilder {
        BridgeClientBuilder::default()
    }

    /// Answer `query` in a fresh conversation
    pub async fn ask(&self, query: &str) -> Result<QueryOutcome> {
        let mut conversation = Conversation::new();
        self.process_query(&mut conversation, query).await
    }

    /// Answer `query`, continuing `conversation`
    pub async fn process_query(&self, conversation: &mut Conversation, query: &str) -> Result<QueryOutcome> {
        let session = self.switcher.active().await;
        let catalog = self.tools().await;

        self.orchestrator
            .run(&session, catalog.as_slice(), conversation, query)
            .await
    }

    /// Switch the active provider and model; the tool session is kept
    pub async fn switch_provider(&self, provider: &str, model: Option<&str>) -> Result<SwitchOutcome> {
        self.switcher.switch(provider, model).await
    }

    pub async fn active_session(&self) -> Arc<ProviderSession> {
        self.switcher.active().await
    }

    /// Tools advertised at connect time (or at the last refresh)
    pub async fn tools(&self) -> Arc<ToolCatalog> {
        self.catalog.read().await.clone()
    }

    pub const fn tool_session(&self) -> &Arc<dyn ToolSession> {
        &self.tool_session
    }

    /// Re-list the server's tools
    pub async fn refresh_tools(&self) -> Result<Arc<ToolCatalog>> {
        let catalog = Arc::new(ToolCatalog::new(self.tool_session.list_tools().await?));
        tracing::info!(tools = catalog.len(), "Refreshed tool catalog");

        *self.catalog.write().await = catalog.clone();
        Ok(catalog)
    }
}

/// Builder for [`BridgeClient`]
#[derive(Default)]
pub struct BridgeClientBuilder {
    tool_session: Option<Arc<dyn ToolSession>>,
    factory: Option<Arc<dyn AdapterFactory>>,
    provider: Option<ProviderKind>,
    model: Option<String>,
    config: OrchestratorConfig,
}

impl BridgeClientBuilder {
    #[must_use]
    pub fn tool_session(mut self, session: Arc<dyn ToolSession>) -> Self {
        self.tool_session = Some(session);
        self
    }

    #[must_use]
    pub fn adapter_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Initial provider; anthropic when unset
    #[must_use]
    pub const fn provider(mut self, kind: ProviderKind) -> Self {
        self.provider = Some(kind);
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// List the server's tools and build the initial provider session
    pub async fn build(self) -> Result<BridgeClient> {
        let tool_session = self.tool_session.ok_or(BridgeError::NotConnected)?;
        let factory = self
            .factory
            .ok_or_else(|| BridgeError::Config("no adapter factory configured".into()))?;

        let switcher = SwitchManager::new(
            factory,
            self.provider.unwrap_or(ProviderKind::Anthropic),
            self.model.as_deref(),
        )?;

        let catalog = ToolCatalog::new(tool_session.list_tools().await?);
        tracing::info!(tools = ?catalog.names(), "Connected to server");

        Ok(BridgeClient {
            orchestrator: Orchestrator::new(ToolExecutor::new(tool_session.clone()), self.config),
            tool_session,
            catalog: RwLock::new(Arc::new(catalog)),
            switcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::execution::CallToolResult;
    use crate::mock::{ScriptedAdapter, ScriptedToolSession, StaticAdapterFactory, ready_call};
    use crate::orchestrator::QueryStatus;
    use crate::tool::ToolDescriptor;

    fn weather_tool() -> ToolDescriptor {
        ToolDescriptor::new("get_weather", "Get current weather", json!({"type": "object"}))
    }

    #[tokio::test]
    async fn build_lists_tools_once() {
        let client = BridgeClient::builder()
            .tool_session(Arc::new(ScriptedToolSession::new(vec![weather_tool()])))
            .adapter_factory(Arc::new(StaticAdapterFactory::scripted()))
            .build()
            .await
            .unwrap();

        assert_eq!(client.tools().await.names(), vec!["get_weather"]);
        assert_eq!(client.active_session().await.kind(), ProviderKind::Anthropic);
    }

    /// Tool server whose advertised tools change between listings
    struct GrowingToolSession {
        listings: Mutex<Vec<Vec<ToolDescriptor>>>,
    }

    #[async_trait]
    impl ToolSession for GrowingToolSession {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            let mut listings = self.listings.lock().unwrap();
            if listings.len() > 1 {
                Ok(listings.remove(0))
            } else {
                Ok(listings[0].clone())
            }
        }

        async fn call_tool(&self, name: &str, _arguments: &Map<String, Value>) -> Result<CallToolResult> {
            Err(BridgeError::ToolExecution(format!("Unknown tool: {name}")))
        }
    }

    #[tokio::test]
    async fn refresh_tools_replaces_catalog() {
        let adapter = Arc::new(ScriptedAdapter::new(ProviderKind::Anthropic).then_text("ok"));
        let client = BridgeClient::builder()
            .tool_session(Arc::new(GrowingToolSession {
                listings: Mutex::new(vec![
                    vec![weather_tool()],
                    vec![weather_tool(), ToolDescriptor::new("get_time", "Current time", json!({}))],
                ]),
            }))
            .adapter_factory(Arc::new(
                StaticAdapterFactory::scripted().with(ProviderKind::Anthropic, adapter.clone()),
            ))
            .build()
            .await
            .unwrap();
        let before = client.tools().await;
        assert_eq!(before.names(), vec!["get_weather"]);

        let refreshed = client.refresh_tools().await.unwrap();
        assert_eq!(refreshed.names(), vec!["get_weather", "get_time"]);
        assert!(Arc::ptr_eq(&refreshed, &client.tools().await));
        assert_eq!(before.names(), vec!["get_weather"]);

        // the next query advertises the refreshed list
        client.ask("What time is it?").await.unwrap();
        assert_eq!(adapter.recorded()[0].tool_names, vec!["get_weather", "get_time"]);
    }

    #[tokio::test]
    async fn build_without_session_fails() {
        let result = BridgeClient::builder()
            .adapter_factory(Arc::new(StaticAdapterFactory::scripted()))
            .build()
            .await;
        assert!(matches!(result, Err(BridgeError::NotConnected)));
    }

    #[tokio::test]
    async fn build_fails_without_credentials() {
        let result = BridgeClient::builder()
            .tool_session(Arc::new(ScriptedToolSession::new(Vec::new())))
            .adapter_factory(Arc::new(StaticAdapterFactory::scripted().without(ProviderKind::Anthropic)))
            .build()
            .await;
        assert!(matches!(result, Err(BridgeError::Config(msg)) if msg.contains("ANTHROPIC_API_KEY")));
    }

    #[tokio::test]
    async fn switch_keeps_tool_connection() {
        let openai = Arc::new(
            ScriptedAdapter::new(ProviderKind::OpenAi)
                .then_tools(None, vec![ready_call("get_weather", json!({"city": "Lima"}), "call_1")])
                .then_text("Cloudy in Lima."),
        );
        let tools: Arc<dyn ToolSession> = Arc::new(
            ScriptedToolSession::new(vec![weather_tool()])
                .respond("get_weather", Ok(CallToolResult::text("Cloudy"))),
        );
        let client = BridgeClient::builder()
            .tool_session(tools.clone())
            .adapter_factory(Arc::new(
                StaticAdapterFactory::scripted().with(ProviderKind::OpenAi, openai.clone()),
            ))
            .build()
            .await
            .unwrap();

        let before = client.active_session().await;
        client.switch_provider("openai", Some("gpt-4")).await.unwrap();
        let after = client.active_session().await;

        assert_eq!(after.model_id(), "gpt-4o");
        assert!(!Arc::ptr_eq(before.adapter(), after.adapter()));
        assert!(Arc::ptr_eq(client.tool_session(), &tools));

        let outcome = client.ask("Weather in Lima?").await.unwrap();
        assert_eq!(outcome.status, QueryStatus::Completed);
        assert_eq!(openai.call_count(), 2);
        assert_eq!(openai.recorded()[0].tool_names, vec!["get_weather"]);
    }

    #[tokio::test]
    async fn failed_switch_keeps_session() {
        let client = BridgeClient::builder()
            .tool_session(Arc::new(ScriptedToolSession::new(Vec::new())))
            .adapter_factory(Arc::new(StaticAdapterFactory::scripted()))
            .provider(ProviderKind::OpenAi)
            .model("gpt-3.5-turbo")
            .build()
            .await
            .unwrap();
        let before = client.active_session().await;

        assert!(client.switch_provider("mistral", None).await.is_err());
        assert!(Arc::ptr_eq(&before, &client.active_session().await));
    }

    #[tokio::test]
    async fn ask_starts_fresh_while_process_query_continues() {
        let adapter = Arc::new(
            ScriptedAdapter::new(ProviderKind::Anthropic)
                .then_text("one")
                .then_text("two")
                .then_text("three"),
        );
        let client = BridgeClient::builder()
            .tool_session(Arc::new(ScriptedToolSession::new(Vec::new())))
            .adapter_factory(Arc::new(
                StaticAdapterFactory::scripted().with(ProviderKind::Anthropic, adapter.clone()),
            ))
            .build()
            .await
            .unwrap();

        client.ask("first").await.unwrap();
        client.ask("second").await.unwrap();
        assert_eq!(adapter.recorded()[1].conversation.len(), 1);

        let mut conversation = Conversation::new();
        client.process_query(&mut conversation, "third").await.unwrap();
        assert_eq!(conversation.len(), 2);
    }
}
