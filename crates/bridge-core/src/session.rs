//! Provider Sessions
//!
//! The active provider, model and adapter are held together in one
//! immutable [`ProviderSession`]. Switching builds a complete replacement
//! first and then swaps the reference, so a failed switch leaves the
//! previous session untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::provider::{AdapterFactory, GenerationOptions, ProviderAdapter, ProviderKind};

/// The provider/model pair queries are currently sent to
#[derive(Clone)]
pub struct ProviderSession {
    kind: ProviderKind,
    model_name: String,
    model_id: String,
    adapter: Arc<dyn ProviderAdapter>,
    started_at: DateTime<Utc>,
}

impl ProviderSession {
    /// Create a session; `model` defaults to the provider's default alias
    pub fn new(kind: ProviderKind, model: Option<&str>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let model_name = model
            .filter(|m| !m.trim().is_empty())
            .map_or_else(|| kind.default_model().to_string(), |m| m.trim().to_string());
        let model_id = kind.resolve_model(&model_name);

        Self {
            kind,
            model_name,
            model_id,
            adapter,
            started_at: Utc::now(),
        }
    }

    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Model name as the user gave it (alias or raw id)
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Vendor wire identifier
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub const fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Generation options for one call against this session
    pub fn options(&self, max_tokens: u32) -> GenerationOptions {
        GenerationOptions::new(&self.model_id).with_max_tokens(max_tokens)
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("kind", &self.kind)
            .field("model_name", &self.model_name)
            .field("model_id", &self.model_id)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Result of a switch request
#[derive(Clone, Debug)]
pub enum SwitchOutcome {
    /// A new session is active
    Switched(Arc<ProviderSession>),
    /// The request named the active provider and model
    Unchanged(Arc<ProviderSession>),
}

impl SwitchOutcome {
    pub const fn session(&self) -> &Arc<ProviderSession> {
        match self {
            Self::Switched(session) | Self::Unchanged(session) => session,
        }
    }
}

/// Owns the active [`ProviderSession`] and replaces it on request
pub struct SwitchManager {
    factory: Arc<dyn AdapterFactory>,
    active: RwLock<Arc<ProviderSession>>,
}

impl SwitchManager {
    /// Build the initial session; fails if the provider has no credentials
    pub fn new(factory: Arc<dyn AdapterFactory>, kind: ProviderKind, model: Option<&str>) -> Result<Self> {
        let adapter = factory.build(kind)?;
        let session = ProviderSession::new(kind, model, adapter);
        tracing::info!(provider = %kind, model = %session.model_id(), "Initialized provider session");

        Ok(Self {
            factory,
            active: RwLock::new(Arc::new(session)),
        })
    }

    /// Snapshot of the active session
    pub async fn active(&self) -> Arc<ProviderSession> {
        self.active.read().await.clone()
    }

    /// Switch to `provider` (and optionally `model`).
    ///
    /// The provider string is checked against the allow-list and the new
    /// adapter is fully built before the swap; on any error the active
    /// session is left as it was.
    pub async fn switch(&self, provider: &str, model: Option<&str>) -> Result<SwitchOutcome> {
        let kind: ProviderKind = provider.parse()?;
        let model = model.map(str::trim).filter(|m| !m.is_empty());

        let current = self.active().await;
        let same_model = model.is_none_or(|m| m == current.model_name());
        if kind == current.kind() && same_model {
            return Ok(SwitchOutcome::Unchanged(current));
        }

        let adapter = self.factory.build(kind)?;
        let session = Arc::new(ProviderSession::new(kind, model, adapter));

        *self.active.write().await = session.clone();
        tracing::info!(
            provider = %kind,
            model = %session.model_id(),
            previous = %current.kind(),
            "Switched provider session"
        );

        Ok(SwitchOutcome::Switched(session))
    }
}
