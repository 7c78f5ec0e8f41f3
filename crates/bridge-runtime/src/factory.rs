//! Adapter factory backed by environment credentials.

use std::sync::Arc;

use bridge_core::{
    error::Result,
    provider::{AdapterFactory, ProviderAdapter, ProviderKind},
};

use crate::anthropic::AnthropicAdapter;
use crate::openai::OpenAiAdapter;

/// Builds adapters from `ANTHROPIC_*` / `OPENAI_*` environment variables.
///
/// Credentials are read on every build, so a key added to the environment
/// after startup is picked up by the next switch.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvAdapterFactory;

impl AdapterFactory for EnvAdapterFactory {
    fn build(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderAdapter>> {
        let adapter: Arc<dyn ProviderAdapter> = match kind {
            ProviderKind::Anthropic => Arc::new(AnthropicAdapter::from_env()?),
            ProviderKind::OpenAi => Arc::new(OpenAiAdapter::from_env()?),
        };
        tracing::debug!(provider = %kind, "Built provider adapter");
        Ok(adapter)
    }
}
