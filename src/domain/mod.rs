//! Domain-Data strategies' shared shape (§4.7): entity extraction, a
//! two-tier provider invocation (primary, optional fallback), and payload
//! formatting. One submodule per domain; each exposes an `extract_entity`
//! function and a pair of [`DomainProvider`] implementations.

pub mod finance;
pub mod routing;
pub mod weather;

use async_trait::async_trait;

use crate::error::Result;

/// Narrow interface every concrete domain provider implements (§9). Each
/// strategy depends on this trait, never a concrete provider type.
#[async_trait]
pub trait DomainProvider: Send + Sync {
    /// Fetch the provider's raw payload for the given extracted entity
    /// (location string, ticker symbol, or "origin|destination" pair).
    async fn fetch(&self, entity: &str, timeout_ms: u64) -> Result<serde_json::Value>;

    fn name(&self) -> &str;
}

/// A primary provider with an optional fallback, invoked in that order
/// (§4.7, §9 "Fallback order... two-tier... applies to LLM providers and
/// domain providers").
pub struct DomainProviderSet {
    pub primary: std::sync::Arc<dyn DomainProvider>,
    pub fallback: Option<std::sync::Arc<dyn DomainProvider>>,
}

impl DomainProviderSet {
    pub fn new(primary: std::sync::Arc<dyn DomainProvider>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: std::sync::Arc<dyn DomainProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Try the primary, then the fallback if configured, per §4.7 step (2).
    #[tracing::instrument(skip(self))]
    pub async fn invoke(&self, entity: &str, timeout_ms: u64) -> Result<serde_json::Value> {
        match self.primary.fetch(entity, timeout_ms).await {
            Ok(payload) => Ok(payload),
            Err(primary_err) => {
                if let Some(ref fallback) = self.fallback {
                    tracing::warn!(provider = self.primary.name(), error = %primary_err, "primary domain provider failed, trying fallback");
                    fallback.fetch(entity, timeout_ms).await
                } else {
                    Err(primary_err)
                }
            }
        }
    }
}
