//! The LLM Provider Manager (§4.9): a provider-agnostic facade over several
//! configured completion back-ends with a deterministic fallback order.
//!
//! Replaces the teacher's former single-default-provider dispatch with a
//! three-tier selection order: `preferred_provider` (if registered), then
//! the configured primary, then the rest in registration order — trying
//! each only if its (briefly cached) health probe reports it available,
//! and raising [`Error::AllProvidersFailed`] only once every candidate has
//! been tried.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::client::LLMClient;
use super::types::{CompletionRequest, CompletionResponse};

/// How long a provider's last health-probe result is trusted before being
/// re-checked (§4.9: "health probe (cached for a few seconds)").
const HEALTH_CACHE_TTL: Duration = Duration::from_secs(5);

/// Per-call overrides threaded through to [`LlmProviderManager::complete`].
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub preferred_provider: Option<String>,
}

struct RegisteredProvider {
    name: String,
    client: Arc<dyn LLMClient>,
    /// Registration-order tiebreak for "remaining providers in registration order".
    order: usize,
    last_health_check: RwLock<Option<(Instant, bool)>>,
    max_attempts: u32,
}

/// Selects one of several configured completion back-ends, applies a
/// deterministic fallback order, and presents a single `complete` contract.
pub struct LlmProviderManager {
    providers: Vec<RegisteredProvider>,
    primary: Option<String>,
}

pub struct LlmProviderManagerBuilder {
    providers: Vec<RegisteredProvider>,
    primary: Option<String>,
}

impl LlmProviderManagerBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            primary: None,
        }
    }

    /// Register a provider. Retryable transport errors within this provider
    /// use exponential backoff, bounded at `max_attempts` (default 3).
    pub fn with_provider(mut self, name: impl Into<String>, client: Arc<dyn LLMClient>) -> Self {
        let order = self.providers.len();
        self.providers.push(RegisteredProvider {
            name: name.into(),
            client,
            order,
            last_health_check: RwLock::new(None),
            max_attempts: 3,
        });
        self
    }

    pub fn with_primary(mut self, name: impl Into<String>) -> Self {
        self.primary = Some(name.into());
        self
    }

    pub fn build(self) -> LlmProviderManager {
        LlmProviderManager {
            providers: self.providers,
            primary: self.primary,
        }
    }
}

impl Default for LlmProviderManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmProviderManager {
    pub fn builder() -> LlmProviderManagerBuilder {
        LlmProviderManagerBuilder::new()
    }

    /// `preferred_provider` (if registered) → configured primary → remaining
    /// providers in registration order. Each candidate appears exactly once.
    fn candidate_order(&self, preferred: Option<&str>) -> Vec<&RegisteredProvider> {
        let mut seen = std::collections::HashSet::new();
        let mut ordered = Vec::with_capacity(self.providers.len());

        let mut push_named = |name: &str, ordered: &mut Vec<&RegisteredProvider>| {
            if seen.contains(name) {
                return;
            }
            if let Some(p) = self.providers.iter().find(|p| p.name == name) {
                seen.insert(name.to_string());
                ordered.push(p);
            }
        };

        if let Some(pref) = preferred {
            push_named(pref, &mut ordered);
        }
        if let Some(ref primary) = self.primary {
            push_named(primary, &mut ordered);
        }

        let mut rest: Vec<&RegisteredProvider> = self
            .providers
            .iter()
            .filter(|p| !seen.contains(&p.name))
            .collect();
        rest.sort_by_key(|p| p.order);
        ordered.extend(rest);

        ordered
    }

    async fn is_available(&self, provider: &RegisteredProvider) -> bool {
        {
            let cached = provider.last_health_check.read().await;
            if let Some((checked_at, available)) = *cached {
                if checked_at.elapsed() < HEALTH_CACHE_TTL {
                    return available;
                }
            }
        }

        let available = provider.client.available().await;
        let mut cached = provider.last_health_check.write().await;
        *cached = Some((Instant::now(), available));
        available
    }

    /// Retries only *transient* failures (§4.9: "Retryable errors within
    /// one provider use exponential backoff"). `Error::is_recoverable`
    /// marks the soft/terminal-for-this-provider kinds (the provider is
    /// known unavailable, the input was bad, the caller cancelled) that a
    /// retry cannot fix; those fall straight through to the next provider
    /// instead of spending the attempt budget on a doomed repeat.
    async fn attempt_with_backoff(
        &self,
        provider: &RegisteredProvider,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let mut last_err = Error::ProviderUnavailable(provider.name.clone());
        for attempt in 0..provider.max_attempts {
            match provider.client.complete(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let retryable = !e.is_recoverable();
                    last_err = e;
                    if retryable && attempt + 1 < provider.max_attempts {
                        let backoff_ms = 100u64 * 2u64.pow(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// `Complete(messages, options) → text` (§4.9). Tries each candidate
    /// provider in order; on success, returns immediately; if every
    /// candidate fails or is unavailable, raises `AllProvidersFailed`
    /// carrying the last observed error.
    pub async fn complete(
        &self,
        mut request: CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        if self.providers.is_empty() {
            return Err(Error::AllProvidersFailed(
                "no LLM providers registered".to_string(),
            ));
        }

        request.temperature = options.temperature.or(request.temperature);
        request.max_tokens = options.max_tokens.or(request.max_tokens);

        let candidates = self.candidate_order(options.preferred_provider.as_deref());
        let mut last_err: Option<Error> = None;

        for provider in candidates {
            if !self.is_available(provider).await {
                last_err = Some(Error::ProviderUnavailable(provider.name.clone()));
                continue;
            }
            match self.attempt_with_backoff(provider, &request).await {
                Ok(resp) => return Ok(resp),
                Err(e) => last_err = Some(e),
            }
        }

        Err(Error::AllProvidersFailed(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    /// `Embed(texts, options) → vectors`, the embedding-request counterpart
    /// to [`Self::complete`] used by the RAG strategy (§4.6). Same fallback
    /// order and availability check; no retry/backoff since embedding calls
    /// are typically cheap and idempotent and a failed one should fall
    /// through to the next provider quickly.
    pub async fn embed(
        &self,
        request: super::types::EmbeddingRequest,
        preferred_provider: Option<&str>,
    ) -> Result<super::types::EmbeddingResponse> {
        if self.providers.is_empty() {
            return Err(Error::AllProvidersFailed(
                "no LLM providers registered".to_string(),
            ));
        }

        let candidates = self.candidate_order(preferred_provider);
        let mut last_err: Option<Error> = None;

        for provider in candidates {
            if !self.is_available(provider).await {
                last_err = Some(Error::ProviderUnavailable(provider.name.clone()));
                continue;
            }
            match provider.client.embed(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) => last_err = Some(e),
            }
        }

        Err(Error::AllProvidersFailed(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }
}

/// A scripted, offline LLM client used by tests (§10.5) to exercise the
/// manager's fallback logic deterministically, without real network calls.
pub struct FakeLlmClient {
    pub provider: super::types::Provider,
    pub responses: RwLock<Vec<Result<String>>>,
    pub call_count: RwLock<u32>,
}

impl FakeLlmClient {
    pub fn new(provider: super::types::Provider, responses: Vec<Result<String>>) -> Self {
        Self {
            provider,
            responses: RwLock::new(responses),
            call_count: RwLock::new(0),
        }
    }

    pub fn always_fails(provider: super::types::Provider) -> Self {
        Self::new(provider, vec![])
    }

    pub async fn calls(&self) -> u32 {
        *self.call_count.read().await
    }
}

#[async_trait]
impl LLMClient for FakeLlmClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        let mut count = self.call_count.write().await;
        *count += 1;
        let mut responses = self.responses.write().await;
        if responses.is_empty() {
            return Err(Error::ProviderUnavailable(self.provider.to_string()));
        }
        let next = responses.remove(0);
        next.map(|content| CompletionResponse {
            id: format!("fake-{count}"),
            model: "fake-model".to_string(),
            content,
            stop_reason: Some(super::types::StopReason::EndTurn),
            usage: super::types::TokenUsage::default(),
            timestamp: chrono::Utc::now(),
            cost: Some(0.0),
        })
    }

    async fn embed(
        &self,
        _request: super::types::EmbeddingRequest,
    ) -> Result<super::types::EmbeddingResponse> {
        Ok(super::types::EmbeddingResponse {
            model: "fake-embedding".to_string(),
            embeddings: vec![vec![0.0; 8]],
            usage: super::types::TokenUsage::default(),
        })
    }

    fn provider(&self) -> super::types::Provider {
        self.provider
    }

    fn available_models(&self) -> Vec<super::types::ModelSpec> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Provider;

    fn req() -> CompletionRequest {
        CompletionRequest::new().with_message(super::super::types::ChatMessage::user("hi"))
    }

    #[tokio::test]
    async fn fallback_order_is_preferred_then_primary_then_registration() {
        let a = Arc::new(FakeLlmClient::always_fails(Provider::Anthropic));
        let b = Arc::new(FakeLlmClient::new(
            Provider::OpenAI,
            vec![Ok("from b".to_string())],
        ));

        let manager = LlmProviderManager::builder()
            .with_provider("a", a)
            .with_provider("b", b)
            .with_primary("a")
            .build();

        let resp = manager
            .complete(req(), &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.content, "from b");
    }

    #[tokio::test]
    async fn all_providers_failing_raises_all_providers_failed() {
        let a = Arc::new(FakeLlmClient::always_fails(Provider::Anthropic));
        let b = Arc::new(FakeLlmClient::always_fails(Provider::OpenAI));

        let manager = LlmProviderManager::builder()
            .with_provider("a", a.clone())
            .with_provider("b", b.clone())
            .build();

        let err = manager
            .complete(req(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllProvidersFailed(_)));

        // Property P3: exactly one attempt against each, in declared order.
        assert_eq!(a.calls().await, 1);
        assert_eq!(b.calls().await, 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_on_the_same_provider() {
        let a = Arc::new(FakeLlmClient::new(
            Provider::Anthropic,
            vec![
                Err(Error::Transport("connection reset".to_string())),
                Ok("from a after retry".to_string()),
            ],
        ));

        let manager = LlmProviderManager::builder().with_provider("a", a.clone()).build();

        let resp = manager
            .complete(req(), &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.content, "from a after retry");
        assert_eq!(a.calls().await, 2);
    }

    #[tokio::test]
    async fn preferred_provider_skips_primary() {
        let a = Arc::new(FakeLlmClient::new(
            Provider::Anthropic,
            vec![Ok("from a".to_string())],
        ));
        let b = Arc::new(FakeLlmClient::new(
            Provider::OpenAI,
            vec![Ok("from b".to_string())],
        ));

        let manager = LlmProviderManager::builder()
            .with_provider("a", a)
            .with_provider("b", b)
            .with_primary("a")
            .build();

        let options = CompletionOptions {
            preferred_provider: Some("b".to_string()),
            ..Default::default()
        };
        let resp = manager.complete(req(), &options).await.unwrap();
        assert_eq!(resp.content, "from b");
    }

    #[tokio::test]
    async fn empty_manager_fails_immediately() {
        let manager = LlmProviderManager::builder().build();
        let err = manager
            .complete(req(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllProvidersFailed(_)));
    }
}
