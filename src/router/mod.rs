//! The Router (§4.1): given `(query, context)`, produce one [`RoutingDecision`].
//!
//! Three concrete routers live behind the shape used throughout this crate for
//! "one capability, several concrete implementations, a registry selects one at
//! startup" (§9 re-architecture guidance): [`keyword::KeywordRouter`] (pure,
//! cannot fail), [`llm_router::LlmRouter`] (LLM-backed, falls back to keyword on
//! any failure), and [`HybridRouter`] here, which composes the two per the
//! hybrid algorithm and owns the decision cache (§3).

pub mod keyword;
pub mod language;
pub mod llm_router;

use std::sync::Arc;

use crate::cache::{hash_key, TtlLruCache};
use crate::config::RouterConfig;
use crate::llm::LlmProviderManager;
use crate::types::{RoutingDecision, RoutingMethod};

pub use keyword::KeywordRouter;
pub use language::{detect as detect_language, Language};
pub use llm_router::LlmRouter;

/// Hybrid router (§4.1, algorithm 3): run the keyword router; if its
/// confidence is at or above the configured threshold, return it unchanged
/// (property P2 — the LLM router is never invoked on this branch). Otherwise
/// escalate to the LLM router, which itself falls back to the keyword result
/// on any internal failure (`method = keyword_fallback`).
///
/// Decisions are cached under `hash_key(&[query, language_hint])` per §3;
/// a cache hit short-circuits both the keyword and LLM paths.
pub struct HybridRouter {
    keyword: KeywordRouter,
    llm: LlmRouter,
    threshold: f64,
    cache: TtlLruCache<String, RoutingDecision>,
}

impl HybridRouter {
    pub fn new(config: &RouterConfig, llm_manager: Arc<LlmProviderManager>) -> Self {
        Self {
            keyword: KeywordRouter::new(),
            llm: LlmRouter::new(llm_manager),
            threshold: config.keyword_confidence_threshold,
            cache: TtlLruCache::new(config.cache_ttl_seconds, config.cache_max_entries),
        }
    }

    /// `Route(query, context) → RoutingDecision` (§4.1). Never fails for
    /// non-empty input (property P1); concurrency-safe.
    #[tracing::instrument(skip(self), fields(query_len = query.len()))]
    pub async fn route(&self, query: &str, language_hint: Option<&str>) -> RoutingDecision {
        let cache_key = hash_key(&[query, language_hint.unwrap_or("")]);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return cached;
        }

        let keyword_decision = self.keyword.route(query);
        let decision = if keyword_decision.confidence >= self.threshold {
            keyword_decision
        } else {
            self.llm.route(query).await
        };

        self.cache.put(cache_key, decision.clone(), None).await;
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FakeLlmClient, Provider};

    fn router_with_llm_fallback() -> HybridRouter {
        // Any LLM call here would fail (no providers registered), exercising
        // the keyword_fallback path whenever keyword confidence is below
        // threshold.
        let manager = Arc::new(LlmProviderManager::builder().build());
        HybridRouter::new(&RouterConfig::default(), manager)
    }

    #[tokio::test]
    async fn high_confidence_keyword_never_invokes_llm() {
        let router = router_with_llm_fallback();
        let decision = router.route("Calculate 2^10", None).await;
        assert_eq!(decision.method, RoutingMethod::Keyword);
    }

    #[tokio::test]
    async fn low_confidence_keyword_escalates_and_falls_back() {
        let router = router_with_llm_fallback();
        // "hello" keyword-routes to Chat with base confidence (0.5), below
        // the default 0.6 threshold, so the hybrid router escalates; with no
        // LLM providers registered the LLM router itself falls back to
        // keyword.
        let decision = router.route("hello", None).await;
        assert_eq!(decision.method, RoutingMethod::KeywordFallback);
    }

    #[tokio::test]
    async fn repeated_routing_of_deterministic_query_is_cached_and_stable() {
        use pretty_assertions::assert_eq;

        let router = router_with_llm_fallback();
        let first = router.route("Calculate 2^10", None).await;
        let second = router.route("Calculate 2^10", None).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn escalation_path_succeeds_when_llm_available() {
        let manager = Arc::new(
            LlmProviderManager::builder()
                .with_provider(
                    "fake",
                    Arc::new(FakeLlmClient::new(
                        Provider::Anthropic,
                        vec![Ok(r#"{"primary_task": "chat", "confidence": 0.7, "reasoning": "greeting"}"#.to_string())],
                    )),
                )
                .build(),
        );
        let router = HybridRouter::new(&RouterConfig::default(), manager);
        let decision = router.route("hello", None).await;
        assert_eq!(decision.method, RoutingMethod::Llm);
        assert_eq!(decision.confidence, 0.7);
    }
}
