//! The engine's configuration surface: one `serde`-deserializable record
//! (§6) composed of a sub-struct per component, every field defaulted so
//! `EngineConfig::default()` is itself a fully functional configuration.
//!
//! Loading this struct from YAML/env files is the excluded collaborator
//! concern (§1); this module owns only the struct, its defaults, and the
//! startup `validate()` pass that disables rather than rejects components
//! missing required secrets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderEntry {
    pub enabled: bool,
    pub name: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature_default: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_default: u32,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Lower is tried earlier among non-preferred, non-primary providers.
    #[serde(default)]
    pub priority: i32,
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_provider_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub keyword_confidence_threshold: f64,
    pub cache_ttl_seconds: i64,
    pub cache_max_entries: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            keyword_confidence_threshold: 0.6,
            cache_ttl_seconds: 3600,
            cache_max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub max_plan_subqueries: usize,
    pub top_urls: usize,
    pub scrape_workers: usize,
    pub scrape_timeout_ms: u64,
    pub rerank_top_k: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_plan_subqueries: 5,
            top_urls: 9,
            scrape_workers: 5,
            scrape_timeout_ms: 10_000,
            rerank_top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerLimits {
    pub max_memory_bytes: u64,
    pub max_cpu_units: f64,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 512 * 1024 * 1024,
            max_cpu_units: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    pub execution_timeout_ms: u64,
    pub max_output_lines: usize,
    pub allowed_imports: Vec<String>,
    pub enable_container_sandbox: bool,
    pub container_limits: ContainerLimits,
    pub max_validation_retries: u32,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            execution_timeout_ms: 30_000,
            max_output_lines: 1000,
            allowed_imports: Vec::new(),
            enable_container_sandbox: false,
            container_limits: ContainerLimits::default(),
            max_validation_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankWeights {
    pub bge: f64,
    pub cross_encoder: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            bge: 0.6,
            cross_encoder: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub embedding_model_id: String,
    pub default_k: usize,
    pub reranker_enabled: bool,
    pub rerank_weights: RerankWeights,
    pub rerank_top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model_id: "text-embedding-3-small".to_string(),
            default_k: 10,
            reranker_enabled: false,
            rerank_weights: RerankWeights::default(),
            rerank_top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProviderConfig {
    pub enabled: bool,
    pub primary: String,
    pub fallback: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_ms: u64,
}

impl Default for DomainProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primary: String::new(),
            fallback: None,
            api_key_env: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub max_concurrent_nodes: usize,
    pub default_node_timeout_ms: u64,
    pub default_retry_budget: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 10,
            default_node_timeout_ms: 30_000,
            default_retry_budget: 3,
        }
    }
}

/// The single top-level configuration record (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub llm_providers: Vec<LlmProviderEntry>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub code: CodeConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub domain_providers: HashMap<String, DomainProviderConfig>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl EngineConfig {
    /// Disable (never reject) any provider/strategy whose required API key
    /// env var is absent; missing keys disable their owner rather than
    /// failing startup (§6).
    pub fn validate(&mut self) {
        for provider in &mut self.llm_providers {
            if provider.enabled && std::env::var(&provider.api_key_env).is_err() {
                provider.enabled = false;
            }
        }
        for domain in self.domain_providers.values_mut() {
            if let Some(ref env_var) = domain.api_key_env {
                if domain.enabled && std::env::var(env_var).is_err() {
                    domain.enabled = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.router.keyword_confidence_threshold, 0.6);
        assert_eq!(cfg.router.cache_ttl_seconds, 3600);
        assert_eq!(cfg.router.cache_max_entries, 1000);
        assert_eq!(cfg.research.top_urls, 9);
        assert_eq!(cfg.research.scrape_workers, 5);
        assert_eq!(cfg.code.execution_timeout_ms, 30_000);
        assert_eq!(cfg.code.container_limits.max_memory_bytes, 512 * 1024 * 1024);
        assert_eq!(cfg.rag.default_k, 10);
        assert_eq!(cfg.rag.rerank_top_k, 5);
        assert_eq!(cfg.workflow.max_concurrent_nodes, 10);
        assert_eq!(cfg.workflow.default_retry_budget, 3);
    }

    #[test]
    fn validate_disables_provider_with_missing_key() {
        let mut cfg = EngineConfig {
            llm_providers: vec![LlmProviderEntry {
                enabled: true,
                name: "test".to_string(),
                endpoint: "https://example.invalid".to_string(),
                api_key_env: "QSE_TEST_DOES_NOT_EXIST_KEY".to_string(),
                model: "test-model".to_string(),
                temperature_default: default_temperature(),
                max_tokens_default: default_max_tokens(),
                timeout_ms: default_provider_timeout_ms(),
                priority: 0,
            }],
            ..Default::default()
        };
        cfg.validate();
        assert!(!cfg.llm_providers[0].enabled);
    }
}
