//! # qse-core
//!
//! A multi-modal query-serving engine core: a hybrid keyword/LLM router, a
//! table-driven strategy dispatcher (research, code, RAG, chat, and
//! domain-data pipelines), an LLM provider manager with deterministic
//! fallback, a three-layer code execution sandbox, and a DAG-based workflow
//! engine for multi-intent requests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use qse_core::{Dispatcher, QueryRequest};
//!
//! let response = dispatcher.query(QueryRequest {
//!     query_text: "what's the weather in Lisbon?".to_string(),
//!     context: Default::default(),
//!     timeout_ms: None,
//! }).await?;
//! ```

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod llm;
pub mod router;
pub mod sandbox;
pub mod scrape;
pub mod search;
pub mod strategies;
pub mod types;
pub mod vectorstore;
pub mod workflow;

pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use llm::{
    AnthropicClient, ChatMessage, ClientConfig, CompletionOptions, CompletionRequest,
    CompletionResponse, EmbeddingRequest, EmbeddingResponse, LLMClient, LlmProviderManager,
    LlmProviderManagerBuilder, OpenAIClient, Provider,
};
pub use router::HybridRouter;
pub use strategies::{Strategy, StrategyRegistry};
pub use types::{
    ChatResult, Chunk, CodeResult, DomainKind, DomainResult, QueryContext, QueryRequest,
    QueryResponse, RagResult, ResearchResult, RoutingDecision, RoutingMethod, Source,
    StrategyOutput, TaskKind, TaskNode, WorkflowPlan, WorkflowRunResult,
};
pub use workflow::{WorkflowEngine, WorkflowEvent};
