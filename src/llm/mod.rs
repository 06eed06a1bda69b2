//! The LLM Provider Manager surface (§4.9): a provider-agnostic client
//! trait, concrete Anthropic/OpenAI/Google clients, and the fallback-order
//! manager every strategy completes and embeds through.
//!
//! ## Example
//!
//! ```rust,ignore
//! use qse_core::llm::{AnthropicClient, ClientConfig, CompletionRequest, ChatMessage, LlmProviderManager};
//!
//! let client = AnthropicClient::new(
//!     ClientConfig::new("your-api-key").with_default_model("claude-3-5-sonnet-20241022"),
//! );
//! let manager = LlmProviderManager::builder()
//!     .with_provider("anthropic", std::sync::Arc::new(client))
//!     .with_primary("anthropic")
//!     .build();
//!
//! let request = CompletionRequest::new().with_message(ChatMessage::user("Hello"));
//! let response = manager.complete(request, &Default::default()).await?;
//! ```

mod client;
mod manager;
mod types;

pub use client::{AnthropicClient, ClientConfig, LLMClient, OpenAIClient};
#[cfg(feature = "gemini")]
pub use client::GoogleClient;
pub use manager::{
    CompletionOptions, FakeLlmClient, LlmProviderManager, LlmProviderManagerBuilder,
};
pub use types::{
    CacheControl, ChatMessage, ChatRole, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse, ModelSpec, ModelTier, Provider, StopReason, TokenUsage,
};
