//! Crate-wide error taxonomy.
//!
//! Most variants here are *engine-internal* causes (transport failures, storage
//! errors, timeouts). Per the error handling design, almost none of them ever
//! reach a caller directly: strategies catch their own recoverable variants
//! (`InvalidInput`, `SandboxViolation`, `SandboxTimeout`) at the strategy
//! boundary and fold them into the corresponding typed result instead of
//! returning `Err`. Only `AllProvidersFailed` and `Internal` are allowed to
//! surface from the top-level query entry point.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Query text was empty, whitespace-only, or a required entity (location,
    /// ticker, route endpoints) could not be extracted. Strategies catch this
    /// and fold it into an explanatory result; it should rarely escape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single provider (LLM or external API) is unavailable. Handled
    /// internally by fallback/skip; not meant to surface on its own.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Every configured LLM provider failed in sequence. Terminal; this is
    /// one of the two variants allowed to reach the caller as an `Err`.
    #[error("all providers failed, last error: {0}")]
    AllProvidersFailed(String),

    /// Generated code failed sandbox static validation (layer 1 or 2).
    #[error("sandbox policy violation: {0}")]
    SandboxViolation(String),

    /// Sandboxed execution exceeded its wall-clock, memory, or CPU cap.
    #[error("sandbox execution timed out after {duration_ms}ms")]
    SandboxTimeout { duration_ms: u64 },

    /// Deadline or explicit cancellation observed mid-flight.
    #[error("operation cancelled")]
    Cancelled,

    /// A workflow plan's dependency relation is not acyclic.
    #[error("workflow plan is not acyclic: {0}")]
    NotAcyclic(String),

    /// A workflow plan referenced a `depends_on` id with no matching node.
    #[error("workflow plan references unknown node: {0}")]
    UnknownNode(String),

    /// Timeout during an external call (search, scrape, domain provider).
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// LLM error (transport, non-2xx response, or unparseable payload).
    #[error("LLM error: {0}")]
    LLM(String),

    /// Vector store storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// HTTP transport error (search, scrape, domain provider, LLM API).
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected programming error; logged with full context and surfaced
    /// as a generic error result. The other variant allowed to reach the
    /// caller as an `Err`.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True if this error kind is recoverable by the caller's strategy (i.e.
    /// should be folded into a typed result rather than propagated). Also
    /// used by `LlmProviderManager::attempt_with_backoff` as the inverse
    /// gate on same-provider retry: these kinds mean the provider (or the
    /// input) is known bad, not that the call hit a transient blip, so a
    /// retry cannot help and the manager moves straight to the next
    /// candidate provider instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::ProviderUnavailable(_)
                | Self::SandboxViolation(_)
                | Self::SandboxTimeout { .. }
                | Self::Cancelled
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
