//! Error types for docqa.
//!
//! One enum covers the query-pipeline taxonomy (ingestion, index, retrieval,
//! generation, rate limiting) plus the ambient categories (configuration,
//! I/O, LLM transport, prompts, serialization).

use thiserror::Error;

/// Unified error type for docqa.
///
/// All fallible functions return `Result<T, AppError>`. Query-time failures
/// are always surfaced to the caller as one of these variants; nothing is
/// silently converted into an empty answer.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Per-file ingestion failure (unreadable file, embedding failure).
    /// Collected by the pipeline, never aborts a batch.
    #[error("Ingestion failed for {source_name}: {message}")]
    Ingestion {
        source_name: String,
        message: String,
    },

    /// The vector store is missing, corrupted or incompatible.
    /// Recovery is a full re-ingestion.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Query-time retrieval failure (embedding provider)
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// LLM failure or repeated schema-validation failure
    #[error("Generation error: {0}")]
    Generation(String),

    /// Provider backpressure signal (HTTP 429)
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// LLM provider transport errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base errors not covered by a more specific variant
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error is a provider backpressure signal worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited { .. })
    }

    /// Build a per-file ingestion error.
    pub fn ingestion(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Ingestion {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
