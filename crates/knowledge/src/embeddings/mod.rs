//! Embedding providers.
//!
//! Converts document and query text into fixed-dimension vectors.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
