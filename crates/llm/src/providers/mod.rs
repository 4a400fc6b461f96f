//! LLM provider implementations.

pub mod ollama;

pub use ollama::{status_error, OllamaClient};
