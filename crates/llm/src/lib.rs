//! LLM integration crate for docqa.
//!
//! This crate provides a provider-agnostic abstraction for requesting
//! schema-constrained completions from Large Language Models, plus the
//! rate-limit retry discipline every provider call goes through.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//!
//! # Example
//! ```no_run
//! use docqa_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let schema = serde_json::json!({"type": "object"});
//! let request = LlmRequest::new("Reply with an empty object", "llama3.2").with_format(schema);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod retry;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::OllamaClient;
pub use retry::{with_rate_limit_retry, RetryPolicy};
pub use types::{LlmSettings, ProviderType};
