//! LLM provider factory.
//!
//! Builds an `LlmClient` from the configured provider settings.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use crate::types::{LlmSettings, ProviderType};
use docqa_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Create an LLM client for the configured provider.
///
/// # Arguments
/// * `settings` - Provider name, model and optional endpoint
/// * `timeout` - Per-request HTTP timeout
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(settings: &LlmSettings, timeout: Duration) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(&settings.provider) {
        Some(ProviderType::Ollama) => {
            let base_url = settings.endpoint.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            tracing::debug!("Creating Ollama client at {} for model {}", base_url, settings.model);
            Ok(Arc::new(OllamaClient::with_timeout(base_url, timeout)))
        }
        None => Err(AppError::Config(format!(
            "Unknown LLM provider: {}. Supported: ollama",
            settings.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client(&LlmSettings::default(), Duration::from_secs(5)).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let settings = LlmSettings {
            endpoint: Some("http://localhost:8080".to_string()),
            ..LlmSettings::default()
        };
        assert!(create_client(&settings, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let settings = LlmSettings {
            provider: "unknown".to_string(),
            ..LlmSettings::default()
        };
        match create_client(&settings, Duration::from_secs(5)) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown LLM provider")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
