//! RAG configuration management.
//!
//! `RagConfig` is the `rag:` section of `.docqa/config.yaml`. It is loaded
//! and validated once, then shared read-only.

use crate::embeddings::EmbeddingConfig;
use crate::metadata::{PatternExtractor, PatternRule};
use docqa_core::config::STATE_DIR;
use docqa_core::{AppConfig, AppError, AppResult};
use docqa_llm::{LlmSettings, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How version resolution treats one doc type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Keep the latest version unless the query names an older one
    #[default]
    LatestWins,
    /// Always keep only the latest version
    LatestOnly,
    /// Keep every version
    KeepAll,
}

/// Query intent classification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentMode {
    #[default]
    Keyword,
    Llm,
    Off,
}

/// Retrieval and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Documents handed to the generator
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Nearest neighbours fetched before filtering (>= top_k)
    #[serde(default = "default_similarity_search_k")]
    pub similarity_search_k: usize,

    /// Sampling temperature for answers
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Sampling temperature for intent classification
    #[serde(default)]
    pub intent_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Relevance floor; candidates scoring below it are dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    /// Files embedded concurrently during ingestion
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,

    /// Per-request timeout for embedding and LLM calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub intent: IntentMode,

    /// Per doc type version policy; unlisted types use `latest_wins`
    #[serde(default)]
    pub version_policies: BTreeMap<String, VersionPolicy>,

    /// Extra filename rules, tried before the built-in conventions
    #[serde(default)]
    pub metadata_patterns: Vec<PatternRule>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub llm: LlmSettings,
}

fn default_top_k() -> usize {
    5
}

fn default_similarity_search_k() -> usize {
    10
}

fn default_temperature() -> f32 {
    0.5
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_ingest_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_search_k: default_similarity_search_k(),
            temperature: default_temperature(),
            intent_temperature: 0.0,
            max_tokens: default_max_tokens(),
            min_score: None,
            ingest_concurrency: default_ingest_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryPolicy::default(),
            intent: IntentMode::default(),
            version_policies: BTreeMap::new(),
            metadata_patterns: Vec::new(),
            embedding: EmbeddingConfig::default(),
            llm: LlmSettings::default(),
        }
    }
}

/// Whole config file; only the `rag` section is read here.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    rag: Option<RagConfig>,
}

impl RagConfig {
    /// Version policy for a doc type.
    pub fn version_policy(&self, doc_type: &str) -> VersionPolicy {
        self.version_policies
            .get(doc_type)
            .copied()
            .unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check cross-field constraints and compile configured patterns.
    pub fn validate(&self) -> AppResult<()> {
        if self.top_k == 0 {
            return Err(AppError::Config("rag.top_k must be at least 1".to_string()));
        }

        if self.similarity_search_k < self.top_k {
            return Err(AppError::Config(format!(
                "rag.similarity_search_k ({}) must be >= rag.top_k ({})",
                self.similarity_search_k, self.top_k
            )));
        }

        if !(0.0..=2.0).contains(&self.temperature) || !(0.0..=2.0).contains(&self.intent_temperature)
        {
            return Err(AppError::Config(
                "rag temperatures must be between 0.0 and 2.0".to_string(),
            ));
        }

        if let Some(min) = self.min_score {
            if !(-1.0..=1.0).contains(&min) {
                return Err(AppError::Config(format!(
                    "rag.min_score must be between -1.0 and 1.0, got {}",
                    min
                )));
            }
        }

        if self.ingest_concurrency == 0 {
            return Err(AppError::Config(
                "rag.ingest_concurrency must be at least 1".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "rag.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "rag.retry.max_attempts must be at least 1".to_string(),
            ));
        }

        for rule in &self.metadata_patterns {
            PatternExtractor::new(rule)?;
        }

        self.embedding.validate()
    }

    /// Apply model overrides from flags or environment.
    pub fn with_model_overrides(mut self, app: &AppConfig) -> Self {
        if let Some(model) = &app.llm_model {
            self.llm.model = model.clone();
        }
        if let Some(model) = &app.embedding_model {
            self.embedding.model = model.clone();
        }
        self
    }
}

/// Load the `rag` section from a config file.
///
/// A missing file or section yields defaults. The result is validated.
pub fn load_config(config_path: &Path) -> AppResult<RagConfig> {
    let config = if config_path.exists() {
        let content = fs::read_to_string(config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded rag config from {:?}", config_path);
        file.rag.unwrap_or_default()
    } else {
        tracing::debug!(
            "No config file at {:?}, using default rag config",
            config_path
        );
        RagConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Load the effective config for an application context.
pub fn load_for_app(app: &AppConfig) -> AppResult<RagConfig> {
    let config = load_config(&app.config_path())?.with_model_overrides(app);
    config.validate()?;
    Ok(config)
}

/// Write a config file holding the given `rag` section.
pub fn save_config(config_path: &Path, config: &RagConfig) -> AppResult<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let mut root = serde_yaml::Mapping::new();
    root.insert(
        serde_yaml::Value::String("rag".to_string()),
        serde_yaml::to_value(config)?,
    );

    let yaml = serde_yaml::to_string(&root)
        .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;

    fs::write(config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved rag config to {:?}", config_path);
    Ok(())
}

/// Get the index directory for a workspace.
pub fn get_index_dir(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("index")
}
