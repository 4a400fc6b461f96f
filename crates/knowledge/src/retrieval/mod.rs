//! Query-time retrieval: nearest neighbours, intent routing and version
//! resolution.

pub mod intent;
pub mod ranking;
pub mod version;

pub use intent::{Intent, IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier};
pub use version::{apply_overrides, parse_references, pick_latest, Resolution, VersionReferences};

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::types::{RetrievalDiagnostics, RetrievalResult, ScoredDocument};
use crate::vector_index::VectorIndex;
use docqa_core::{AppError, AppResult};
use docqa_llm::with_rate_limit_retry;
use ranking::sort_ranked;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    config: Arc<RagConfig>,
}

impl Retriever {
    /// Create a retriever. Without a classifier every query is `general`.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: Arc<RagConfig>,
        classifier: Option<Arc<dyn IntentClassifier>>,
    ) -> Self {
        Self {
            index,
            embedder,
            classifier,
            config,
        }
    }

    /// Retrieve at most `top_k` documents for a query.
    ///
    /// An empty index or an empty candidate pool yields an empty result.
    ///
    /// # Errors
    /// * `AppError::Retrieval` - the query could not be embedded
    /// * `AppError::IndexUnavailable` - the index cannot be read or was built
    ///   with other embedding dimensions
    #[instrument(skip(self), fields(top_k = self.config.top_k))]
    pub async fn retrieve(&self, query: &str) -> AppResult<RetrievalResult> {
        let mut diagnostics = RetrievalDiagnostics {
            intent: Intent::General.to_string(),
            ..RetrievalDiagnostics::default()
        };

        if self.index.count()? == 0 {
            tracing::info!("Index is empty, nothing to retrieve");
            return Ok(RetrievalResult {
                documents: Vec::new(),
                diagnostics,
            });
        }

        let embedding = self.embed_query(query).await?;

        let mut candidates = self
            .index
            .query(&embedding, self.config.similarity_search_k)?;
        diagnostics.candidates = candidates.len();

        for c in &candidates {
            tracing::debug!(score = c.score, "Candidate {}", c.source_name());
        }

        if let Some(min_score) = self.config.min_score {
            candidates.retain(|c| c.score >= min_score);
            diagnostics.below_min_score = diagnostics.candidates - candidates.len();
        }

        let intent = match &self.classifier {
            Some(classifier) => classifier.classify(query).await,
            None => Intent::General,
        };
        diagnostics.intent = intent.to_string();
        let (candidates, routed_to) = route_by_intent(candidates, intent);
        diagnostics.routed_to = routed_to;

        let policy_for = |doc_type: &str| self.config.version_policy(doc_type);
        let stage_a = pick_latest(candidates, policy_for);
        let refs = parse_references(query);
        let (resolution, overrides) = apply_overrides(stage_a, &refs, policy_for);
        diagnostics.superseded = resolution.superseded.len();
        diagnostics.version_overrides = overrides;

        for doc in &resolution.superseded {
            tracing::debug!("Superseded by a newer version: {}", doc.source_name());
        }

        let mut documents = resolution.kept;
        sort_ranked(&mut documents);
        documents.truncate(self.config.top_k);

        tracing::info!(
            intent = %intent,
            candidates = diagnostics.candidates,
            returned = documents.len(),
            "Retrieved documents"
        );

        Ok(RetrievalResult {
            documents,
            diagnostics,
        })
    }

    async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        let result = with_rate_limit_retry(
            &self.config.retry,
            Some(self.config.request_timeout()),
            "query embedding",
            || self.embedder.embed(query),
        )
        .await;

        result.map_err(|e| match e {
            AppError::RateLimited { message, .. } => AppError::Retrieval(format!(
                "Embedding provider still rate limited after {} attempts: {}",
                self.config.retry.max_attempts, message
            )),
            other => AppError::Retrieval(format!("Failed to embed query: {}", other)),
        })
    }
}

/// Keep only candidates of the intent's doc type, when any are present.
fn route_by_intent(
    candidates: Vec<ScoredDocument>,
    intent: Intent,
) -> (Vec<ScoredDocument>, Option<String>) {
    let Some(doc_type) = intent.doc_type() else {
        return (candidates, None);
    };

    let present: HashSet<&str> = candidates.iter().map(|c| c.doc_type()).collect();
    if !present.contains(doc_type) {
        tracing::debug!(
            "Intent '{}' has no matching candidates, keeping all types",
            intent
        );
        return (candidates, None);
    }

    let routed = candidates
        .into_iter()
        .filter(|c| c.doc_type() == doc_type)
        .collect();
    (routed, Some(doc_type.to_string()))
}
