//! Answer types.

use crate::types::RetrievalResult;
use docqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Canonical answer when the documents do not cover a question.
pub const NO_INFORMATION_ANSWER: &str =
    "I don't have information about that in the available documents.";

/// A schema-validated answer.
///
/// Fields beyond the three core ones (e.g. `policy_allows_remote`,
/// `confidence`) are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub answer: String,

    pub reasoning: String,

    /// Source filenames the answer relies on; always a subset of the context
    pub cited_sources: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StructuredAnswer {
    /// Build from a validated field map.
    pub fn from_fields(fields: Map<String, Value>) -> AppResult<Self> {
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| AppError::Generation(format!("Malformed answer fields: {}", e)))
    }

    pub fn policy_allows_remote(&self) -> Option<bool> {
        self.extra.get("policy_allows_remote").and_then(Value::as_bool)
    }

    pub fn confidence(&self) -> Option<&str> {
        self.extra.get("confidence").and_then(Value::as_str)
    }
}

/// What the generator had to correct in the model's reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationDiagnostics {
    /// Citations removed because they named no context document
    pub dropped_citations: usize,

    /// Whether the correction retry was needed
    pub retried: bool,

    /// Set when no documents were retrieved
    pub insufficient_information: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub answer: StructuredAnswer,
    pub diagnostics: GenerationDiagnostics,
}

/// Result of one question through the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskOutcome {
    pub question: String,
    pub answer: StructuredAnswer,
    pub retrieval: RetrievalResult,
    pub generation: GenerationDiagnostics,
}
