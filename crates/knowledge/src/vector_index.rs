//! Vector index abstraction for whole documents.
//!
//! Defines a trait for backend-agnostic vector storage and retrieval.

use crate::types::{Document, IndexStats, ScoredDocument};
use docqa_core::AppResult;

/// Trait for vector index backends.
///
/// Implementations must support:
/// - Idempotent, atomic upsert keyed by document id
/// - k-nearest-neighbour search ordered by descending similarity
/// - Persistence across restarts, with missing or corrupt state reported as
///   `AppError::IndexUnavailable` rather than an empty index
///
/// Methods take `&self`; backends serialize writes internally so one index
/// can be shared across concurrent ingestion tasks.
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a document with its embedding.
    ///
    /// Replacing keeps the document's original insertion order.
    fn upsert(&self, document: &Document, embedding: &[f32]) -> AppResult<()>;

    /// Search for the `k` most similar documents.
    ///
    /// Never returns more than `count()` results. Ties are broken by date
    /// recency, then insertion order.
    fn query(&self, embedding: &[f32], k: usize) -> AppResult<Vec<ScoredDocument>>;

    /// Number of stored documents.
    fn count(&self) -> AppResult<usize>;

    /// Fetch a stored document by id.
    fn get(&self, doc_id: &str) -> AppResult<Option<Document>>;

    /// Stored content hash for a document id, if present.
    fn content_hash(&self, doc_id: &str) -> AppResult<Option<String>>;

    /// Embedding dimensions this index accepts.
    fn dimensions(&self) -> usize;

    /// Get statistics about the index.
    fn stats(&self) -> AppResult<IndexStats>;

    /// Remove every document.
    fn reset(&self) -> AppResult<()>;
}
