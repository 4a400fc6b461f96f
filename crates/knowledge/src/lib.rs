//! Document question answering over a local vector index.
//!
//! Whole documents are embedded and stored in SQLite. Questions are answered
//! by retrieving the most relevant documents (routed by intent, resolved to
//! the right version) and asking an LLM for a schema-constrained answer that
//! cites only what it was shown.

pub mod config;
pub mod embeddings;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod rag;
pub mod retrieval;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

pub use config::{load_config, load_for_app, IntentMode, RagConfig, VersionPolicy};
pub use pipeline::Pipeline;
pub use progress::{ProgressEvent, ProgressReporter};
pub use rag::{AskOutcome, StructuredAnswer, NO_INFORMATION_ANSWER};
pub use types::{
    DocDate, Document, DocumentMetadata, IndexStats, IngestReport, IngestStatus,
    RetrievalResult, ScoredDocument,
};
pub use vector_index::VectorIndex;
