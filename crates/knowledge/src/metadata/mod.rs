//! Filename metadata extraction.
//!
//! Derives document type, version and date from a filename through a chain
//! of pluggable strategies. Extraction never fails: names no strategy
//! recognizes become "generic" documents.

mod chain;
mod pattern;

pub use chain::{ExtractorChain, GenericExtractor};
pub use pattern::{default_rules, PatternExtractor, PatternRule};

use crate::types::DocumentMetadata;
use sha2::{Digest, Sha256};

/// A filename metadata strategy.
pub trait MetadataExtractor: Send + Sync {
    /// Strategy name, used in debug logs.
    fn name(&self) -> &str;

    /// Extract metadata, or `None` when the filename does not match.
    fn extract(&self, filename: &str) -> Option<DocumentMetadata>;
}

/// Stable document id for a filename.
pub fn doc_id(filename: &str) -> String {
    filename.to_lowercase()
}

/// Generate SHA-256 content hash for change detection
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
