//! Knowledge system type definitions.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Date attached to a document, derived from its filename.
///
/// Calendar and year dates order by recency (a year counts as January 1st).
/// Weekday dates identify a recurring document and carry no recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum DocDate {
    Year(i32),
    Calendar(NaiveDate),
    Weekday(Weekday),
}

impl DocDate {
    /// Date used for recency ordering, `None` for weekdays.
    pub fn recency_key(&self) -> Option<NaiveDate> {
        match self {
            DocDate::Year(year) => NaiveDate::from_ymd_opt(*year, 1, 1),
            DocDate::Calendar(date) => Some(*date),
            DocDate::Weekday(_) => None,
        }
    }

    /// Calendar year, when the date has one.
    pub fn year(&self) -> Option<i32> {
        match self {
            DocDate::Year(year) => Some(*year),
            DocDate::Calendar(date) => Some(date.year()),
            DocDate::Weekday(_) => None,
        }
    }
}

impl fmt::Display for DocDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocDate::Year(year) => write!(f, "{}", year),
            DocDate::Calendar(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DocDate::Weekday(day) => f.write_str(weekday_name(*day)),
        }
    }
}

/// Lower-case English weekday name.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Metadata derived from a document's filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Document type, e.g. "policy", "menu", "generic"
    pub doc_type: String,

    /// Ordered version number, when the naming convention carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DocDate>,

    /// Original filename, as cited by answers
    pub source_name: String,
}

impl DocumentMetadata {
    /// Metadata for a file no extraction strategy recognized.
    pub fn generic(source_name: impl Into<String>) -> Self {
        Self {
            doc_type: "generic".to_string(),
            version: None,
            date: None,
            source_name: source_name.into(),
        }
    }
}

/// A whole, unchunked document as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier (lower-cased filename)
    pub id: String,

    /// Full text content
    pub text: String,

    pub metadata: DocumentMetadata,

    /// SHA-256 of `text`, used to skip unchanged re-ingestion
    pub content_hash: String,

    /// When this document was last written to the index
    pub ingested_at: DateTime<Utc>,
}

/// A document paired with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,

    /// Cosine similarity, only meaningful relative to other scores
    pub score: f32,

    /// Insertion order in the index, the final tie-break
    #[serde(skip)]
    pub seq: i64,
}

impl ScoredDocument {
    pub fn source_name(&self) -> &str {
        &self.document.metadata.source_name
    }

    pub fn doc_type(&self) -> &str {
        &self.document.metadata.doc_type
    }
}

/// How the retriever narrowed the candidate pool for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalDiagnostics {
    /// Nearest neighbours fetched from the index
    pub candidates: usize,

    /// Candidates dropped by the `min_score` floor
    pub below_min_score: usize,

    /// Classified intent ("policy", "menu", "memo", "general")
    pub intent: String,

    /// Doc type the pool was restricted to, if routing applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_to: Option<String>,

    /// Candidates removed by version resolution
    pub superseded: usize,

    /// Source names kept because the query referenced their version or year
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub version_overrides: Vec<String>,
}

/// Ordered retrieval output, by descending score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub documents: Vec<ScoredDocument>,

    pub diagnostics: RetrievalDiagnostics,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Source filenames in rank order.
    pub fn source_names(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|d| d.source_name().to_string())
            .collect()
    }
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Embedded and written to the index
    Indexed,
    /// Same content hash already stored, nothing written
    Unchanged,
}

/// A successfully processed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedFile {
    pub source_name: String,
    pub status: IngestStatus,
    pub metadata: DocumentMetadata,
}

/// A file that could not be ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Summary of an ingestion batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub files: Vec<IngestedFile>,
    pub failed: Vec<IngestFailure>,
    pub duration_secs: f64,
}

impl IngestReport {
    pub fn indexed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == IngestStatus::Indexed)
            .count()
    }

    pub fn unchanged_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == IngestStatus::Unchanged)
            .count()
    }
}

/// Statistics for the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Path to the index directory
    pub index_dir: PathBuf,

    /// Number of stored documents
    pub documents: usize,

    /// Document count per doc type
    pub by_type: BTreeMap<String, usize>,

    /// Embedding dimensions recorded in the manifest
    pub dimensions: usize,

    /// Embedding model recorded in the manifest
    pub embedding_model: String,

    /// Size of the SQLite database in bytes
    pub size_bytes: u64,
}
