//! SQLite-backed vector index.
//!
//! The index is a directory holding `index.sqlite` and `manifest.json`. The
//! manifest pins the embedding dimensions and model so a query embedded by a
//! different configuration is rejected instead of silently mis-ranked.

use crate::retrieval::ranking::sort_ranked;
use crate::types::{Document, DocumentMetadata, IndexStats, ScoredDocument};
use crate::vector_index::VectorIndex;
use chrono::{DateTime, Utc};
use docqa_core::{AppError, AppResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const INDEX_DB_FILE: &str = "index.sqlite";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCHEMA_VERSION: u32 = 1;

const RECOVERY_HINT: &str = "run `docqa clean` and re-ingest";

/// Index metadata persisted next to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub dimensions: usize,
    pub embedding_model: String,
    pub schema_version: u32,
}

/// SQLite vector index with brute-force cosine search.
pub struct SqliteIndex {
    dir: PathBuf,
    manifest: IndexManifest,
    conn: Mutex<Connection>,
}

fn unavailable(context: &str, e: impl Display) -> AppError {
    AppError::IndexUnavailable(format!("{}: {} ({})", context, e, RECOVERY_HINT))
}

impl SqliteIndex {
    /// Open the index at `dir` for writing, creating it when absent.
    ///
    /// # Errors
    /// `AppError::IndexUnavailable` if an existing index was built with other
    /// embedding settings or cannot be read.
    pub fn create(dir: &Path, dimensions: usize, embedding_model: &str) -> AppResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::Knowledge(format!("Failed to create index directory: {}", e)))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let existing = read_manifest(dir)?;
            if existing.dimensions != dimensions || existing.embedding_model != embedding_model {
                return Err(AppError::IndexUnavailable(format!(
                    "Index at {:?} was built with '{}' ({} dims), current config is '{}' ({} dims). Re-ingest with --reset",
                    dir, existing.embedding_model, existing.dimensions, embedding_model, dimensions
                )));
            }
            existing
        } else {
            let manifest = IndexManifest {
                dimensions,
                embedding_model: embedding_model.to_string(),
                schema_version: SCHEMA_VERSION,
            };
            let json = serde_json::to_string_pretty(&manifest)?;
            std::fs::write(&manifest_path, json).map_err(|e| {
                AppError::Knowledge(format!("Failed to write index manifest: {}", e))
            })?;
            manifest
        };

        let conn = Connection::open(dir.join(INDEX_DB_FILE))
            .map_err(|e| unavailable("Failed to open SQLite index", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                doc_type TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                ingested_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type);
            "#,
        )
        .map_err(|e| unavailable("Failed to create tables", e))?;

        tracing::debug!("Initialized SQLite index at {:?}", dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing index for querying.
    ///
    /// # Errors
    /// `AppError::IndexUnavailable` if the directory, manifest or database is
    /// missing or unreadable.
    pub fn open(dir: &Path) -> AppResult<Self> {
        if !dir.is_dir() {
            return Err(AppError::IndexUnavailable(format!(
                "No index at {:?}. Run `docqa ingest` first",
                dir
            )));
        }

        let manifest = read_manifest(dir)?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(unavailable(
                "Unsupported index schema",
                format!(
                    "found v{}, expected v{}",
                    manifest.schema_version, SCHEMA_VERSION
                ),
            ));
        }

        let db_path = dir.join(INDEX_DB_FILE);
        if !db_path.is_file() {
            return Err(unavailable("Index database missing", db_path.display()));
        }

        let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|e| unavailable("Failed to open SQLite index", e))?;

        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| unavailable("Index database is unreadable", e))?;

        tracing::debug!(
            "Opened SQLite index at {:?} ({} dims, model {})",
            dir,
            manifest.dimensions,
            manifest.embedding_model
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            conn: Mutex::new(conn),
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Knowledge("Index connection lock poisoned".to_string()))
    }

    fn check_dimensions(&self, len: usize) -> AppResult<()> {
        if len != self.manifest.dimensions {
            return Err(AppError::IndexUnavailable(format!(
                "Embedding has {} dimensions but the index expects {} (model '{}'). Re-ingest with --reset",
                len, self.manifest.dimensions, self.manifest.embedding_model
            )));
        }
        Ok(())
    }
}

fn read_manifest(dir: &Path) -> AppResult<IndexManifest> {
    let path = dir.join(MANIFEST_FILE);
    let content =
        std::fs::read_to_string(&path).map_err(|e| unavailable("Index manifest missing", e))?;
    serde_json::from_str(&content).map_err(|e| unavailable("Index manifest is corrupt", e))
}

struct StoredRow {
    seq: i64,
    id: String,
    text: String,
    embedding: Vec<u8>,
    metadata: String,
    content_hash: String,
    ingested_at: String,
}

const SELECT_COLUMNS: &str =
    "SELECT seq, id, text, embedding, metadata, content_hash, ingested_at FROM documents";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        text: row.get(2)?,
        embedding: row.get(3)?,
        metadata: row.get(4)?,
        content_hash: row.get(5)?,
        ingested_at: row.get(6)?,
    })
}

impl StoredRow {
    fn into_document(self) -> AppResult<(Document, Vec<f32>, i64)> {
        let metadata: DocumentMetadata = serde_json::from_str(&self.metadata)
            .map_err(|e| unavailable(&format!("Corrupt metadata for '{}'", self.id), e))?;
        let ingested_at = DateTime::parse_from_rfc3339(&self.ingested_at)
            .map_err(|e| unavailable(&format!("Corrupt timestamp for '{}'", self.id), e))?
            .with_timezone(&Utc);
        let embedding = bytes_to_embedding(&self.embedding)?;

        let document = Document {
            id: self.id,
            text: self.text,
            metadata,
            content_hash: self.content_hash,
            ingested_at,
        };
        Ok((document, embedding, self.seq))
    }
}

impl VectorIndex for SqliteIndex {
    fn upsert(&self, document: &Document, embedding: &[f32]) -> AppResult<()> {
        self.check_dimensions(embedding.len())?;

        let metadata_json = serde_json::to_string(&document.metadata)
            .map_err(|e| AppError::Knowledge(format!("Failed to serialize metadata: {}", e)))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (id, doc_type, text, embedding, metadata, content_hash, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                doc_type = excluded.doc_type,
                text = excluded.text,
                embedding = excluded.embedding,
                metadata = excluded.metadata,
                content_hash = excluded.content_hash,
                ingested_at = excluded.ingested_at",
            params![
                document.id,
                document.metadata.doc_type,
                document.text,
                embedding_to_bytes(embedding),
                metadata_json,
                document.content_hash,
                document.ingested_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to upsert document: {}", e)))?;

        tracing::debug!("Upserted document '{}'", document.id);
        Ok(())
    }

    fn query(&self, embedding: &[f32], k: usize) -> AppResult<Vec<ScoredDocument>> {
        self.check_dimensions(embedding.len())?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(SELECT_COLUMNS)
            .map_err(|e| unavailable("Failed to prepare query", e))?;

        let rows = stmt
            .query_map([], read_row)
            .map_err(|e| unavailable("Failed to query documents", e))?;

        let mut results = Vec::new();
        for row in rows {
            let row = row.map_err(|e| unavailable("Failed to read document row", e))?;
            let (document, stored, seq) = row.into_document()?;
            if stored.len() != self.manifest.dimensions {
                return Err(unavailable(
                    &format!("Stored vector for '{}' has wrong size", document.id),
                    stored.len(),
                ));
            }
            let score = cosine_similarity(embedding, &stored);
            results.push(ScoredDocument {
                document,
                score,
                seq,
            });
        }

        sort_ranked(&mut results);
        results.truncate(k);

        tracing::debug!("Retrieved {} documents (requested top-{})", results.len(), k);

        Ok(results)
    }

    fn count(&self) -> AppResult<usize> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .map_err(|e| unavailable("Failed to count documents", e))
    }

    fn get(&self, doc_id: &str) -> AppResult<Option<Document>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![doc_id],
                read_row,
            )
            .optional()
            .map_err(|e| unavailable("Failed to read document", e))?;

        row.map(|r| r.into_document().map(|(doc, _, _)| doc))
            .transpose()
    }

    fn content_hash(&self, doc_id: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT content_hash FROM documents WHERE id = ?1",
            params![doc_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| unavailable("Failed to read content hash", e))
    }

    fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    fn stats(&self) -> AppResult<IndexStats> {
        let by_type = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare("SELECT doc_type, COUNT(*) FROM documents GROUP BY doc_type")
                .map_err(|e| unavailable("Failed to prepare stats query", e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })
                .map_err(|e| unavailable("Failed to collect stats", e))?;

            let mut by_type = BTreeMap::new();
            for row in rows {
                let (doc_type, count) = row.map_err(|e| unavailable("Failed to collect stats", e))?;
                by_type.insert(doc_type, count);
            }
            by_type
        };

        let size_bytes = std::fs::metadata(self.dir.join(INDEX_DB_FILE))
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(IndexStats {
            index_dir: self.dir.clone(),
            documents: by_type.values().sum(),
            by_type,
            dimensions: self.manifest.dimensions,
            embedding_model: self.manifest.embedding_model.clone(),
            size_bytes,
        })
    }

    fn reset(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM documents", [])
            .map_err(|e| AppError::Knowledge(format!("Failed to delete documents: {}", e)))?;

        tracing::info!("Reset document index");
        Ok(())
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(unavailable(
            "Invalid embedding bytes length",
            bytes.len(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
