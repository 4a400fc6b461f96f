//! End-to-end operations: ingest, ask, stats, clean.

use crate::config::{get_index_dir, IntentMode, RagConfig};
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::index::SqliteIndex;
use crate::metadata::{content_hash, doc_id, ExtractorChain};
use crate::progress::ProgressReporter;
use crate::rag::{AskOutcome, Generator};
use crate::retrieval::{IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier, Retriever};
use crate::types::{
    Document, IndexStats, IngestFailure, IngestReport, IngestStatus, IngestedFile,
};
use crate::vector_index::VectorIndex;
use chrono::Utc;
use docqa_core::{AppError, AppResult};
use docqa_llm::{create_client, with_rate_limit_retry, LlmClient};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;
use walkdir::WalkDir;

/// File extensions picked up when walking a directory.
const INGEST_EXTENSIONS: &[&str] = &["txt", "md"];

/// Wires configuration, providers and the index together.
pub struct Pipeline {
    workspace: PathBuf,
    config: Arc<RagConfig>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmClient>,
    extractor: ExtractorChain,
    progress: ProgressReporter,
}

impl Pipeline {
    /// Build a pipeline with providers created from configuration.
    pub fn from_config(workspace: &Path, config: RagConfig) -> AppResult<Self> {
        let timeout = config.request_timeout();
        let embedder = create_provider(&config.embedding, timeout)?;
        let llm = create_client(&config.llm, timeout)?;
        Self::with_providers(workspace, config, embedder, llm)
    }

    /// Build a pipeline around explicit providers.
    pub fn with_providers(
        workspace: &Path,
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
    ) -> AppResult<Self> {
        config.validate()?;
        let extractor = ExtractorChain::new(&config.metadata_patterns)?;

        Ok(Self {
            workspace: workspace.to_path_buf(),
            config: Arc::new(config),
            embedder,
            llm,
            extractor,
            progress: ProgressReporter::noop(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn index_dir(&self) -> PathBuf {
        get_index_dir(&self.workspace)
    }

    /// Ingest files and directories into the index.
    ///
    /// Directories are walked for `.txt` and `.md` files. Per-file failures
    /// are collected in the report and the batch continues. Files whose
    /// content and metadata are already stored are left untouched.
    ///
    /// # Errors
    /// `AppError::IndexUnavailable` if the index cannot be opened or was
    /// built with another embedding model. Per-file errors are not returned.
    #[instrument(skip(self, paths), fields(paths = paths.len(), reset))]
    pub async fn ingest(&self, paths: &[PathBuf], reset: bool) -> AppResult<IngestReport> {
        let start = Instant::now();
        let index_dir = self.index_dir();

        if reset && index_dir.exists() {
            tracing::info!("Resetting index at {:?}", index_dir);
            std::fs::remove_dir_all(&index_dir)?;
        }

        let index = SqliteIndex::create(
            &index_dir,
            self.embedder.dimensions(),
            self.embedder.model_name(),
        )?;

        let (files, mut failed) = discover_files(paths);
        let (files, duplicates) = reject_duplicate_ids(files);
        failed.extend(duplicates);
        let total = files.len() as u64;
        self.progress.discovered(total);
        tracing::info!("Ingesting {} file(s)", total);

        let index = &index;
        let outcomes: Vec<_> = stream::iter(files)
            .map(|path| async move {
                let outcome = self.ingest_file(index, &path).await;
                (path, outcome)
            })
            .buffer_unordered(self.config.ingest_concurrency)
            .collect()
            .await;

        let mut report = IngestReport::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(file) => {
                    let phase = match file.status {
                        IngestStatus::Indexed => "index",
                        IngestStatus::Unchanged => "skip",
                    };
                    self.progress.file_done(phase, total, &file.source_name);
                    report.files.push(file);
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {}", path, e);
                    self.progress
                        .file_done("fail", total, &path.display().to_string());
                    failed.push(IngestFailure {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        report
            .files
            .sort_by(|a, b| a.source_name.cmp(&b.source_name));
        failed.sort_by(|a, b| a.path.cmp(&b.path));
        report.failed = failed;
        report.duration_secs = start.elapsed().as_secs_f64();

        tracing::info!(
            "Ingestion completed: {} indexed, {} unchanged, {} failed in {:.2}s",
            report.indexed_count(),
            report.unchanged_count(),
            report.failed.len(),
            report.duration_secs
        );

        Ok(report)
    }

    async fn ingest_file(&self, index: &SqliteIndex, path: &Path) -> AppResult<IngestedFile> {
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AppError::ingestion(path.display().to_string(), "not a file path"))?;

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::ingestion(&source_name, format!("failed to read: {}", e)))?;
        if text.trim().is_empty() {
            return Err(AppError::ingestion(&source_name, "file is empty"));
        }

        let metadata = self.extractor.extract(&source_name);
        let id = doc_id(&source_name);
        let hash = content_hash(&text);

        if index.content_hash(&id)?.as_deref() == Some(hash.as_str()) {
            let stored = index.get(&id)?;
            if stored.is_some_and(|doc| doc.metadata == metadata) {
                tracing::debug!("Unchanged: {}", source_name);
                return Ok(IngestedFile {
                    source_name,
                    status: IngestStatus::Unchanged,
                    metadata,
                });
            }
        }

        let embedding = with_rate_limit_retry(
            &self.config.retry,
            Some(self.config.request_timeout()),
            "document embedding",
            || self.embedder.embed(&text),
        )
        .await
        .map_err(|e| AppError::ingestion(&source_name, format!("embedding failed: {}", e)))?;

        let document = Document {
            id,
            text,
            metadata: metadata.clone(),
            content_hash: hash,
            ingested_at: Utc::now(),
        };
        index
            .upsert(&document, &embedding)
            .map_err(|e| AppError::ingestion(&source_name, e.to_string()))?;

        tracing::debug!(
            "Indexed {} as {} (version {:?}, date {:?})",
            source_name,
            metadata.doc_type,
            metadata.version,
            metadata.date
        );

        Ok(IngestedFile {
            source_name,
            status: IngestStatus::Indexed,
            metadata,
        })
    }

    /// Open the index for querying and check it matches the embedder.
    fn open_index(&self) -> AppResult<SqliteIndex> {
        let index = SqliteIndex::open(&self.index_dir())?;
        let manifest = index.manifest();
        if manifest.embedding_model != self.embedder.model_name()
            || manifest.dimensions != self.embedder.dimensions()
        {
            return Err(AppError::IndexUnavailable(format!(
                "Index was built with '{}' ({} dims) but '{}' ({} dims) is configured. Re-ingest with --reset",
                manifest.embedding_model,
                manifest.dimensions,
                self.embedder.model_name(),
                self.embedder.dimensions()
            )));
        }
        Ok(index)
    }

    fn classifier(&self) -> Option<Arc<dyn IntentClassifier>> {
        match self.config.intent {
            IntentMode::Keyword => Some(Arc::new(KeywordIntentClassifier::default())),
            IntentMode::Llm => Some(Arc::new(LlmIntentClassifier::new(
                self.llm.clone(),
                &self.config,
                &self.workspace,
            ))),
            IntentMode::Off => None,
        }
    }

    /// Answer a question from the indexed documents.
    ///
    /// # Errors
    /// * `AppError::IndexUnavailable` - no usable index
    /// * `AppError::Retrieval` - the question could not be embedded
    /// * `AppError::Generation` - no valid answer could be produced
    #[instrument(skip(self))]
    pub async fn ask(&self, question: &str) -> AppResult<AskOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Retrieval("Question is empty".to_string()));
        }

        let index: Arc<dyn VectorIndex> = Arc::new(self.open_index()?);
        let retriever = Retriever::new(
            index,
            self.embedder.clone(),
            self.config.clone(),
            self.classifier(),
        );
        let retrieval = retriever.retrieve(question).await?;

        let generator = Generator::new(self.llm.clone(), &self.config, &self.workspace);
        let outcome = generator.generate(question, &retrieval).await?;

        Ok(AskOutcome {
            question: question.to_string(),
            answer: outcome.answer,
            retrieval,
            generation: outcome.diagnostics,
        })
    }

    pub fn stats(&self) -> AppResult<IndexStats> {
        SqliteIndex::open(&self.index_dir())?.stats()
    }

    /// Delete the index directory. Returns whether anything was removed.
    pub fn clean(&self) -> AppResult<bool> {
        let dir = self.index_dir();
        if !dir.exists() {
            tracing::info!("No index at {:?}", dir);
            return Ok(false);
        }

        std::fs::remove_dir_all(&dir)?;
        tracing::info!("Removed index at {:?}", dir);
        Ok(true)
    }
}

fn has_ingest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            INGEST_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Expand paths into files. Explicit files are taken as given; directories
/// contribute their `.txt`/`.md` files in name order. A file reached through
/// more than one path is listed once.
fn discover_files(paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<IngestFailure>) {
    let mut files = Vec::new();
    let mut failed = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
            {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && has_ingest_extension(entry.path()) => {
                        files.push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Skipping unreadable entry under {:?}: {}", path, e);
                    }
                }
            }
        } else {
            failed.push(IngestFailure {
                path: path.clone(),
                message: "path does not exist".to_string(),
            });
        }
    }

    let mut seen = HashSet::new();
    files.retain(|file| seen.insert(file.canonicalize().unwrap_or_else(|_| file.clone())));
    (files, failed)
}

/// Keep the first file for each document id; later files with the same id
/// would overwrite it in the index, so they are reported as failures.
fn reject_duplicate_ids(files: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<IngestFailure>) {
    let mut first_by_id: HashMap<String, PathBuf> = HashMap::new();
    let mut kept = Vec::with_capacity(files.len());
    let mut failed = Vec::new();

    for file in files {
        let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
            kept.push(file);
            continue;
        };
        let id = doc_id(&name);
        match first_by_id.get(&id) {
            Some(first) => {
                tracing::warn!(
                    "Skipping {:?}: document id '{}' already taken by {:?}",
                    file,
                    id,
                    first
                );
                failed.push(IngestFailure {
                    message: format!(
                        "duplicate document id '{}', already ingested from {}",
                        id,
                        first.display()
                    ),
                    path: file,
                });
            }
            None => {
                first_by_id.insert(id, file.clone());
                kept.push(file);
            }
        }
    }

    (kept, failed)
}
