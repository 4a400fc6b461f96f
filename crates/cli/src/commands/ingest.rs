//! Ingest command handler.

use super::{open_pipeline, print_json};
use clap::Args;
use docqa_core::{config::AppConfig, AppResult};
use docqa_knowledge::{IngestStatus, ProgressEvent, ProgressReporter};
use std::path::PathBuf;
use std::sync::Arc;

/// Default document directory, relative to the workspace.
const DEFAULT_DOCS_DIR: &str = "docs";

/// Embed documents into the local index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest (default: <workspace>/docs)
    pub paths: Vec<PathBuf>,

    /// Delete the existing index before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let paths = if self.paths.is_empty() {
            vec![config.workspace.join(DEFAULT_DOCS_DIR)]
        } else {
            self.paths.clone()
        };
        tracing::info!(paths = ?paths, reset = self.reset, "Executing ingest command");

        let mut pipeline = open_pipeline(config)?;
        if !self.json {
            pipeline = pipeline.with_progress(ProgressReporter::new(Arc::new(
                |event: ProgressEvent| eprintln!("{}", event.format_simple()),
            )));
        }

        let report = pipeline.ingest(&paths, self.reset).await?;

        if self.json {
            return print_json(&report);
        }

        for file in &report.files {
            let status = match file.status {
                IngestStatus::Indexed => "indexed",
                IngestStatus::Unchanged => "unchanged",
            };
            let version = file
                .metadata
                .version
                .map(|v| format!(" v{}", v))
                .unwrap_or_default();
            println!(
                "  {:<10} {} ({}{})",
                status, file.metadata.source_name, file.metadata.doc_type, version
            );
        }
        for failure in &report.failed {
            println!("  {:<10} {}: {}", "failed", failure.path.display(), failure.message);
        }

        println!();
        println!(
            "Indexed {}, unchanged {}, failed {} in {:.2}s",
            report.indexed_count(),
            report.unchanged_count(),
            report.failed.len(),
            report.duration_secs
        );
        println!("Index: {}", pipeline.index_dir().display());

        Ok(())
    }
}
