//! Command handlers for the docqa CLI.

pub mod ask;
pub mod clean;
pub mod ingest;
pub mod stats;

pub use ask::AskCommand;
pub use clean::CleanCommand;
pub use ingest::IngestCommand;
pub use stats::StatsCommand;

use docqa_core::{config::AppConfig, AppResult};
use docqa_knowledge::{load_for_app, Pipeline};
use serde::Serialize;

/// Build the pipeline for the workspace named by `config`.
pub(crate) fn open_pipeline(config: &AppConfig) -> AppResult<Pipeline> {
    let rag = load_for_app(config)?;
    Pipeline::from_config(&config.workspace, rag)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
