//! Stats command handler.

use super::{open_pipeline, print_json};
use clap::Args;
use docqa_core::{config::AppConfig, AppResult};

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let stats = open_pipeline(config)?.stats()?;

        if self.json {
            return print_json(&stats);
        }

        println!("Index: {}", stats.index_dir.display());
        println!("Documents: {}", stats.documents);
        for (doc_type, count) in &stats.by_type {
            println!("  {:<10} {}", doc_type, count);
        }
        println!(
            "Embeddings: {} ({} dimensions)",
            stats.embedding_model, stats.dimensions
        );
        println!("Size: {:.2} KB", stats.size_bytes as f64 / 1024.0);

        Ok(())
    }
}
