//! Clean command handler.

use super::open_pipeline;
use clap::Args;
use docqa_core::{config::AppConfig, AppResult};

/// Delete the local index
#[derive(Args, Debug)]
pub struct CleanCommand {}

impl CleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing clean command");

        let pipeline = open_pipeline(config)?;
        if pipeline.clean()? {
            println!("Removed {}", pipeline.index_dir().display());
        } else {
            println!("No index at {}", pipeline.index_dir().display());
        }

        Ok(())
    }
}
