//! Ask command handler.

use super::{open_pipeline, print_json};
use clap::Args;
use docqa_core::{config::AppConfig, AppResult};
use docqa_knowledge::AskOutcome;

/// Ask a question against the indexed documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to answer
    pub question: String,

    /// Also show reasoning, retrieval scores and diagnostics
    #[arg(long)]
    pub full: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!(question = %self.question);

        let pipeline = open_pipeline(config)?;
        let outcome = pipeline.ask(&self.question).await?;

        match (self.json, self.full) {
            (true, true) => print_json(&outcome),
            (true, false) => print_json(&outcome.answer),
            (false, full) => {
                print_human(&outcome, full);
                Ok(())
            }
        }
    }
}

fn print_human(outcome: &AskOutcome, full: bool) {
    let answer = &outcome.answer;
    println!("{}", answer.answer);

    if !answer.cited_sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.cited_sources {
            println!("  - {}", source);
        }
    }

    if !full {
        return;
    }

    println!();
    println!("Reasoning: {}", answer.reasoning);
    for (field, value) in &answer.extra {
        println!("{}: {}", field, value);
    }

    let diagnostics = &outcome.retrieval.diagnostics;
    println!();
    println!(
        "Retrieved {} of {} candidate(s), intent: {}",
        outcome.retrieval.len(),
        diagnostics.candidates,
        diagnostics.intent
    );
    for doc in &outcome.retrieval.documents {
        println!("  {:.4}  {} ({})", doc.score, doc.source_name(), doc.doc_type());
    }
    if diagnostics.superseded > 0 {
        println!("Superseded versions removed: {}", diagnostics.superseded);
    }
    if !diagnostics.version_overrides.is_empty() {
        println!(
            "Older versions kept by reference: {}",
            diagnostics.version_overrides.join(", ")
        );
    }

    let generation = &outcome.generation;
    if generation.retried {
        println!("The first reply failed validation and was corrected.");
    }
    if generation.dropped_citations > 0 {
        println!("Citations dropped: {}", generation.dropped_citations);
    }
}
