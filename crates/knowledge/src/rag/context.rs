//! Context block construction for answer prompts.

use crate::types::{Document, RetrievalResult};

/// Placed in the prompt when retrieval found nothing.
pub const NO_DOCUMENTS_MARKER: &str = "(no supporting documents were found for this question)";

fn label(document: &Document) -> String {
    let metadata = &document.metadata;
    let mut parts = vec![format!("type: {}", metadata.doc_type)];
    if let Some(version) = metadata.version {
        parts.push(format!("version: {}", version));
    }
    if let Some(date) = &metadata.date {
        parts.push(format!("date: {}", date));
    }
    format!("[Source: {}] ({})", metadata.source_name, parts.join(", "))
}

/// Full text of each retrieved document, labelled with its filename.
pub fn build_context(retrieval: &RetrievalResult) -> String {
    if retrieval.is_empty() {
        return NO_DOCUMENTS_MARKER.to_string();
    }

    retrieval
        .documents
        .iter()
        .map(|scored| format!("{}\n{}", label(&scored.document), scored.document.text.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
