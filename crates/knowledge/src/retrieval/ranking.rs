//! Deterministic result ordering.

use crate::types::ScoredDocument;
use chrono::NaiveDate;
use std::cmp::Ordering;

fn recency(doc: &ScoredDocument) -> Option<NaiveDate> {
    doc.document
        .metadata
        .date
        .and_then(|date| date.recency_key())
}

/// Rank order: higher score first, then more recent date, then earlier
/// insertion. Undated documents sort after dated ones on equal score.
pub fn compare(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| recency(b).cmp(&recency(a)))
        .then_with(|| a.seq.cmp(&b.seq))
}

pub fn sort_ranked(docs: &mut [ScoredDocument]) {
    docs.sort_by(compare);
}
