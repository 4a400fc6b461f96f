use super::fakes::*;
use crate::config::get_index_dir;
use crate::embeddings::providers::TrigramProvider;
use crate::index::{INDEX_DB_FILE, MANIFEST_FILE};
use crate::pipeline::Pipeline;
use crate::rag::NO_INFORMATION_ANSWER;
use docqa_core::AppError;
use docqa_llm::LlmClient;
use std::sync::Arc;
use tempfile::TempDir;

/// Pipeline over the sample corpus with the offline trigram embedder.
async fn ingested(temp: &TempDir, llm: Arc<dyn LlmClient>) -> Pipeline {
    let docs = write_corpus(temp.path());
    let pipeline = pipeline(
        temp.path(),
        test_config(),
        Arc::new(TrigramProvider::new(384)),
        llm,
    );
    let report = pipeline.ingest(&[docs], false).await.unwrap();
    assert_eq!(report.indexed_count(), 3);
    pipeline
}

#[tokio::test]
async fn test_work_from_home_scenario() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answer_json(
        "Yes. You may work from home up to three days per week with manager approval.",
        &[POLICY_V2],
        Some(true),
    ))]);
    let pipeline = ingested(&temp, llm.clone()).await;

    let outcome = pipeline.ask("Can I work from home?").await.unwrap();

    assert_eq!(outcome.retrieval.source_names(), vec![POLICY_V2]);
    assert_eq!(outcome.answer.cited_sources, vec![POLICY_V2]);
    assert_eq!(outcome.answer.policy_allows_remote(), Some(true));

    // The superseded policy and the menu never reach the model
    let prompt = &llm.requests()[0].prompt;
    assert!(prompt.contains(POLICY_V2));
    assert!(!prompt.contains(POLICY_V1));
    assert!(!prompt.contains(FRIDAY_MENU));
}

#[tokio::test]
async fn test_friday_menu_scenario() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answer_json(
        "Grilled salmon, rice pilaf and lemon tart.",
        &[FRIDAY_MENU],
        None,
    ))]);
    let pipeline = ingested(&temp, llm.clone()).await;

    let outcome = pipeline.ask("What's on Friday's menu?").await.unwrap();

    assert_eq!(outcome.retrieval.source_names(), vec![FRIDAY_MENU]);
    assert_eq!(outcome.answer.cited_sources, vec![FRIDAY_MENU]);
    assert!(!llm.requests()[0].prompt.contains("policy_v"));
}

#[tokio::test]
async fn test_model_citing_old_policy_is_corrected() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answer_json(
        "No, remote work is not permitted.",
        &[POLICY_V1, POLICY_V2],
        Some(false),
    ))]);
    let pipeline = ingested(&temp, llm).await;

    let outcome = pipeline.ask("Can I work from home?").await.unwrap();

    assert_eq!(outcome.answer.cited_sources, vec![POLICY_V2]);
    assert_eq!(outcome.generation.dropped_citations, 1);
}

#[tokio::test]
async fn test_repeated_asks_are_deterministic() {
    let temp = TempDir::new().unwrap();
    let reply = answer_json("Yes.", &[POLICY_V2], Some(true));
    let llm = ScriptedLlm::new(vec![Ok(reply.clone()), Ok(reply)]);
    let pipeline = ingested(&temp, llm).await;

    let first = pipeline.ask("Can I work from home?").await.unwrap();
    let second = pipeline.ask("Can I work from home?").await.unwrap();

    assert_eq!(first.retrieval.source_names(), second.retrieval.source_names());
    assert_eq!(first.answer.cited_sources, second.answer.cited_sources);
}

#[tokio::test]
async fn test_ask_without_index_is_unavailable() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![]);
    let pipeline = pipeline(
        temp.path(),
        test_config(),
        Arc::new(TrigramProvider::new(384)),
        llm.clone(),
    );

    let result = pipeline.ask("Can I work from home?").await;

    assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_ask_with_corrupt_index_is_unavailable() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![]);
    let pipeline = ingested(&temp, llm.clone()).await;

    std::fs::write(
        get_index_dir(temp.path()).join(INDEX_DB_FILE),
        vec![0xAB; 4096],
    )
    .unwrap();

    let result = pipeline.ask("Can I work from home?").await;
    assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_ask_with_missing_manifest_is_unavailable() {
    let temp = TempDir::new().unwrap();
    let pipeline = ingested(&temp, ScriptedLlm::new(vec![])).await;

    std::fs::remove_file(get_index_dir(temp.path()).join(MANIFEST_FILE)).unwrap();

    let result = pipeline.ask("Can I work from home?").await;
    assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
}

#[tokio::test]
async fn test_ask_with_other_embedder_is_unavailable() {
    let temp = TempDir::new().unwrap();
    ingested(&temp, ScriptedLlm::new(vec![])).await;

    let other = pipeline(
        temp.path(),
        test_config(),
        KeywordEmbedder::new(),
        ScriptedLlm::new(vec![]),
    );

    let result = other.ask("Can I work from home?").await;
    assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
}

#[tokio::test]
async fn test_stats_and_clean() {
    let temp = TempDir::new().unwrap();
    let pipeline = ingested(&temp, ScriptedLlm::new(vec![])).await;

    let stats = pipeline.stats().unwrap();
    assert_eq!(stats.documents, 3);
    assert_eq!(stats.by_type.get("policy"), Some(&2));
    assert_eq!(stats.by_type.get("menu"), Some(&1));
    assert_eq!(stats.embedding_model, "trigram-v1");
    assert!(stats.size_bytes > 0);

    assert!(pipeline.clean().unwrap());
    assert!(!get_index_dir(temp.path()).exists());
    assert!(!pipeline.clean().unwrap());
    assert!(matches!(pipeline.stats(), Err(AppError::IndexUnavailable(_))));
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let temp = TempDir::new().unwrap();
    let pipeline = ingested(&temp, ScriptedLlm::new(vec![])).await;

    assert!(matches!(
        pipeline.ask("   ").await,
        Err(AppError::Retrieval(_))
    ));
}

#[tokio::test]
async fn test_empty_index_answers_no_information() {
    let temp = TempDir::new().unwrap();
    let docs = temp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answer_json(
        "Remote work is allowed on Fridays.",
        &[POLICY_V2],
        Some(true),
    ))]);
    let pipeline = pipeline(
        temp.path(),
        test_config(),
        Arc::new(TrigramProvider::new(384)),
        llm.clone(),
    );

    let report = pipeline.ingest(&[docs], false).await.unwrap();
    assert_eq!(report.indexed_count(), 0);

    let outcome = pipeline.ask("Can I work from home?").await.unwrap();

    assert!(outcome.retrieval.is_empty());
    assert_eq!(outcome.answer.answer, NO_INFORMATION_ANSWER);
    assert!(outcome.answer.cited_sources.is_empty());
    assert!(outcome.generation.insufficient_information);
    assert_eq!(llm.calls(), 1);
}
