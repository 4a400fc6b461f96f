use super::fakes::*;
use crate::config::{get_index_dir, IntentMode, RagConfig, VersionPolicy};
use crate::embeddings::EmbeddingProvider;
use crate::index::SqliteIndex;
use crate::retrieval::{IntentClassifier, KeywordIntentClassifier, Retriever};
use crate::types::RetrievalResult;
use docqa_core::AppError;
use std::sync::Arc;
use tempfile::TempDir;

async fn indexed_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let docs = write_corpus(temp.path());
    pipeline(
        temp.path(),
        test_config(),
        KeywordEmbedder::new(),
        ScriptedLlm::new(vec![]),
    )
    .ingest(&[docs], false)
    .await
    .unwrap();
    temp
}

fn retriever(temp: &TempDir, config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Retriever {
    let index = SqliteIndex::open(&get_index_dir(temp.path())).unwrap();
    let classifier: Option<Arc<dyn IntentClassifier>> = match config.intent {
        IntentMode::Keyword => Some(Arc::new(KeywordIntentClassifier::default())),
        _ => None,
    };
    Retriever::new(Arc::new(index), embedder, Arc::new(config), classifier)
}

fn no_intent() -> RagConfig {
    RagConfig {
        intent: IntentMode::Off,
        ..test_config()
    }
}

fn names(result: &RetrievalResult) -> Vec<String> {
    result.source_names()
}

#[tokio::test]
async fn test_latest_version_wins_without_routing() {
    let temp = indexed_workspace().await;
    let result = retriever(&temp, no_intent(), KeywordEmbedder::new())
        .retrieve("Can I work from home?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V2, FRIDAY_MENU]);
    assert_eq!(result.diagnostics.candidates, 3);
    assert_eq!(result.diagnostics.superseded, 1);
    assert_eq!(result.diagnostics.intent, "general");
}

#[tokio::test]
async fn test_intent_routing_keeps_only_policy() {
    let temp = indexed_workspace().await;
    let result = retriever(&temp, test_config(), KeywordEmbedder::new())
        .retrieve("Can I work from home?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V2]);
    assert_eq!(result.diagnostics.intent, "policy");
    assert_eq!(result.diagnostics.routed_to.as_deref(), Some("policy"));
}

#[tokio::test]
async fn test_intent_routing_keeps_only_menu() {
    let temp = indexed_workspace().await;
    let result = retriever(&temp, test_config(), KeywordEmbedder::new())
        .retrieve("What's on Friday's menu?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![FRIDAY_MENU]);
}

#[tokio::test]
async fn test_year_reference_restores_older_policy() {
    let temp = indexed_workspace().await;
    let result = retriever(&temp, test_config(), KeywordEmbedder::new())
        .retrieve("What was the remote work policy in 2021?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V1]);
    assert_eq!(result.diagnostics.version_overrides, vec![POLICY_V1.to_string()]);
}

#[tokio::test]
async fn test_version_reference_restores_older_policy() {
    let temp = indexed_workspace().await;
    let result = retriever(&temp, test_config(), KeywordEmbedder::new())
        .retrieve("Under policy v1, could I work from home?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V1]);
}

#[tokio::test]
async fn test_filename_reference_restores_older_policy() {
    let temp = indexed_workspace().await;
    let result = retriever(&temp, test_config(), KeywordEmbedder::new())
        .retrieve("What did policy_v1_2021.txt say?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V1]);
    assert_eq!(result.diagnostics.version_overrides, vec![POLICY_V1.to_string()]);
}

#[tokio::test]
async fn test_intent_routing_keeps_only_memo() {
    let temp = TempDir::new().unwrap();
    let docs = write_corpus(temp.path());
    std::fs::write(
        docs.join(PARKING_MEMO),
        "Memo: the parking garage is closed for repairs next week.",
    )
    .unwrap();
    pipeline(
        temp.path(),
        test_config(),
        KeywordEmbedder::new(),
        ScriptedLlm::new(vec![]),
    )
    .ingest(&[docs], false)
    .await
    .unwrap();

    let result = retriever(&temp, test_config(), KeywordEmbedder::new())
        .retrieve("Is there a memo about parking?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![PARKING_MEMO]);
    assert_eq!(result.diagnostics.intent, "memo");
    assert_eq!(result.diagnostics.routed_to.as_deref(), Some("memo"));
}

#[tokio::test]
async fn test_keep_all_policy_returns_every_version() {
    let temp = indexed_workspace().await;
    let mut config = test_config();
    config
        .version_policies
        .insert("policy".to_string(), VersionPolicy::KeepAll);

    let result = retriever(&temp, config, KeywordEmbedder::new())
        .retrieve("Can I work from home?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V2, POLICY_V1]);
    assert_eq!(result.diagnostics.superseded, 0);
}

#[tokio::test]
async fn test_latest_only_ignores_year_reference() {
    let temp = indexed_workspace().await;
    let mut config = test_config();
    config
        .version_policies
        .insert("policy".to_string(), VersionPolicy::LatestOnly);

    let result = retriever(&temp, config, KeywordEmbedder::new())
        .retrieve("What was the remote work policy in 2021?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V2]);
}

#[tokio::test]
async fn test_top_k_truncates() {
    let temp = indexed_workspace().await;
    let config = RagConfig {
        top_k: 1,
        ..no_intent()
    };

    let result = retriever(&temp, config, KeywordEmbedder::new())
        .retrieve("Can I work from home?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V2]);
}

#[tokio::test]
async fn test_min_score_drops_unrelated() {
    let temp = indexed_workspace().await;
    let config = RagConfig {
        min_score: Some(0.5),
        ..no_intent()
    };

    let result = retriever(&temp, config, KeywordEmbedder::new())
        .retrieve("Friday lunch")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![FRIDAY_MENU]);
    assert_eq!(result.diagnostics.below_min_score, 2);
}

#[tokio::test]
async fn test_repeated_retrieval_is_stable() {
    let temp = indexed_workspace().await;
    let retriever = retriever(&temp, no_intent(), KeywordEmbedder::new());

    let first = retriever.retrieve("policy").await.unwrap();
    let second = retriever.retrieve("policy").await.unwrap();
    assert_eq!(names(&first), names(&second));
}

#[tokio::test]
async fn test_empty_index_returns_empty_result() {
    let temp = TempDir::new().unwrap();
    let embedder = KeywordEmbedder::new();
    SqliteIndex::create(
        &get_index_dir(temp.path()),
        embedder.dimensions(),
        embedder.model_name(),
    )
    .unwrap();

    let result = retriever(&temp, test_config(), embedder.clone())
        .retrieve("Can I work from home?")
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_query_rate_limited_twice_then_succeeds() {
    let temp = indexed_workspace().await;
    let embedder = KeywordEmbedder::with_rate_limits(2);

    let result = retriever(&temp, test_config(), embedder.clone())
        .retrieve("Can I work from home?")
        .await
        .unwrap();

    assert_eq!(names(&result), vec![POLICY_V2]);
    assert_eq!(embedder.calls(), 3);
}

#[tokio::test]
async fn test_query_rate_limit_exhaustion_is_retrieval_error() {
    let temp = indexed_workspace().await;
    let embedder = KeywordEmbedder::with_rate_limits(10);

    let result = retriever(&temp, test_config(), embedder.clone())
        .retrieve("Can I work from home?")
        .await;

    match result {
        Err(AppError::Retrieval(message)) => assert!(message.contains("rate limited")),
        other => panic!("expected retrieval error, got {:?}", other.map(|r| r.len())),
    }
    assert_eq!(embedder.calls(), 3);
}
