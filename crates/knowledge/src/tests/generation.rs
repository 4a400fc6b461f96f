use super::fakes::*;
use crate::rag::context::NO_DOCUMENTS_MARKER;
use crate::rag::{AnswerSchema, FieldType, Generator, NO_INFORMATION_ANSWER};
use crate::types::{DocDate, Document, DocumentMetadata, RetrievalResult, ScoredDocument};
use chrono::Utc;
use docqa_core::AppError;
use tempfile::TempDir;

fn policy_retrieval() -> RetrievalResult {
    RetrievalResult {
        documents: vec![ScoredDocument {
            document: Document {
                id: POLICY_V2.to_string(),
                text: "Employees may work from home up to three days per week.".to_string(),
                metadata: DocumentMetadata {
                    doc_type: "policy".to_string(),
                    version: Some(2),
                    date: Some(DocDate::Year(2024)),
                    source_name: POLICY_V2.to_string(),
                },
                content_hash: String::new(),
                ingested_at: Utc::now(),
            },
            score: 0.9,
            seq: 1,
        }],
        ..RetrievalResult::default()
    }
}

#[tokio::test]
async fn test_valid_answer_single_request() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answer_json(
        "Yes, up to three days per week.",
        &[POLICY_V2],
        Some(true),
    ))]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());

    let outcome = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await
        .unwrap();

    assert_eq!(outcome.answer.cited_sources, vec![POLICY_V2]);
    assert_eq!(outcome.answer.policy_allows_remote(), Some(true));
    assert!(!outcome.diagnostics.retried);
    assert_eq!(llm.calls(), 1);

    let request = &llm.requests()[0];
    assert!(request.prompt.contains("[Source: policy_v2_2024.txt]"));
    assert!(request.prompt.contains("Question: Can I work from home?"));
    assert_eq!(request.temperature, Some(0.5));
    assert_eq!(request.max_tokens, Some(1024));
    let format = request.format.as_ref().unwrap();
    assert_eq!(format["required"][2], "cited_sources");
    assert!(request
        .system
        .as_deref()
        .unwrap()
        .contains(NO_INFORMATION_ANSWER));
}

#[tokio::test]
async fn test_invalid_then_valid_retries_once() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![
        Ok(r#"{"answer": "Yes", "cited_sources": "policy_v2_2024.txt"}"#.to_string()),
        Ok(answer_json("Yes.", &[POLICY_V2], Some(true))),
    ]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());

    let outcome = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await
        .unwrap();

    assert!(outcome.diagnostics.retried);
    assert_eq!(llm.calls(), 2);

    let correction = &llm.requests()[1];
    assert!(correction
        .prompt
        .contains("missing required field \"reasoning\""));
    assert!(correction
        .prompt
        .contains("field \"cited_sources\" must be a list of strings"));
    assert!(correction.prompt.contains("Question: Can I work from home?"));
}

#[tokio::test]
async fn test_second_invalid_reply_is_generation_error() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![
        Ok("Sure, you can work from home!".to_string()),
        Ok(r#"{"answer": "Yes"}"#.to_string()),
        Ok(answer_json("never requested", &[], None)),
    ]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());

    let result = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await;

    assert!(matches!(result, Err(AppError::Generation(_))));
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn test_unknown_citations_are_dropped() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answer_json(
        "Yes.",
        &[POLICY_V2, "policy_v1_2021.txt", POLICY_V2, "made_up.txt"],
        Some(true),
    ))]);
    let generator = Generator::new(llm, &test_config(), temp.path());

    let outcome = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await
        .unwrap();

    assert_eq!(outcome.answer.cited_sources, vec![POLICY_V2]);
    assert_eq!(outcome.diagnostics.dropped_citations, 2);
}

#[tokio::test]
async fn test_empty_context_replaces_unsupported_answer() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answer_json(
        "The CEO is Jane Doe.",
        &["org_chart.txt"],
        None,
    ))]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());

    let outcome = generator
        .generate("Who is the CEO?", &RetrievalResult::default())
        .await
        .unwrap();

    assert_eq!(outcome.answer.answer, NO_INFORMATION_ANSWER);
    assert!(outcome.answer.cited_sources.is_empty());
    assert!(outcome.diagnostics.insufficient_information);
    assert_eq!(llm.calls(), 1);
    assert!(llm.requests()[0].prompt.contains(NO_DOCUMENTS_MARKER));
}

#[tokio::test]
async fn test_empty_context_keeps_model_refusal() {
    let temp = TempDir::new().unwrap();
    let refusal = "The documents do not contain anything about the CEO.";
    let llm = ScriptedLlm::new(vec![Ok(answer_json(refusal, &[], None))]);
    let generator = Generator::new(llm, &test_config(), temp.path());

    let outcome = generator
        .generate("Who is the CEO?", &RetrievalResult::default())
        .await
        .unwrap();

    assert_eq!(outcome.answer.answer, refusal);
    assert!(outcome.diagnostics.insufficient_information);
}

#[tokio::test]
async fn test_llm_rate_limited_twice_then_succeeds() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![
        Err(rate_limited()),
        Err(rate_limited()),
        Ok(answer_json("Yes.", &[POLICY_V2], Some(true))),
    ]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());

    let outcome = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await
        .unwrap();

    assert_eq!(outcome.answer.cited_sources, vec![POLICY_V2]);
    assert!(!outcome.diagnostics.retried);
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn test_llm_rate_limit_exhaustion_is_generation_error() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![
        Err(rate_limited()),
        Err(rate_limited()),
        Err(rate_limited()),
        Ok(answer_json("too late", &[], None)),
    ]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());

    let result = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await;

    match result {
        Err(AppError::Generation(message)) => assert!(message.contains("rate limited")),
        other => panic!("expected generation error, got {:?}", other.map(|o| o.answer)),
    }
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn test_provider_failure_is_generation_error() {
    let temp = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(vec![Err(AppError::Llm("connection refused".to_string()))]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());

    let result = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await;

    assert!(matches!(result, Err(AppError::Generation(_))));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_workspace_prompt_override_is_used() {
    let temp = TempDir::new().unwrap();
    let prompts = docqa_prompt::prompts_dir(temp.path());
    std::fs::create_dir_all(&prompts).unwrap();
    std::fs::write(
        prompts.join("answer.default.yml"),
        r#"id: answer.default
title: Terse answer
apiVersion: "1.0"
template: "Q={{question}} DOCS={{context}}"
"#,
    )
    .unwrap();

    let llm = ScriptedLlm::new(vec![Ok(answer_json("Yes.", &[POLICY_V2], None))]);
    let generator = Generator::new(llm.clone(), &test_config(), temp.path());
    generator
        .generate("Can I work from home?", &policy_retrieval())
        .await
        .unwrap();

    let request = &llm.requests()[0];
    assert!(request.prompt.starts_with("Q=Can I work from home? DOCS=[Source:"));
    assert!(request.system.is_none());
}

#[tokio::test]
async fn test_custom_schema_requires_extra_field() {
    let temp = TempDir::new().unwrap();
    let mut with_confidence: serde_json::Value =
        serde_json::from_str(&answer_json("Yes.", &[POLICY_V2], Some(true))).unwrap();
    with_confidence["confidence"] = serde_json::json!("high");

    let llm = ScriptedLlm::new(vec![
        Ok(answer_json("Yes.", &[POLICY_V2], Some(true))),
        Ok(with_confidence.to_string()),
    ]);
    let schema = AnswerSchema::answer_default().field(
        "confidence",
        FieldType::Enum(vec!["high".into(), "medium".into(), "low".into()]),
        true,
        None,
    );
    let generator = Generator::new(llm.clone(), &test_config(), temp.path()).with_schema(schema);

    let outcome = generator
        .generate("Can I work from home?", &policy_retrieval())
        .await
        .unwrap();

    assert!(outcome.diagnostics.retried);
    assert_eq!(outcome.answer.confidence(), Some("high"));
    assert!(llm.requests()[1]
        .prompt
        .contains("missing required field \"confidence\""));
}
