//! Grounded answer generation.
//!
//! The model is untrusted: every reply is validated against the answer
//! schema, corrected at most once, and its citations are intersected with the
//! documents actually shown to it.

use crate::config::RagConfig;
use crate::rag::context::build_context;
use crate::rag::schema::{format_violations, AnswerSchema, SchemaViolation};
use crate::rag::types::{
    GenerationDiagnostics, GenerationOutcome, StructuredAnswer, NO_INFORMATION_ANSWER,
};
use crate::types::RetrievalResult;
use docqa_core::{AppError, AppResult};
use docqa_llm::{with_rate_limit_retry, LlmClient, LlmRequest, RetryPolicy};
use docqa_prompt::{build_prompt, load_prompt, BuiltPrompt};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Phrases that mark an answer as "the documents don't say".
const NO_INFORMATION_SIGNALS: &[&str] = &[
    "don't have information",
    "do not have information",
    "no information",
    "no relevant",
];

/// Phrases that only count as a refusal when the answer also talks about the
/// documents themselves ("parking is not available" is an answer).
const QUALIFIED_SIGNALS: &[&str] = &[
    "not contain",
    "doesn't contain",
    "does not mention",
    "doesn't mention",
    "not mentioned",
    "could not find",
    "couldn't find",
    "cannot find",
    "can't find",
    "not available",
];

const SOURCE_WORDS: &[&str] = &["document", "information", "context", "source"];

fn signals_no_information(answer: &str) -> bool {
    let lower = answer.to_lowercase().replace('\u{2019}', "'");
    let contains_any = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    contains_any(NO_INFORMATION_SIGNALS)
        || (contains_any(QUALIFIED_SIGNALS) && contains_any(SOURCE_WORDS))
}

pub struct Generator {
    llm: Arc<dyn LlmClient>,
    workspace: PathBuf,
    schema: AnswerSchema,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmClient>, config: &RagConfig, workspace: &Path) -> Self {
        Self {
            llm,
            workspace: workspace.to_path_buf(),
            schema: AnswerSchema::answer_default(),
            model: config.llm.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: config.retry,
            timeout: config.request_timeout(),
        }
    }

    /// Replace the answer schema. It must keep `answer`, `reasoning` and
    /// `cited_sources`.
    pub fn with_schema(mut self, schema: AnswerSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Answer `question` from the retrieved documents.
    ///
    /// # Errors
    /// * `AppError::Generation` - the provider failed, or the reply still did
    ///   not match the schema after one correction
    /// * `AppError::Prompt` - a prompt template could not be loaded or rendered
    #[instrument(skip(self, retrieval), fields(documents = retrieval.len(), model = %self.model))]
    pub async fn generate(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
    ) -> AppResult<GenerationOutcome> {
        let mut diagnostics = GenerationDiagnostics::default();

        let mut variables = HashMap::new();
        variables.insert("context".to_string(), build_context(retrieval));
        variables.insert("question".to_string(), question.to_string());
        variables.insert(
            "no_information".to_string(),
            NO_INFORMATION_ANSWER.to_string(),
        );
        let prompt = self.render("answer.default", variables)?;

        let raw = self.complete(prompt.system.clone(), &prompt.user).await?;

        let fields = match self.schema.parse(&raw) {
            Ok(fields) => fields,
            Err(violations) => {
                tracing::warn!(
                    "Answer did not match schema ({} violations), retrying once",
                    violations.len()
                );
                diagnostics.retried = true;
                self.correct(&prompt, &raw, &violations).await?
            }
        };

        let mut answer = StructuredAnswer::from_fields(fields)?;

        let allowed: HashSet<String> = retrieval.source_names().into_iter().collect();
        diagnostics.dropped_citations = filter_citations(&mut answer.cited_sources, &allowed);
        if diagnostics.dropped_citations > 0 {
            tracing::warn!(
                "Dropped {} citation(s) naming documents outside the context",
                diagnostics.dropped_citations
            );
        }

        if retrieval.is_empty() {
            diagnostics.insufficient_information = true;
            if !signals_no_information(&answer.answer) {
                tracing::warn!("Model answered without supporting documents, replacing answer");
                answer.answer = NO_INFORMATION_ANSWER.to_string();
            }
        }

        tracing::info!(
            citations = answer.cited_sources.len(),
            retried = diagnostics.retried,
            "Generated answer"
        );

        Ok(GenerationOutcome {
            answer,
            diagnostics,
        })
    }

    fn render(
        &self,
        prompt_id: &str,
        variables: HashMap<String, String>,
    ) -> AppResult<BuiltPrompt> {
        let (definition, source) = load_prompt(&self.workspace, prompt_id)?;
        tracing::debug!("Using {:?} prompt '{}'", source, prompt_id);
        build_prompt(&definition, variables)
    }

    async fn correct(
        &self,
        original: &BuiltPrompt,
        previous: &str,
        violations: &[SchemaViolation],
    ) -> AppResult<Map<String, Value>> {
        let mut variables = HashMap::new();
        variables.insert("original_prompt".to_string(), original.user.clone());
        variables.insert("previous_response".to_string(), previous.to_string());
        variables.insert("violations".to_string(), format_violations(violations));
        let correction = self.render("answer.correction", variables)?;

        let system = match (&original.system, &correction.system) {
            (Some(a), Some(b)) => Some(format!("{}\n\n{}", a, b)),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        let raw = self.complete(system, &correction.user).await?;

        self.schema.parse(&raw).map_err(|violations| {
            AppError::Generation(format!(
                "Answer still did not match the schema after a correction retry:\n{}",
                format_violations(&violations)
            ))
        })
    }

    async fn complete(&self, system: Option<String>, user: &str) -> AppResult<String> {
        let mut request = LlmRequest::new(user, self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_format(self.schema.to_json_schema());
        if let Some(system) = system {
            request = request.with_system(system);
        }

        let result = with_rate_limit_retry(
            &self.retry,
            Some(self.timeout),
            "answer generation",
            || self.llm.complete(&request),
        )
        .await;

        match result {
            Ok(response) => Ok(response.content),
            Err(AppError::RateLimited { message, .. }) => Err(AppError::Generation(format!(
                "LLM provider still rate limited after {} attempts: {}",
                self.retry.max_attempts, message
            ))),
            Err(e) => Err(AppError::Generation(format!("LLM request failed: {}", e))),
        }
    }
}

/// Keep citations naming allowed sources, first occurrence only. Returns how
/// many were removed as unknown; duplicates are not counted.
fn filter_citations(cited: &mut Vec<String>, allowed: &HashSet<String>) -> usize {
    let mut seen = HashSet::new();
    let mut dropped = 0;

    cited.retain(|source| {
        if !allowed.contains(source) {
            tracing::debug!("Dropping citation '{}'", source);
            dropped += 1;
            return false;
        }
        seen.insert(source.clone())
    });

    dropped
}
