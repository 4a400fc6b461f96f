//! Query intent classification.
//!
//! An intent names the doc type a question is about. Retrieval uses it to
//! drop candidates of other types.

use crate::config::RagConfig;
use crate::rag::schema::{format_violations, AnswerSchema};
use async_trait::async_trait;
use docqa_core::{AppError, AppResult};
use docqa_llm::{with_rate_limit_retry, LlmClient, LlmRequest, RetryPolicy};
use docqa_prompt::{build_prompt, load_prompt};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Policy,
    Menu,
    Memo,
    General,
}

impl Intent {
    /// Doc type this intent routes to, `None` for general.
    pub fn doc_type(&self) -> Option<&'static str> {
        match self {
            Intent::Policy => Some("policy"),
            Intent::Menu => Some("menu"),
            Intent::Memo => Some("memo"),
            Intent::General => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.doc_type().unwrap_or("general")
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "policy" => Ok(Intent::Policy),
            "menu" => Ok(Intent::Menu),
            "memo" => Ok(Intent::Memo),
            "general" => Ok(Intent::General),
            other => Err(AppError::Retrieval(format!("Unknown intent '{}'", other))),
        }
    }
}

/// Maps a question to an [`Intent`].
///
/// Classification is best effort and never fails a query: implementations
/// return `Intent::General` when unsure.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, query: &str) -> Intent;
}

const POLICY_KEYWORDS: &[&str] = &[
    "policy",
    "remote",
    "work from home",
    "home",
    "wfh",
    "allowed",
    "permitted",
    "leave",
    "vacation",
    "rule",
    "benefit",
    "time off",
    "hr",
];

const MENU_KEYWORDS: &[&str] = &[
    "menu",
    "cafeteria",
    "lunch",
    "food",
    "meal",
    "breakfast",
    "dinner",
    "eat",
];

const MEMO_KEYWORDS: &[&str] = &["memo", "announcement", "notice", "update"];

/// Keyword-count classifier. The intent with the most keyword hits wins; a
/// tie or no hit at all is general.
#[derive(Debug, Clone)]
pub struct KeywordIntentClassifier {
    keywords: Vec<(Intent, Vec<String>)>,
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        fn table(intent: Intent, words: &[&str]) -> (Intent, Vec<String>) {
            (intent, words.iter().map(|w| w.to_string()).collect())
        }

        Self {
            keywords: vec![
                table(Intent::Policy, POLICY_KEYWORDS),
                table(Intent::Menu, MENU_KEYWORDS),
                table(Intent::Memo, MEMO_KEYWORDS),
            ],
        }
    }
}

/// Lower-case words separated by single spaces, padded at both ends so
/// phrases can be matched on word boundaries.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

impl KeywordIntentClassifier {
    pub fn classify_text(&self, query: &str) -> Intent {
        let normalized = normalize(query);

        let scores: Vec<(Intent, usize)> = self
            .keywords
            .iter()
            .map(|(intent, words)| {
                let hits = words
                    .iter()
                    .filter(|w| normalized.contains(&format!(" {} ", w)))
                    .count();
                (*intent, hits)
            })
            .collect();

        let best = scores.iter().map(|(_, hits)| *hits).max().unwrap_or(0);
        let mut winners = scores.iter().filter(|(_, hits)| *hits == best);

        match (best, winners.next(), winners.next()) {
            (0, _, _) => Intent::General,
            (_, Some((intent, _)), None) => *intent,
            _ => Intent::General,
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, query: &str) -> Intent {
        let intent = self.classify_text(query);
        tracing::debug!("Keyword classifier chose intent '{}'", intent);
        intent
    }
}

/// Schema-constrained LLM classifier.
pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmClient>,
    workspace: PathBuf,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
    timeout: Duration,
    schema: AnswerSchema,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, config: &RagConfig, workspace: &Path) -> Self {
        Self {
            llm,
            workspace: workspace.to_path_buf(),
            model: config.llm.model.clone(),
            temperature: config.intent_temperature,
            retry: config.retry,
            timeout: config.request_timeout(),
            schema: AnswerSchema::intent(),
        }
    }

    async fn try_classify(&self, query: &str) -> AppResult<Intent> {
        let (definition, _) = load_prompt(&self.workspace, "intent.classify")?;
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), query.to_string());
        let prompt = build_prompt(&definition, variables)?;

        let mut request = LlmRequest::new(prompt.user, self.model.clone())
            .with_temperature(self.temperature)
            .with_format(self.schema.to_json_schema());
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        let response = with_rate_limit_retry(
            &self.retry,
            Some(self.timeout),
            "intent classification",
            || self.llm.complete(&request),
        )
        .await?;

        let fields = self.schema.parse(&response.content).map_err(|violations| {
            AppError::Retrieval(format!(
                "Intent response did not match schema:\n{}",
                format_violations(&violations)
            ))
        })?;

        let intent = fields
            .get("intent")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Retrieval("Intent response has no intent".to_string()))?
            .parse::<Intent>()?;

        tracing::debug!(
            intent = %intent,
            confidence = ?fields.get("confidence").and_then(|v| v.as_str()),
            reasoning = ?fields.get("reasoning").and_then(|v| v.as_str()),
            "LLM classifier chose intent"
        );

        Ok(intent)
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(&self, query: &str) -> Intent {
        match self.try_classify(query).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!("Intent classification failed, using 'general': {}", e);
                Intent::General
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::ScriptedLlm;
    use tempfile::TempDir;

    #[test]
    fn test_keyword_classification() {
        let classifier = KeywordIntentClassifier::default();

        assert_eq!(classifier.classify_text("Can I work from home?"), Intent::Policy);
        assert_eq!(classifier.classify_text("What's on Friday's menu?"), Intent::Menu);
        assert_eq!(
            classifier.classify_text("Any new announcement this week?"),
            Intent::Memo
        );
        assert_eq!(classifier.classify_text("Who is the CEO?"), Intent::General);
    }

    #[test]
    fn test_keyword_tie_is_general() {
        let classifier = KeywordIntentClassifier::default();
        assert_eq!(
            classifier.classify_text("Is the cafeteria policy posted?"),
            Intent::General
        );
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let classifier = KeywordIntentClassifier::default();
        // "homework" must not count as "home", "heat" must not count as "eat"
        assert_eq!(classifier.classify_text("homework heat"), Intent::General);
    }

    #[test]
    fn test_intent_parsing() {
        assert_eq!("Menu".parse::<Intent>().unwrap(), Intent::Menu);
        assert!("weather".parse::<Intent>().is_err());
        assert_eq!(Intent::General.doc_type(), None);
    }

    #[tokio::test]
    async fn test_llm_classifier_parses_response() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(vec![Ok(
            r#"{"intent": "menu", "reasoning": "asks about food", "confidence": "high"}"#
                .to_string(),
        )]);
        let classifier =
            LlmIntentClassifier::new(llm.clone(), &RagConfig::default(), temp.path());

        assert_eq!(classifier.classify("What is for lunch?").await, Intent::Menu);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0].format.is_some());
    }

    #[tokio::test]
    async fn test_llm_classifier_falls_back_to_general() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(vec![
            Ok(r#"{"intent": "weather", "reasoning": "?"}"#.to_string()),
            Err(AppError::Llm("connection refused".to_string())),
        ]);
        let classifier =
            LlmIntentClassifier::new(llm.clone(), &RagConfig::default(), temp.path());

        assert_eq!(classifier.classify("q1").await, Intent::General);
        assert_eq!(classifier.classify("q2").await, Intent::General);
        assert_eq!(llm.calls(), 2);
    }
}
