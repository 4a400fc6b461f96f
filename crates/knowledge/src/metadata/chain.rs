//! Ordered strategy chain with a generic fallback.

use super::pattern::{default_rules, parse_date_token, PatternExtractor, PatternRule};
use super::MetadataExtractor;
use crate::types::DocumentMetadata;
use docqa_core::AppResult;
use regex::Regex;

/// Fallback strategy: "generic" type, date from a trailing date token.
#[derive(Debug)]
pub struct GenericExtractor {
    trailing_date: Option<Regex>,
}

impl Default for GenericExtractor {
    fn default() -> Self {
        Self {
            trailing_date: Regex::new(r"(?i)_(\d{4}-\d{2}-\d{2}|\d{8}|\d{4})\.[a-z0-9]+$").ok(),
        }
    }
}

impl MetadataExtractor for GenericExtractor {
    fn name(&self) -> &str {
        "generic"
    }

    fn extract(&self, filename: &str) -> Option<DocumentMetadata> {
        let mut meta = DocumentMetadata::generic(filename);
        meta.date = self
            .trailing_date
            .as_ref()
            .and_then(|re| re.captures(filename))
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_date_token(m.as_str()));
        Some(meta)
    }
}

/// Tries each strategy in order; the generic fallback always answers.
pub struct ExtractorChain {
    strategies: Vec<Box<dyn MetadataExtractor>>,
    fallback: GenericExtractor,
}

impl ExtractorChain {
    /// Chain of configured rules, then the built-in conventions.
    ///
    /// # Errors
    /// Returns `AppError::Config` if a configured rule does not compile.
    pub fn new(extra_rules: &[PatternRule]) -> AppResult<Self> {
        let mut strategies: Vec<Box<dyn MetadataExtractor>> = Vec::new();
        for rule in extra_rules.iter().chain(default_rules().iter()) {
            strategies.push(Box::new(PatternExtractor::new(rule)?));
        }

        Ok(Self {
            strategies,
            fallback: GenericExtractor::default(),
        })
    }

    /// Append a custom strategy before the fallback.
    pub fn with_strategy(mut self, strategy: Box<dyn MetadataExtractor>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Extract metadata for a filename.
    pub fn extract(&self, filename: &str) -> DocumentMetadata {
        for strategy in &self.strategies {
            if let Some(meta) = strategy.extract(filename) {
                tracing::debug!("{} matched by '{}' strategy", filename, strategy.name());
                return meta;
            }
        }

        tracing::debug!("{} matched no naming convention, treating as generic", filename);
        self.fallback
            .extract(filename)
            .unwrap_or_else(|| DocumentMetadata::generic(filename))
    }
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self {
            strategies: default_rules()
                .iter()
                .filter_map(|rule| PatternExtractor::new(rule).ok())
                .map(|e| Box::new(e) as Box<dyn MetadataExtractor>)
                .collect(),
            fallback: GenericExtractor::default(),
        }
    }
}
