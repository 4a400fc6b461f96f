//! Regex strategy with named capture groups.

use super::MetadataExtractor;
use crate::types::{DocDate, DocumentMetadata};
use chrono::{NaiveDate, Weekday};
use docqa_core::{AppError, AppResult};
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A configurable filename rule.
///
/// `pattern` is matched case-insensitively against the bare filename. The
/// optional named groups `version`, `year`, `date` and `day` feed the
/// extracted metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub doc_type: String,
    pub pattern: String,
}

impl PatternRule {
    pub fn new(doc_type: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            pattern: pattern.into(),
        }
    }
}

/// Built-in naming conventions: `[prefix_]policy_v{N}_{year}.*`,
/// `{day}_cafeteria_menu.*` and `[prefix_]memo[_description][_{date}].*`.
pub fn default_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            "policy",
            r"^(?:.*_)?policy_v(?P<version>\d+)_(?P<year>\d{4})\.[a-z0-9]+$",
        ),
        PatternRule::new(
            "menu",
            r"^(?P<day>monday|tuesday|wednesday|thursday|friday|saturday|sunday)_cafeteria_menu\.[a-z0-9]+$",
        ),
        PatternRule::new(
            "memo",
            r"^(?:.*_)?memos?(?:_(?:.*_)?(?P<date>\d{4}-\d{2}-\d{2}|\d{8}|\d{4})|_.*)?\.[a-z0-9]+$",
        ),
    ]
}

/// Extracts metadata from filenames matching one regex.
#[derive(Debug)]
pub struct PatternExtractor {
    doc_type: String,
    regex: Regex,
}

impl PatternExtractor {
    /// Compile a rule.
    ///
    /// # Errors
    /// Returns `AppError::Config` if the pattern is not a valid regex.
    pub fn new(rule: &PatternRule) -> AppResult<Self> {
        if rule.doc_type.trim().is_empty() {
            return Err(AppError::Config(format!(
                "Metadata pattern '{}' has an empty doc_type",
                rule.pattern
            )));
        }

        let regex = RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                AppError::Config(format!(
                    "Invalid metadata pattern for '{}': {}",
                    rule.doc_type, e
                ))
            })?;

        Ok(Self {
            doc_type: rule.doc_type.to_lowercase(),
            regex,
        })
    }

    fn date_from(caps: &Captures<'_>) -> Option<DocDate> {
        if let Some(date) = caps.name("date").and_then(|m| parse_date_token(m.as_str())) {
            return Some(date);
        }
        if let Some(year) = caps.name("year").and_then(|m| m.as_str().parse::<i32>().ok()) {
            return Some(DocDate::Year(year));
        }
        caps.name("day")
            .and_then(|m| m.as_str().parse::<Weekday>().ok())
            .map(DocDate::Weekday)
    }
}

impl MetadataExtractor for PatternExtractor {
    fn name(&self) -> &str {
        &self.doc_type
    }

    fn extract(&self, filename: &str) -> Option<DocumentMetadata> {
        let caps = self.regex.captures(filename)?;

        let version = caps
            .name("version")
            .and_then(|m| m.as_str().parse::<u32>().ok());

        Some(DocumentMetadata {
            doc_type: self.doc_type.clone(),
            version,
            date: Self::date_from(&caps),
            source_name: filename.to_string(),
        })
    }
}

/// Parse `YYYY-MM-DD`, `YYYYMMDD` or `YYYY`.
pub(crate) fn parse_date_token(token: &str) -> Option<DocDate> {
    match token.len() {
        10 => NaiveDate::parse_from_str(token, "%Y-%m-%d")
            .ok()
            .map(DocDate::Calendar),
        8 => NaiveDate::parse_from_str(token, "%Y%m%d")
            .ok()
            .map(DocDate::Calendar),
        4 => token.parse::<i32>().ok().map(DocDate::Year),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractors() -> Vec<PatternExtractor> {
        default_rules()
            .iter()
            .map(|r| PatternExtractor::new(r).unwrap())
            .collect()
    }

    fn first_match(filename: &str) -> Option<DocumentMetadata> {
        extractors().iter().find_map(|e| e.extract(filename))
    }

    #[test]
    fn test_policy_pattern() {
        let meta = first_match("policy_v2_2024.txt").unwrap();
        assert_eq!(meta.doc_type, "policy");
        assert_eq!(meta.version, Some(2));
        assert_eq!(meta.date, Some(DocDate::Year(2024)));
        assert_eq!(meta.source_name, "policy_v2_2024.txt");
    }

    #[test]
    fn test_policy_pattern_with_prefix_and_case() {
        let meta = first_match("Remote_Work_Policy_V1_2021.TXT").unwrap();
        assert_eq!(meta.doc_type, "policy");
        assert_eq!(meta.version, Some(1));
        assert_eq!(meta.date, Some(DocDate::Year(2021)));
    }

    #[test]
    fn test_menu_pattern() {
        let meta = first_match("friday_cafeteria_menu.txt").unwrap();
        assert_eq!(meta.doc_type, "menu");
        assert_eq!(meta.version, None);
        assert_eq!(meta.date, Some(DocDate::Weekday(Weekday::Fri)));
    }

    #[test]
    fn test_memo_pattern() {
        let meta = first_match("holiday_memo_2024-03-01.txt").unwrap();
        assert_eq!(meta.doc_type, "memo");
        assert_eq!(meta.version, None);
        assert_eq!(
            meta.date,
            Some(DocDate::Calendar(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );

        let meta = first_match("Memo_Parking_Changes.md").unwrap();
        assert_eq!(meta.doc_type, "memo");
        assert_eq!(meta.date, None);

        assert_eq!(
            first_match("memo_new_badges_2023.txt").unwrap().date,
            Some(DocDate::Year(2023))
        );
    }

    #[test]
    fn test_no_match() {
        assert!(first_match("memorandum_of_understanding.txt").is_none());
        assert!(first_match("policy_2024.txt").is_none());
        assert!(first_match("funday_cafeteria_menu.txt").is_none());
    }

    #[test]
    fn test_custom_rule_with_date_group() {
        let rule = PatternRule::new("memo", r"^memo_(?P<date>\d{4}-\d{2}-\d{2})\.md$");
        let extractor = PatternExtractor::new(&rule).unwrap();

        let meta = extractor.extract("memo_2024-03-01.md").unwrap();
        assert_eq!(meta.doc_type, "memo");
        assert_eq!(
            meta.date,
            Some(DocDate::Calendar(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );
    }

    #[test]
    fn test_invalid_rule_is_config_error() {
        let rule = PatternRule::new("memo", r"^memo_(?P<date>[0-9");
        assert!(matches!(
            PatternExtractor::new(&rule),
            Err(AppError::Config(_))
        ));

        let empty = PatternRule::new("  ", r"^x$");
        assert!(matches!(
            PatternExtractor::new(&empty),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_parse_date_token() {
        assert_eq!(parse_date_token("2023"), Some(DocDate::Year(2023)));
        assert_eq!(
            parse_date_token("20230105"),
            Some(DocDate::Calendar(NaiveDate::from_ymd_opt(2023, 1, 5).unwrap()))
        );
        assert_eq!(parse_date_token("2023-13-40"), None);
    }
}
