//! Version resolution over a candidate pool.
//!
//! Two stages, run in order:
//! 1. [`pick_latest`] keeps the highest version of each versioned doc type.
//! 2. [`apply_overrides`] swaps the latest back out when the query names an
//!    older version or year explicitly.

use crate::config::VersionPolicy;
use crate::types::ScoredDocument;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

/// Version and year references found in a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionReferences {
    pub versions: BTreeSet<u32>,
    pub years: BTreeSet<i32>,
}

impl VersionReferences {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.years.is_empty()
    }

    /// Whether a candidate carries a referenced version or year.
    pub fn matches(&self, doc: &ScoredDocument) -> bool {
        let metadata = &doc.document.metadata;
        let version_hit = metadata
            .version
            .is_some_and(|v| self.versions.contains(&v));
        let year_hit = metadata
            .date
            .and_then(|d| d.year())
            .is_some_and(|y| self.years.contains(&y));
        version_hit || year_hit
    }
}

fn reference_patterns() -> Option<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            // Leading boundary is any non-alphanumeric, so `_` in filenames
            // separates tokens; the trailing boundary is checked in `bounded`.
            let version = Regex::new(r"(?i)(?:^|[^a-z0-9])(?:v|version\s+)(\d{1,4})").ok()?;
            let year = Regex::new(r"(?i)(?:^|[^a-z0-9])((?:19|20)\d{2})").ok()?;
            Some((version, year))
        })
        .as_ref()
}

/// Numbers captured by `re` that are not followed by a letter or digit.
fn bounded<'a, T: std::str::FromStr + 'a>(
    re: &'a Regex,
    text: &'a str,
) -> impl Iterator<Item = T> + 'a {
    re.captures_iter(text).filter_map(move |caps| {
        let number = caps.get(1)?;
        let followed_by_word = text[number.end()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric());
        if followed_by_word {
            return None;
        }
        number.as_str().parse().ok()
    })
}

/// Extract `v1` / `version 1` and four-digit year references, including
/// those embedded in a filename such as `policy_v1_2021.txt`.
pub fn parse_references(query: &str) -> VersionReferences {
    let mut refs = VersionReferences::default();
    let Some((version_re, year_re)) = reference_patterns() else {
        return refs;
    };

    refs.versions.extend(bounded::<u32>(version_re, query));
    refs.years.extend(bounded::<i32>(year_re, query));
    refs
}

/// Candidates split into those kept and those superseded by a newer version.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub kept: Vec<ScoredDocument>,
    pub superseded: Vec<ScoredDocument>,
}

type LatestKey = (u32, Option<NaiveDate>);

fn latest_key(doc: &ScoredDocument) -> Option<LatestKey> {
    let metadata = &doc.document.metadata;
    metadata
        .version
        .map(|v| (v, metadata.date.and_then(|d| d.recency_key())))
}

/// Stage A: per doc type, keep only the highest version.
///
/// Equal versions are separated by date recency. Unversioned candidates and
/// types with policy `keep_all` pass through untouched.
pub fn pick_latest<F>(candidates: Vec<ScoredDocument>, policy_for: F) -> Resolution
where
    F: Fn(&str) -> VersionPolicy,
{
    let mut latest: HashMap<String, LatestKey> = HashMap::new();
    for doc in &candidates {
        if policy_for(doc.doc_type()) == VersionPolicy::KeepAll {
            continue;
        }
        if let Some(key) = latest_key(doc) {
            latest
                .entry(doc.doc_type().to_string())
                .and_modify(|best| {
                    if key > *best {
                        *best = key;
                    }
                })
                .or_insert(key);
        }
    }

    let mut resolution = Resolution::default();
    for doc in candidates {
        let superseded = match (latest.get(doc.doc_type()), latest_key(&doc)) {
            (Some(best), Some(key)) => key != *best,
            _ => false,
        };
        if superseded {
            resolution.superseded.push(doc);
        } else {
            resolution.kept.push(doc);
        }
    }

    resolution
}

/// Stage B: restore superseded candidates the query explicitly refers to.
///
/// For each doc type with policy `latest_wins` that has a referenced
/// superseded candidate, the referenced candidates replace the type's latest
/// version (unless the latest is itself referenced). Returns the source names
/// restored this way.
pub fn apply_overrides<F>(
    resolution: Resolution,
    refs: &VersionReferences,
    policy_for: F,
) -> (Resolution, Vec<String>)
where
    F: Fn(&str) -> VersionPolicy,
{
    if refs.is_empty() || resolution.superseded.is_empty() {
        return (resolution, Vec::new());
    }

    let Resolution {
        kept,
        superseded: old,
    } = resolution;

    let (restored, still_superseded): (Vec<_>, Vec<_>) = old.into_iter().partition(|doc| {
        policy_for(doc.doc_type()) == VersionPolicy::LatestWins && refs.matches(doc)
    });

    if restored.is_empty() {
        return (
            Resolution {
                kept,
                superseded: still_superseded,
            },
            Vec::new(),
        );
    }

    let overridden: HashSet<String> = restored.iter().map(|d| d.doc_type().to_string()).collect();
    let mut resolution = Resolution {
        kept: Vec::with_capacity(kept.len() + restored.len()),
        superseded: still_superseded,
    };

    for doc in kept {
        let displaced = overridden.contains(doc.doc_type())
            && doc.document.metadata.version.is_some()
            && !refs.matches(&doc);
        if displaced {
            resolution.superseded.push(doc);
        } else {
            resolution.kept.push(doc);
        }
    }

    let names = restored
        .iter()
        .map(|d| d.source_name().to_string())
        .collect();
    resolution.kept.extend(restored);

    (resolution, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocDate, Document, DocumentMetadata};
    use chrono::Utc;

    fn policy(version: u32, year: i32, score: f32) -> ScoredDocument {
        let name = format!("policy_v{}_{}.txt", version, year);
        ScoredDocument {
            document: Document {
                id: name.clone(),
                text: String::new(),
                metadata: DocumentMetadata {
                    doc_type: "policy".to_string(),
                    version: Some(version),
                    date: Some(DocDate::Year(year)),
                    source_name: name,
                },
                content_hash: String::new(),
                ingested_at: Utc::now(),
            },
            score,
            seq: version as i64,
        }
    }

    fn generic(name: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            document: Document {
                id: name.to_string(),
                text: String::new(),
                metadata: DocumentMetadata::generic(name),
                content_hash: String::new(),
                ingested_at: Utc::now(),
            },
            score,
            seq: 99,
        }
    }

    fn names(docs: &[ScoredDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.source_name()).collect()
    }

    fn default_policy(_: &str) -> VersionPolicy {
        VersionPolicy::LatestWins
    }

    #[test]
    fn test_parse_references() {
        let refs = parse_references("What did the v1 policy from 2021 say?");
        assert_eq!(refs.versions, BTreeSet::from([1]));
        assert_eq!(refs.years, BTreeSet::from([2021]));

        let refs = parse_references("Under Version 3 of the rules");
        assert_eq!(refs.versions, BTreeSet::from([3]));

        assert!(parse_references("Can I work from home?").is_empty());
        assert!(parse_references("dev2021 review").is_empty());
        assert!(parse_references("v1a build 20215").is_empty());
    }

    #[test]
    fn test_parse_references_in_filenames() {
        let refs = parse_references("What did policy_v1_2021.txt say about remote work?");
        assert_eq!(refs.versions, BTreeSet::from([1]));
        assert_eq!(refs.years, BTreeSet::from([2021]));

        let refs = parse_references("compare 2021 2024");
        assert_eq!(refs.years, BTreeSet::from([2021, 2024]));
    }

    #[test]
    fn test_pick_latest_keeps_highest_version() {
        let resolution = pick_latest(
            vec![policy(1, 2021, 0.9), policy(2, 2024, 0.7), generic("notes.txt", 0.5)],
            default_policy,
        );

        assert_eq!(names(&resolution.kept), vec!["policy_v2_2024.txt", "notes.txt"]);
        assert_eq!(names(&resolution.superseded), vec!["policy_v1_2021.txt"]);
    }

    #[test]
    fn test_pick_latest_keep_all_policy() {
        let resolution = pick_latest(vec![policy(1, 2021, 0.9), policy(2, 2024, 0.7)], |_| {
            VersionPolicy::KeepAll
        });
        assert_eq!(resolution.kept.len(), 2);
        assert!(resolution.superseded.is_empty());
    }

    #[test]
    fn test_pick_latest_equal_versions_use_date() {
        let resolution = pick_latest(vec![policy(2, 2023, 0.9), policy(2, 2024, 0.1)], default_policy);
        assert_eq!(names(&resolution.kept), vec!["policy_v2_2024.txt"]);
    }

    #[test]
    fn test_year_reference_overrides_latest() {
        let stage_a = pick_latest(vec![policy(1, 2021, 0.6), policy(2, 2024, 0.8)], default_policy);
        let refs = parse_references("What was the remote policy in 2021?");

        let (resolution, restored) = apply_overrides(stage_a, &refs, default_policy);
        assert_eq!(names(&resolution.kept), vec!["policy_v1_2021.txt"]);
        assert_eq!(restored, vec!["policy_v1_2021.txt".to_string()]);
    }

    #[test]
    fn test_version_reference_overrides_latest() {
        let stage_a = pick_latest(vec![policy(1, 2021, 0.6), policy(2, 2024, 0.8)], default_policy);
        let refs = parse_references("what did v1 say");

        let (resolution, _) = apply_overrides(stage_a, &refs, default_policy);
        assert_eq!(names(&resolution.kept), vec!["policy_v1_2021.txt"]);
    }

    #[test]
    fn test_reference_to_latest_changes_nothing() {
        let stage_a = pick_latest(vec![policy(1, 2021, 0.6), policy(2, 2024, 0.8)], default_policy);
        let refs = parse_references("the 2024 policy");

        let (resolution, restored) = apply_overrides(stage_a, &refs, default_policy);
        assert_eq!(names(&resolution.kept), vec!["policy_v2_2024.txt"]);
        assert!(restored.is_empty());
    }

    #[test]
    fn test_both_referenced_keeps_both() {
        let stage_a = pick_latest(vec![policy(1, 2021, 0.6), policy(2, 2024, 0.8)], default_policy);
        let refs = parse_references("compare 2021 and 2024");

        let (resolution, _) = apply_overrides(stage_a, &refs, default_policy);
        assert_eq!(resolution.kept.len(), 2);
    }

    #[test]
    fn test_latest_only_ignores_references() {
        let latest_only = |_: &str| VersionPolicy::LatestOnly;
        let stage_a = pick_latest(vec![policy(1, 2021, 0.6), policy(2, 2024, 0.8)], latest_only);
        let refs = parse_references("in 2021");

        let (resolution, restored) = apply_overrides(stage_a, &refs, latest_only);
        assert_eq!(names(&resolution.kept), vec!["policy_v2_2024.txt"]);
        assert!(restored.is_empty());
    }
}
