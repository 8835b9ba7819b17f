//! # Search Query Matching
//!
//! Case-insensitive label filters applied before scoring.
//!
//! | Policy | `"go ma"` matches `"Google Maps"`? | Rule |
//! |--------|------------------------------------|------|
//! | `words` | yes | every whitespace-separated word is contained |
//! | `substring` | no | the whole trimmed query is contained |
//! | `prefix` | no | the label starts with the trimmed query |
//!
//! An empty query matches every label.

use serde::{Deserialize, Serialize};

/// How a query is matched against a label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    Words,
    Substring,
    Prefix,
}

/// Lowercase a string for case-insensitive comparison.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// A query folded once, ready to be tested against many labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    policy: MatchPolicy,
    whole: String,
    words: Vec<String>,
}

impl Query {
    pub fn new(text: &str, policy: MatchPolicy) -> Self {
        let whole = fold_case(text.trim());
        let words = match policy {
            MatchPolicy::Words => whole.split_whitespace().map(str::to_string).collect(),
            MatchPolicy::Substring | MatchPolicy::Prefix => Vec::new(),
        };
        Self {
            policy,
            whole,
            words,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.whole.is_empty()
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Test an already case-folded label.
    pub fn matches_folded(&self, folded_label: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        match self.policy {
            MatchPolicy::Words => self.words.iter().all(|w| folded_label.contains(w.as_str())),
            MatchPolicy::Substring => folded_label.contains(self.whole.as_str()),
            MatchPolicy::Prefix => folded_label.starts_with(self.whole.as_str()),
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.matches_folded(&fold_case(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_matches_everything() {
        for policy in [MatchPolicy::Words, MatchPolicy::Substring, MatchPolicy::Prefix] {
            assert!(Query::new("", policy).matches("Maps"));
            assert!(Query::new("   ", policy).matches("Maps"));
        }
    }

    #[test]
    fn test_case_insensitive_substring() {
        let query = Query::new("MA", MatchPolicy::Substring);
        assert!(query.matches("Maps"));
        assert!(query.matches("Gmail"));
        assert!(!query.matches("Calendar"));
    }

    #[test]
    fn test_prefix() {
        let query = Query::new("ca", MatchPolicy::Prefix);
        assert!(query.matches("Calendar"));
        assert!(query.matches("Camera"));
        assert!(!query.matches("Pica"));
    }

    #[test]
    fn test_words_must_all_match() {
        let query = Query::new("go  ma", MatchPolicy::Words);
        assert!(query.matches("Google Maps"));
        assert!(query.matches("Maps by Google"));
        assert!(!query.matches("Google Drive"));

        let substring = Query::new("go ma", MatchPolicy::Substring);
        assert!(!substring.matches("Google Maps"));
    }

    #[test]
    fn test_unicode_folding() {
        let query = Query::new("ÖVER", MatchPolicy::Words);
        assert!(query.matches("Översätt"));
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: MatchPolicy = serde_json::from_str("\"prefix\"").unwrap();
        assert_eq!(policy, MatchPolicy::Prefix);
        assert_eq!(serde_json::to_string(&MatchPolicy::Words).unwrap(), "\"words\"");
    }
}
