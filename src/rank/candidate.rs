//! Installed launchables as supplied by the platform integration.

use super::query::fold_case;
use crate::usage::LaunchableId;
use serde::{Deserialize, Serialize};

/// One installed launchable and its display metadata.
///
/// The case-folded label is computed once here so per-keystroke filtering
/// does not allocate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CandidateSpec", into = "CandidateSpec")]
pub struct Candidate {
    pub identity: LaunchableId,
    pub label: String,
    pub icon_ref: Option<String>,
    folded_label: String,
}

/// Wire shape of a candidate: `{"identity", "label", "iconRef"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CandidateSpec {
    identity: LaunchableId,
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon_ref: Option<String>,
}

impl From<CandidateSpec> for Candidate {
    fn from(spec: CandidateSpec) -> Self {
        Self::new(spec.identity, spec.label, spec.icon_ref)
    }
}

impl From<Candidate> for CandidateSpec {
    fn from(candidate: Candidate) -> Self {
        Self {
            identity: candidate.identity,
            label: candidate.label,
            icon_ref: candidate.icon_ref,
        }
    }
}

impl Candidate {
    pub fn new(identity: LaunchableId, label: impl Into<String>, icon_ref: Option<String>) -> Self {
        let label = label.into();
        Self {
            folded_label: fold_case(&label),
            identity,
            label,
            icon_ref,
        }
    }

    /// Lowercased label used for matching and the alphabetical fallback.
    pub fn folded_label(&self) -> &str {
        &self.folded_label
    }
}
