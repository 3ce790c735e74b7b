//! Perspective reviewers.
//!
//! A reviewer reads a suspicious message (or a draft reply to it) from one
//! stakeholder viewpoint. In round 1 it raises critical questions; in later
//! rounds it partitions the questions still open into resolved and
//! unresolved. Every viewpoint is the same capability parametrized by a
//! [`ViewpointProfile`], so adding a viewpoint means adding a profile file.

pub mod llm;
pub mod panel;
pub mod profile;

use std::collections::{BTreeMap, HashSet};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::draft::Draft;
use crate::tools::ToolOutcome;

pub use llm::ProfileReviewer;
pub use panel::ReviewPanel;
pub use profile::{ViewpointProfile, ViewpointRegistry};

#[derive(Debug, Error, Diagnostic)]
pub enum ReviewError {
    #[error("reviewer {reviewer} did not partition its prior questions: {reason}")]
    #[diagnostic(
        code(factdesk::review::partition),
        help("Every prior question must be reported exactly once, as resolved or unresolved.")
    )]
    PartitionViolation { reviewer: String, reason: String },

    #[error("failed to read viewpoint profile: {path}")]
    #[diagnostic(code(factdesk::review::profile_read))]
    ProfileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse viewpoint profile {path}: {message}")]
    #[diagnostic(
        code(factdesk::review::profile_parse),
        help("A profile needs id, name, constituency, values and focus_questions.")
    )]
    ProfileParse { path: String, message: String },
}

pub type ReviewResult<T> = std::result::Result<T, ReviewError>;

/// Round-1 output: questions raised about the raw message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub reviewer: String,
    pub questions: Vec<String>,
    /// Predicted reactions of the reviewer's constituency.
    #[serde(default)]
    pub reactions: Vec<String>,
}

/// Round-2+ output: the prior questions, partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReReview {
    pub reviewer: String,
    pub resolved: Vec<String>,
    pub unresolved: Vec<String>,
}

/// One stakeholder viewpoint.
pub trait Reviewer: Send + Sync {
    fn profile(&self) -> &ViewpointProfile;

    fn critique(&self, message: &str) -> ToolOutcome<Critique>;

    /// Judge which of `prior` the draft answers. Must return each prior
    /// question exactly once across `resolved` and `unresolved`.
    fn re_review(&self, message: &str, draft: &Draft, prior: &[String]) -> ToolOutcome<ReReview>;
}

/// One reviewer's output for one round, kept append-only in the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewerVerdict {
    Critique {
        reviewer: String,
        round: u32,
        questions: Vec<String>,
        reactions: Vec<String>,
    },
    ReReview {
        reviewer: String,
        round: u32,
        resolved: Vec<String>,
        unresolved: Vec<String>,
    },
    /// The reviewer timed out, failed, or broke the partition contract.
    Failed {
        reviewer: String,
        round: u32,
        reason: String,
    },
}

impl ReviewerVerdict {
    pub fn reviewer(&self) -> &str {
        match self {
            Self::Critique { reviewer, .. }
            | Self::ReReview { reviewer, .. }
            | Self::Failed { reviewer, .. } => reviewer,
        }
    }

    pub fn round(&self) -> u32 {
        match self {
            Self::Critique { round, .. } | Self::ReReview { round, .. } | Self::Failed { round, .. } => {
                *round
            }
        }
    }
}

/// Questions still open per reviewer after replaying a verdict history.
///
/// A critique opens its questions, a re-review leaves its unresolved ones
/// open, and a failure changes nothing.
pub fn open_questions(history: &[ReviewerVerdict]) -> BTreeMap<String, Vec<String>> {
    let mut open: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for verdict in history {
        match verdict {
            ReviewerVerdict::Critique {
                reviewer, questions, ..
            } => {
                open.insert(reviewer.clone(), questions.clone());
            }
            ReviewerVerdict::ReReview {
                reviewer, unresolved, ..
            } => {
                open.insert(reviewer.clone(), unresolved.clone());
            }
            ReviewerVerdict::Failed { .. } => {}
        }
    }
    open
}

/// Verify that a re-review partitions `prior` exactly.
pub fn check_partition(prior: &[String], result: &ReReview) -> ReviewResult<()> {
    let violation = |reason: String| ReviewError::PartitionViolation {
        reviewer: result.reviewer.clone(),
        reason,
    };
    let expected: HashSet<&str> = prior.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    for q in result.resolved.iter().chain(&result.unresolved) {
        if !expected.contains(q.as_str()) {
            return Err(violation(format!("unknown question \"{q}\"")));
        }
        if !seen.insert(q.as_str()) {
            return Err(violation(format!("question reported twice: \"{q}\"")));
        }
    }
    if let Some(missing) = expected.iter().find(|q| !seen.contains(*q)) {
        return Err(violation(format!("question not reported: \"{missing}\"")));
    }
    Ok(())
}

/// Comparison key for questions: NFC, case-folded, whitespace collapsed,
/// trailing punctuation ignored.
pub fn question_key(question: &str) -> String {
    let normalized: String = question.nfc().collect::<String>().to_lowercase();
    normalized
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['?', '？', '.', '。', '!', '！'])
        .to_string()
}

/// Merge question lists in order, dropping blanks and near-duplicates.
pub fn merge_questions<'a>(lists: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut keys = HashSet::new();
    let mut merged = Vec::new();
    for q in lists.into_iter().flatten() {
        let q = q.trim();
        if q.is_empty() {
            continue;
        }
        if keys.insert(question_key(q)) {
            merged.push(q.to_string());
        }
    }
    merged
}
