//! The reply artifact and its format contract.
//!
//! A [`Draft`] is only ever built through [`DraftBuilder::build`], which
//! validates it against the case's evidence ledger: the narrative text holds
//! no URL, every reference is backed by recorded evidence and appears once,
//! and every piece of evidence that justifies the classification is listed.
//! A violation is returned as a [`ContractViolation`]; nothing is stripped
//! to make a draft pass.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use miette::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::case::{AtomId, ClaimKind, Evidence, EvidenceId, VerificationStatus};
use crate::knowledge::ReplyType;

/// Scheme URLs, `www.` hosts, and bare domains under common TLDs.
static RE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:https?|ftp)://\S+|\bwww\.\S+|\b[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|net|org|gov|edu|tw|io|co|info|ly|cc|tv|us|uk|jp|cn|hk)\b(?:/\S*)?)",
    )
    .unwrap()
});

/// The first URL-like substring of `text`, if any.
pub fn find_url(text: &str) -> Option<&str> {
    RE_URL.find(text).map(|m| m.as_str())
}

/// Replace every URL-like substring with `replacement`.
///
/// Only for text about to be shown to a model or a writer as input; drafts
/// themselves are rejected, not rewritten.
pub fn redact_urls(text: &str, replacement: &str) -> String {
    RE_URL.replace_all(text, replacement).into_owned()
}

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum ContractViolation {
    #[error("draft text contains a URL: {found}")]
    #[diagnostic(
        code(factdesk::draft::url_in_text),
        help("URLs belong in the reference list. Rewrite the text without it.")
    )]
    UrlInText { found: String },

    #[error("reference {url} is not backed by any recorded evidence")]
    #[diagnostic(
        code(factdesk::draft::unbacked_reference),
        help("Only URLs returned by a collaborator during this case may be cited.")
    )]
    UnbackedReference { url: String },

    #[error("reference {url} is listed more than once")]
    #[diagnostic(code(factdesk::draft::duplicate_reference))]
    DuplicateReference { url: String },

    #[error("evidence {url} justifies the classification but is not referenced")]
    #[diagnostic(
        code(factdesk::draft::missing_reference),
        help("Every justifying evidence item must appear in the reference list exactly once.")
    )]
    MissingReference { url: String },

    #[error("draft cites unknown evidence {id}")]
    #[diagnostic(code(factdesk::draft::unknown_evidence))]
    UnknownEvidence { id: EvidenceId },

    #[error("draft text is empty")]
    #[diagnostic(code(factdesk::draft::empty_text))]
    EmptyText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    TrueInfo,
    Misinformation,
    Opinionated,
}

impl Classification {
    /// The knowledge-store reply type this classification is submitted as.
    pub fn reply_type(self) -> ReplyType {
        match self {
            Self::TrueInfo => ReplyType::NotRumor,
            Self::Misinformation => ReplyType::Rumor,
            Self::Opinionated => ReplyType::Opinionated,
        }
    }

    pub fn from_reply_type(reply_type: ReplyType) -> Option<Self> {
        match reply_type {
            ReplyType::NotRumor => Some(Self::TrueInfo),
            ReplyType::Rumor => Some(Self::Misinformation),
            ReplyType::Opinionated => Some(Self::Opinionated),
            ReplyType::NotArticle | ReplyType::Unknown => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TrueInfo => "TRUE_INFO",
            Self::Misinformation => "MISINFORMATION",
            Self::Opinionated => "OPINIONATED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    /// One line on why the source is relevant.
    pub note: String,
}

/// How one claim stands in the draft.
///
/// A claim no verification reached is reported as `Unclear` here; the claim
/// itself stays `Unchecked` in the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSummary {
    pub atom: AtomId,
    pub text: String,
    pub kind: ClaimKind,
    pub status: VerificationStatus,
}

/// The external reply contract: `{classification, text, references}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub classification: Classification,
    pub text: String,
    pub references: Vec<Reference>,
}

/// A validated reply draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    classification: Classification,
    text: String,
    references: Vec<Reference>,
    claims: Vec<ClaimSummary>,
    justified_by: Vec<EvidenceId>,
    round: u32,
}

impl Draft {
    pub fn builder(classification: Classification) -> DraftBuilder {
        DraftBuilder {
            classification,
            text: String::new(),
            references: Vec::new(),
            claims: Vec::new(),
            justified_by: Vec::new(),
            round: 0,
        }
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn claims(&self) -> &[ClaimSummary] {
        &self.claims
    }

    /// Evidence the classification rests on.
    pub fn justified_by(&self) -> &[EvidenceId] {
        &self.justified_by
    }

    /// Revise round this draft was composed in, starting at 0.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn reply(&self) -> Reply {
        Reply {
            classification: self.classification,
            text: self.text.clone(),
            references: self.references.clone(),
        }
    }

    /// The reference field as submitted: each URL on its own line, followed
    /// by its note, entries separated by a blank line.
    pub fn reference_field(&self) -> String {
        self.references
            .iter()
            .map(|r| format!("{}\n{}", r.url, r.note))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Check the format contract against a case's evidence ledger.
    pub fn validate(&self, evidence: &[Evidence]) -> Result<(), ContractViolation> {
        if self.text.trim().is_empty() {
            return Err(ContractViolation::EmptyText);
        }
        if let Some(found) = find_url(&self.text) {
            return Err(ContractViolation::UrlInText {
                found: found.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for reference in &self.references {
            if !seen.insert(reference.url.as_str()) {
                return Err(ContractViolation::DuplicateReference {
                    url: reference.url.clone(),
                });
            }
            if !evidence.iter().any(|e| e.url == reference.url) {
                return Err(ContractViolation::UnbackedReference {
                    url: reference.url.clone(),
                });
            }
        }

        for id in &self.justified_by {
            let item = evidence
                .iter()
                .find(|e| e.id == *id)
                .ok_or(ContractViolation::UnknownEvidence { id: *id })?;
            if !seen.contains(item.url.as_str()) {
                return Err(ContractViolation::MissingReference {
                    url: item.url.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Assembles a [`Draft`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct DraftBuilder {
    classification: Classification,
    text: String,
    references: Vec<Reference>,
    claims: Vec<ClaimSummary>,
    justified_by: Vec<EvidenceId>,
    round: u32,
}

impl DraftBuilder {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into().trim().to_string();
        self
    }

    /// Add a reference. The note is folded onto one line.
    pub fn reference(mut self, url: impl Into<String>, note: &str) -> Self {
        self.references.push(Reference {
            url: url.into().trim().to_string(),
            note: note.split_whitespace().collect::<Vec<_>>().join(" "),
        });
        self
    }

    pub fn claim(mut self, summary: ClaimSummary) -> Self {
        self.claims.push(summary);
        self
    }

    pub fn justified_by(mut self, id: EvidenceId) -> Self {
        if !self.justified_by.contains(&id) {
            self.justified_by.push(id);
        }
        self
    }

    pub fn round(mut self, round: u32) -> Self {
        self.round = round;
        self
    }

    pub fn build(self, evidence: &[Evidence]) -> Result<Draft, ContractViolation> {
        let draft = Draft {
            classification: self.classification,
            text: self.text,
            references: self.references,
            claims: self.claims,
            justified_by: self.justified_by,
            round: self.round,
        };
        draft.validate(evidence)?;
        Ok(draft)
    }
}
