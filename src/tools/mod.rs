//! Research and verification collaborators.
//!
//! The orchestrator never talks to the web directly. It calls a
//! [`ResearchTool`] to find sources and a [`VerificationTool`] to read them,
//! and every call yields a [`ToolOutcome`]: either a typed payload or a
//! [`ToolFailure`] that the orchestrator treats as absence of evidence.

pub mod deadline;
pub mod page;
pub mod research;
pub mod verify;

use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use deadline::run_with_deadline;
pub use research::{SearchConfig, WebResearcher};
pub use verify::PageVerifier;

/// Why a collaborator call produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ToolFailure {
    #[error("{tool} timed out after {secs}s")]
    #[diagnostic(
        code(factdesk::tool::timeout),
        help("Raise the timeout in the [timeouts] section of the config, or retry later.")
    )]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} unavailable: {message}")]
    #[diagnostic(
        code(factdesk::tool::unavailable),
        help("Check that the backing service is running and reachable.")
    )]
    Unavailable { tool: String, message: String },

    #[error("{tool} returned an unusable response: {message}")]
    #[diagnostic(
        code(factdesk::tool::malformed),
        help("The collaborator answered but not in the expected shape.")
    )]
    Malformed { tool: String, message: String },

    #[error("{tool} call abandoned: case was cancelled")]
    #[diagnostic(code(factdesk::tool::cancelled))]
    Cancelled { tool: String },
}

impl ToolFailure {
    pub fn unavailable(tool: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn malformed(tool: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::Timeout { tool, .. }
            | Self::Unavailable { tool, .. }
            | Self::Malformed { tool, .. }
            | Self::Cancelled { tool } => tool,
        }
    }
}

pub type ToolOutcome<T> = std::result::Result<T, ToolFailure>;

/// Wire shape of a tool reply: a success payload or `{"error": "..."}`.
///
/// Deserialization tries the failure shape first, so a payload is only read
/// once the reply is known not to be an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolEnvelope<T> {
    Failure { error: String },
    Success(T),
}

impl<T> ToolEnvelope<T> {
    pub fn into_outcome(self, tool: &str) -> ToolOutcome<T> {
        match self {
            Self::Failure { error } => Err(ToolFailure::unavailable(tool, error)),
            Self::Success(payload) => Ok(payload),
        }
    }
}

impl<T> From<ToolOutcome<T>> for ToolEnvelope<T> {
    fn from(outcome: ToolOutcome<T>) -> Self {
        match outcome {
            Ok(payload) => Self::Success(payload),
            Err(failure) => Self::Failure {
                error: failure.to_string(),
            },
        }
    }
}

// ── Research ────────────────────────────────────────────────────────────

/// A source a search actually returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLink {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// Result of a research call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Findings {
    pub findings_summary: String,
    /// The literal queries that were executed.
    pub queries_used: Vec<String>,
    #[serde(default)]
    pub sources: Vec<SourceLink>,
}

/// Web research: find and synthesize sources for a query.
pub trait ResearchTool: Send + Sync {
    fn search(&self, query: &str) -> ToolOutcome<Findings>;
}

// ── Verification ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Supported,
    NotSupported,
    PartiallySupported,
    Unclear,
}

impl Verdict {
    /// Parse a verdict label as a model tends to write it.
    pub fn parse(label: &str) -> Option<Self> {
        let norm: String = label
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match norm.as_str() {
            "SUPPORTED" => Some(Self::Supported),
            "NOTSUPPORTED" | "UNSUPPORTED" => Some(Self::NotSupported),
            "PARTIALLYSUPPORTED" | "PARTIAL" => Some(Self::PartiallySupported),
            "UNCLEAR" => Some(Self::Unclear),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Supported => "SUPPORTED",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::PartiallySupported => "PARTIALLY_SUPPORTED",
            Self::Unclear => "UNCLEAR",
        };
        f.write_str(s)
    }
}

/// Result of reading one URL against an optional claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    /// Always the URL that was requested.
    pub url: String,
    pub claim: Option<String>,
    pub content_summary: String,
    pub verdict: Verdict,
    pub quote: Option<String>,
}

impl Verification {
    /// The result for a page that could not be read.
    pub fn unreadable(url: &str, claim: Option<&str>, reason: impl fmt::Display) -> Self {
        Self {
            url: url.to_string(),
            claim: claim.map(str::to_string),
            content_summary: format!("could not read page: {reason}"),
            verdict: Verdict::Unclear,
            quote: None,
        }
    }
}

/// Read a URL and judge whether it supports a claim.
pub trait VerificationTool: Send + Sync {
    fn verify(&self, url: &str, claim: Option<&str>) -> ToolOutcome<Verification>;
}
