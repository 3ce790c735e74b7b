//! URL verification: read a page and judge one claim against it.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::{LanguageModel, parse_json_reply};

use super::page::{self, collapse_whitespace};
use super::{ToolFailure, ToolOutcome, Verdict, Verification, VerificationTool};

const TOOL: &str = "verify";

/// Page text beyond this many characters is not shown to the model.
const MAX_PROMPT_CHARS: usize = 12_000;

const VERIFY_SYSTEM: &str = "You check claims against the text of one web page. \
Judge only from the page text you are given, never from memory. \
Respond with a JSON object: {\"contentSummary\": string, \"verdict\": \
\"SUPPORTED\" | \"NOT_SUPPORTED\" | \"PARTIALLY_SUPPORTED\" | \"UNCLEAR\", \
\"quote\": string or null}. The quote must be copied verbatim from the page \
and must be the passage your verdict rests on.";

const SUMMARY_SYSTEM: &str = "You summarize one web page for a fact-checking team \
in two or three sentences. Do not write any URL.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelJudgement {
    #[serde(default, alias = "summary")]
    content_summary: String,
    verdict: String,
    #[serde(default)]
    quote: Option<String>,
}

/// [`VerificationTool`] that fetches pages over HTTP and asks a model.
pub struct PageVerifier {
    llm: Arc<dyn LanguageModel>,
    fetch_timeout: Duration,
}

impl PageVerifier {
    pub fn new(llm: Arc<dyn LanguageModel>, fetch_timeout: Duration) -> Self {
        Self { llm, fetch_timeout }
    }

    /// Judge `claim` against already-fetched page text.
    pub fn judge(&self, url: &str, claim: &str, text: &str) -> ToolOutcome<Verification> {
        let prompt = format!(
            "Claim: {claim}\n\nPage text:\n{}",
            text.chars().take(MAX_PROMPT_CHARS).collect::<String>()
        );
        let judgement: ModelJudgement = self
            .llm
            .generate(&prompt, Some(VERIFY_SYSTEM))
            .map_err(|e| ToolFailure::unavailable(TOOL, e.to_string()))
            .and_then(|reply| {
                parse_json_reply(&reply).map_err(|e| ToolFailure::malformed(TOOL, e.to_string()))
            })?;

        let verdict = Verdict::parse(&judgement.verdict).ok_or_else(|| {
            ToolFailure::malformed(TOOL, format!("unknown verdict \"{}\"", judgement.verdict))
        })?;
        let quote = judgement
            .quote
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let (verdict, quote) = ground(verdict, quote, text);
        Ok(Verification {
            url: url.to_string(),
            claim: Some(claim.to_string()),
            content_summary: judgement.content_summary.trim().to_string(),
            verdict,
            quote,
        })
    }

    fn summarize(&self, url: &str, text: &str) -> Verification {
        let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let summary = match self.llm.generate(&excerpt, Some(SUMMARY_SYSTEM)) {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => text.chars().take(500).collect(),
        };
        Verification {
            url: url.to_string(),
            claim: None,
            content_summary: summary,
            verdict: Verdict::Unclear,
            quote: None,
        }
    }
}

impl VerificationTool for PageVerifier {
    fn verify(&self, url: &str, claim: Option<&str>) -> ToolOutcome<Verification> {
        let claim = claim.map(str::trim).filter(|c| !c.is_empty());
        let page = match page::fetch(url, self.fetch_timeout) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(tool = TOOL, url, error = %e, "page fetch failed");
                return Ok(Verification::unreadable(url, claim, e));
            }
        };
        if page.text.trim().is_empty() {
            return Ok(Verification::unreadable(url, claim, "page has no readable text"));
        }

        match claim {
            Some(claim) => self.judge(url, claim, &page.text),
            None => Ok(self.summarize(url, &page.text)),
        }
    }
}

/// Keep a decisive verdict only when its quote occurs in the page text.
///
/// Comparison ignores whitespace layout, since extraction reflows text.
pub fn ground(verdict: Verdict, quote: Option<String>, page_text: &str) -> (Verdict, Option<String>) {
    let found = quote
        .as_deref()
        .is_some_and(|q| collapse_whitespace(page_text).contains(&collapse_whitespace(q)));
    match verdict {
        Verdict::Unclear => (Verdict::Unclear, quote.filter(|_| found)),
        _ if found => (verdict, quote),
        _ => {
            tracing::debug!(%verdict, "verdict quote not found in page, downgrading");
            (Verdict::Unclear, None)
        }
    }
}
