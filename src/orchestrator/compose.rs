//! Composing a draft from the case ledger.
//!
//! Composition is split in three: [`assess`] picks the classification and
//! the evidence it rests on, a [`ReplyWriter`] turns a URL-free [`Brief`]
//! into narrative text, and [`build_draft`] assembles references and
//! validates the result against the ledger.

use std::sync::Arc;

use serde::Serialize;

use crate::case::{AtomId, Case, ClaimKind, Evidence, EvidenceId, NoteSource, Provenance, VerificationStatus};
use crate::draft::{ClaimSummary, Classification, ContractViolation, Draft, find_url, redact_urls};
use crate::llm::LanguageModel;
use crate::tools::{ToolFailure, ToolOutcome, Verdict};

use super::triage::usable_prior;

/// Why a classification could not be justified.
#[derive(Debug, Clone, PartialEq)]
pub struct Insufficient {
    /// Claims treated as false without a refuting source.
    pub atoms: Vec<AtomId>,
    pub reason: String,
}

/// A classification and the evidence it rests on.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub classification: Classification,
    pub justified_by: Vec<EvidenceId>,
    /// Text of the prior reply the classification leans on, if any.
    pub prior_text: Option<String>,
}

fn verified(case: &Case, atoms: &[AtomId], verdict: Verdict) -> Vec<EvidenceId> {
    atoms
        .iter()
        .flat_map(|a| case.verified_as(*a, verdict))
        .map(|e| e.id)
        .collect()
}

/// Decide the classification.
///
/// In order: any refuted factual claim makes the message misinformation;
/// confirmed facts with no opinion and no half-truth make it true; with no
/// decided claim a well-rated prior reply is followed; anything else is
/// treated as opinion.
pub fn assess(case: &Case, prior_min_ratio: f64, use_priors: bool) -> Result<Assessment, Insufficient> {
    let factual_with = |status: VerificationStatus| -> Vec<AtomId> {
        case.atoms()
            .iter()
            .filter(|a| a.is_factual() && a.status() == status)
            .map(|a| a.id)
            .collect()
    };
    let refuted = factual_with(VerificationStatus::NotSupported);
    let supported = factual_with(VerificationStatus::Supported);
    let partial = factual_with(VerificationStatus::PartiallySupported);
    let has_opinion = case.atoms().iter().any(|a| a.kind == ClaimKind::Opinion);

    if !refuted.is_empty() {
        let unbacked: Vec<AtomId> = refuted
            .iter()
            .copied()
            .filter(|a| case.verified_as(*a, Verdict::NotSupported).is_empty())
            .collect();
        if !unbacked.is_empty() {
            return Err(Insufficient {
                atoms: unbacked,
                reason: "claim marked false without a refuting source".into(),
            });
        }
        return Ok(Assessment {
            classification: Classification::Misinformation,
            justified_by: verified(case, &refuted, Verdict::NotSupported),
            prior_text: None,
        });
    }

    if !supported.is_empty() && partial.is_empty() && !has_opinion {
        return Ok(Assessment {
            classification: Classification::TrueInfo,
            justified_by: verified(case, &supported, Verdict::Supported),
            prior_text: None,
        });
    }

    if use_priors && supported.is_empty() && partial.is_empty() {
        if let Some(prior) = usable_prior(case, prior_min_ratio) {
            if let Some(classification) = Classification::from_reply_type(prior.reply_type) {
                if classification == Classification::Misinformation && prior.evidence.is_empty() {
                    return Err(Insufficient {
                        atoms: Vec::new(),
                        reason: format!("prior reply {} cites no source", prior.reply_id),
                    });
                }
                return Ok(Assessment {
                    classification,
                    justified_by: prior.evidence.clone(),
                    prior_text: Some(prior.text.clone()),
                });
            }
        }
    }

    Ok(Assessment {
        classification: Classification::Opinionated,
        justified_by: verified(case, &supported, Verdict::Supported),
        prior_text: None,
    })
}

/// How each claim is reported. Unchecked claims read as unclear.
pub fn claim_summaries(case: &Case) -> Vec<ClaimSummary> {
    case.atoms()
        .iter()
        .map(|a| ClaimSummary {
            atom: a.id,
            text: a.text.clone(),
            kind: a.kind,
            status: match a.status() {
                VerificationStatus::Unchecked => VerificationStatus::Unclear,
                s => s,
            },
        })
        .collect()
}

// ── Writer input ────────────────────────────────────────────────────────

/// What one claim's best source says.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub claim: ClaimSummary,
    pub source_summary: Option<String>,
    pub quote: Option<String>,
}

/// A reviewer question and what research found about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub question: String,
    pub findings: Option<String>,
}

/// Everything a writer may use. Contains no URLs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Brief {
    pub classification: Classification,
    pub message: String,
    pub findings: Vec<Finding>,
    pub prior: Option<String>,
    pub questions: Vec<Answer>,
}

const LINK: &str = "[link]";
const QUESTION_PREFIX: &str = "Q: ";
const ANSWER_MARK: &str = "\nA: ";

/// Evidence summary for a source found while researching a reviewer question.
pub fn question_summary(question: &str, findings: &str) -> String {
    format!("{QUESTION_PREFIX}{}{ANSWER_MARK}{}", question.trim(), findings.trim())
}

fn is_question_evidence(evidence: &Evidence) -> bool {
    evidence.atom.is_none()
        && evidence.provenance == Provenance::SearchResult
        && evidence.summary.starts_with(QUESTION_PREFIX)
}

fn answer_for<'a>(case: &'a Case, question: &str) -> Option<&'a str> {
    let head = format!("{QUESTION_PREFIX}{}{ANSWER_MARK}", question.trim());
    case.evidence()
        .iter()
        .filter(|e| is_question_evidence(e))
        .find_map(|e| e.summary.strip_prefix(head.as_str()))
        .filter(|a| !a.is_empty())
}

fn best_for(case: &Case, atom: AtomId) -> Option<&Evidence> {
    case.evidence_for(atom)
        .max_by(|a, b| a.rank().total_cmp(&b.rank()))
}

pub fn brief(case: &Case, assessment: &Assessment) -> Brief {
    let findings = claim_summaries(case)
        .into_iter()
        .map(|claim| {
            let best = best_for(case, claim.atom);
            Finding {
                source_summary: best
                    .map(|e| redact_urls(&e.summary, LINK))
                    .filter(|s| !s.is_empty()),
                quote: best.and_then(|e| e.quote.as_deref()).map(|q| redact_urls(q, LINK)),
                claim: ClaimSummary {
                    text: redact_urls(&claim.text, LINK),
                    ..claim
                },
            }
        })
        .collect();

    let questions = case
        .notes()
        .iter()
        .filter(|n| matches!(n.source, NoteSource::Reviewer { .. }))
        .map(|n| Answer {
            question: redact_urls(&n.text, LINK),
            findings: answer_for(case, &n.text).map(|a| redact_urls(a, LINK)),
        })
        .collect();

    Brief {
        classification: assessment.classification,
        message: redact_urls(&case.message, LINK),
        findings,
        prior: assessment.prior_text.as_deref().map(|t| redact_urls(t, LINK)),
        questions,
    }
}

/// Turns a brief into the reply's narrative text.
pub trait ReplyWriter: Send + Sync {
    fn write(&self, brief: &Brief) -> ToolOutcome<String>;
}

/// Deterministic writer used offline and as a fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateWriter;

impl ReplyWriter for TemplateWriter {
    fn write(&self, brief: &Brief) -> ToolOutcome<String> {
        let mut paragraphs = Vec::new();
        paragraphs.push(
            match brief.classification {
                Classification::Misinformation => "⚠️ This message contains false information.",
                Classification::TrueInfo => "✅ The claims in this message are accurate.",
                Classification::Opinionated => {
                    "💬 This message contains personal opinion, and its claims could not all be confirmed."
                }
            }
            .to_string(),
        );

        for f in &brief.findings {
            let text = &f.claim.text;
            let mut line = match (f.claim.kind, f.claim.status) {
                (ClaimKind::Opinion, _) => format!("💬 \"{text}\" is an opinion, not a checkable fact."),
                (_, VerificationStatus::NotSupported) => {
                    format!("❌ \"{text}\" is not supported by the sources consulted.")
                }
                (_, VerificationStatus::Supported) => {
                    format!("✅ \"{text}\" is confirmed by the sources consulted.")
                }
                (_, VerificationStatus::PartiallySupported) => {
                    format!("⚠️ \"{text}\" is only partly supported by the sources consulted.")
                }
                _ => format!("❓ \"{text}\" could not be confirmed or refuted with the sources available."),
            };
            if f.claim.kind == ClaimKind::Factual {
                if let Some(quote) = &f.quote {
                    line.push_str(&format!(" The source states: \"{quote}\"."));
                } else if let Some(summary) = f.source_summary.as_ref().filter(|_| f.claim.status.is_decisive()) {
                    line.push_str(&format!(" {summary}"));
                }
            }
            paragraphs.push(line);
        }

        if let Some(prior) = &brief.prior {
            paragraphs.push(format!("📚 An earlier fact-check of this message found: {prior}"));
        }

        if !brief.questions.is_empty() {
            let mut block = String::from("🔎 Readers may also ask:");
            for answer in &brief.questions {
                block.push_str(&format!("\n• {}", answer.question));
                if let Some(findings) = &answer.findings {
                    block.push_str(&format!(" {findings}"));
                }
            }
            paragraphs.push(block);
        }

        Ok(paragraphs.join("\n\n"))
    }
}

const WRITER_SYSTEM: &str = "You write fact-check replies for a community fact-checking \
database. Write plain text only, no Markdown. Start with a short paragraph saying which \
parts of the message are correct, incorrect, or opinion, then explain each in its own \
paragraph, each paragraph starting with an emoji. Use a neutral, kind tone aimed at the \
people who forward such messages. Answer the readers' questions you are given. Never \
write a URL, a domain name, or a citation marker: sources are listed separately.";

/// Model-backed writer.
pub struct LlmWriter {
    llm: Arc<dyn LanguageModel>,
}

impl LlmWriter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

impl ReplyWriter for LlmWriter {
    fn write(&self, brief: &Brief) -> ToolOutcome<String> {
        let facts = serde_json::to_string_pretty(brief)
            .map_err(|e| ToolFailure::malformed("writer", e.to_string()))?;
        let prompt = format!("Write the reply text from these findings:\n{facts}");
        let generate = |prompt: &str| {
            self.llm
                .generate(prompt, Some(WRITER_SYSTEM))
                .map(|t| t.trim().to_string())
                .map_err(|e| ToolFailure::unavailable("writer", e.to_string()))
        };

        let text = generate(&prompt)?;
        match find_url(&text) {
            None => Ok(text),
            Some(url) => {
                tracing::debug!(url, "writer produced a URL, asking for a rewrite");
                generate(&format!(
                    "{prompt}\n\nYour previous answer contained \"{url}\". Rewrite it without any URL or domain name:\n{text}"
                ))
            }
        }
    }
}

// ── Assembly ────────────────────────────────────────────────────────────

fn clip(text: &str, max: usize) -> String {
    let mut clipped: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        clipped.push('…');
    }
    clipped
}

/// One-line relevance note for a reference.
pub fn reference_note(case: &Case, evidence: &Evidence) -> String {
    match evidence.provenance {
        Provenance::VerificationTool => {
            let claim = evidence
                .atom
                .and_then(|a| case.atom(a).ok())
                .map(|a| clip(&a.text, 80))
                .unwrap_or_default();
            let verdict = evidence.verdict.unwrap_or(Verdict::Unclear);
            match &evidence.quote {
                Some(quote) => format!("{verdict} for \"{claim}\": \"{}\"", clip(quote, 120)),
                None => format!("{verdict} for \"{claim}\": {}", clip(&evidence.summary, 120)),
            }
        }
        Provenance::KnowledgeStore => format!(
            "Source cited by an existing fact-check (helpful ratio {:.2})",
            evidence.weight
        ),
        Provenance::SearchResult => {
            let summary = evidence
                .summary
                .split_once(ANSWER_MARK)
                .map_or(evidence.summary.as_str(), |(_, answer)| answer);
            if summary.is_empty() {
                "Search result".into()
            } else {
                clip(summary, 160)
            }
        }
    }
}

/// Evidence to cite: the justification, the best source per claim, and the
/// sources found for reviewer questions. Highest rank first, one per URL.
pub fn cited_evidence<'a>(case: &'a Case, assessment: &Assessment) -> Vec<&'a Evidence> {
    let mut cited: Vec<&Evidence> = assessment
        .justified_by
        .iter()
        .filter_map(|id| case.evidence_by_id(*id))
        .collect();
    for atom in case.atoms().iter().filter(|a| a.is_factual()) {
        if let Some(best) = best_for(case, atom.id) {
            cited.push(best);
        }
    }
    cited.extend(
        case.evidence()
            .iter()
            .filter(|e| is_question_evidence(e))
            .take(3),
    );

    cited.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
    let mut seen = std::collections::HashSet::new();
    cited.retain(|e| seen.insert(e.url.as_str()));
    cited
}

/// Assemble and validate the draft.
pub fn build_draft(
    case: &Case,
    assessment: &Assessment,
    text: &str,
    round: u32,
) -> Result<Draft, ContractViolation> {
    let mut builder = Draft::builder(assessment.classification).text(text).round(round);
    for evidence in cited_evidence(case, assessment) {
        builder = builder.reference(evidence.url.clone(), &reference_note(case, evidence));
    }
    for summary in claim_summaries(case) {
        builder = builder.claim(summary);
    }
    for id in &assessment.justified_by {
        builder = builder.justified_by(*id);
    }
    builder.build(case.evidence())
}
