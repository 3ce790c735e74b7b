//! Case state: one investigation of one suspicious message.
//!
//! A [`Case`] owns everything the orchestrator learns while working on a
//! message: the decomposed [`ClaimAtom`]s, the [`Evidence`] ledger, the
//! append-only reviewer history, the prior replies found in the knowledge
//! store, and an audit trail of every collaborator call and state transition.
//!
//! Two invariants are enforced here rather than by callers:
//! - a claim's verification status never returns to `Unchecked` once a
//!   verification result is attached;
//! - evidence can only cite URLs that a collaborator actually returned
//!   (see [`Case::trace_url`]).

use std::collections::BTreeSet;
use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::knowledge::ReplyType;
use crate::orchestrator::Phase;
use crate::review::ReviewerVerdict;
use crate::tools::{Verdict, Verification};

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum CaseError {
    #[error("evidence cites a URL no collaborator returned: {url}")]
    #[diagnostic(
        code(factdesk::case::untraced_url),
        help(
            "Evidence URLs must come from a Research Tool or Knowledge Store response. \
             Trace the URL with `Case::trace_url` when the response arrives."
        )
    )]
    UntracedUrl { url: String },

    #[error("unknown claim atom: {atom}")]
    #[diagnostic(
        code(factdesk::case::unknown_atom),
        help("The atom id does not belong to this case. Atoms are created by `Case::add_atoms`.")
    )]
    UnknownAtom { atom: AtomId },

    #[error("verification for {url} is not about claim {atom}")]
    #[diagnostic(
        code(factdesk::case::claim_mismatch),
        help("Verify the URL against the atom's own text before attaching the result.")
    )]
    ClaimMismatch { url: String, atom: AtomId },
}

pub type CaseResult<T> = std::result::Result<T, CaseError>;

// ── Identifiers ─────────────────────────────────────────────────────────

/// Stable identifier of a case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(String);

impl CaseId {
    /// A case about a knowledge-store article.
    pub fn article(article_id: &str) -> Self {
        Self(format!("article:{article_id}"))
    }

    /// A case started from raw message text with no article behind it.
    ///
    /// The id is the 64-bit FNV-1a hash of the trimmed text, so the same
    /// message maps to the same archive record across builds.
    pub fn adhoc(text: &str) -> Self {
        let hash = text
            .trim()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
        Self(format!("text:{hash:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtomId(pub u32);

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceId(pub u32);

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evidence#{}", self.0)
    }
}

// ── Claim atoms ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimKind {
    Factual,
    Opinion,
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factual => write!(f, "FACTUAL"),
            Self::Opinion => write!(f, "OPINION"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Unchecked,
    Supported,
    NotSupported,
    PartiallySupported,
    Unclear,
}

impl VerificationStatus {
    /// Fold every verdict attached to a claim into one status.
    ///
    /// Contradicting decisive verdicts (one source supports, another does
    /// not) leave the claim `Unclear`.
    pub fn from_verdicts(verdicts: &[Verdict]) -> Self {
        if verdicts.is_empty() {
            return Self::Unchecked;
        }
        let has = |v: Verdict| verdicts.contains(&v);
        match (has(Verdict::Supported), has(Verdict::NotSupported)) {
            (true, true) => Self::Unclear,
            (false, true) => Self::NotSupported,
            (true, false) => Self::Supported,
            (false, false) if has(Verdict::PartiallySupported) => Self::PartiallySupported,
            (false, false) => Self::Unclear,
        }
    }

    pub fn is_decisive(self) -> bool {
        matches!(self, Self::Supported | Self::NotSupported)
    }
}

impl From<Verdict> for VerificationStatus {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Supported => Self::Supported,
            Verdict::NotSupported => Self::NotSupported,
            Verdict::PartiallySupported => Self::PartiallySupported,
            Verdict::Unclear => Self::Unclear,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchecked => "UNCHECKED",
            Self::Supported => "SUPPORTED",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::PartiallySupported => "PARTIALLY_SUPPORTED",
            Self::Unclear => "UNCLEAR",
        };
        f.write_str(s)
    }
}

/// One factual or opinion statement decomposed from the case message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAtom {
    pub id: AtomId,
    pub text: String,
    pub kind: ClaimKind,
    status: VerificationStatus,
    verdicts: Vec<Verdict>,
    downgraded: bool,
}

impl ClaimAtom {
    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn is_factual(&self) -> bool {
        self.kind == ClaimKind::Factual
    }

    /// Verdicts attached so far, in arrival order.
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    pub fn is_downgraded(&self) -> bool {
        self.downgraded
    }

    fn attach(&mut self, verdict: Verdict) {
        self.verdicts.push(verdict);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.status = if self.downgraded {
            VerificationStatus::Unclear
        } else {
            VerificationStatus::from_verdicts(&self.verdicts)
        };
    }
}

/// A claim proposed by decomposition, before it joins a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedClaim {
    pub text: String,
    pub kind: ClaimKind,
}

impl ProposedClaim {
    pub fn factual(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ClaimKind::Factual,
        }
    }

    pub fn opinion(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ClaimKind::Opinion,
        }
    }
}

// ── Evidence ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    SearchResult,
    KnowledgeStore,
    VerificationTool,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SearchResult => write!(f, "search-result"),
            Self::KnowledgeStore => write!(f, "knowledge-store"),
            Self::VerificationTool => write!(f, "verification-tool"),
        }
    }
}

/// A sourced fact that supports or refutes (part of) the case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub url: String,
    pub summary: String,
    /// The claim this evidence speaks to, if any.
    pub atom: Option<AtomId>,
    pub provenance: Provenance,
    /// Present only for verification-tool evidence.
    pub verdict: Option<Verdict>,
    pub quote: Option<String>,
    /// Community feedback weight for knowledge-store evidence, 1.0 otherwise.
    pub weight: f64,
}

impl Evidence {
    /// Ranking used when references are ordered and when sources disagree.
    ///
    /// Direct URL-content confirmation outranks knowledge-store priors, which
    /// outrank unverified search synthesis.
    pub fn rank(&self) -> f64 {
        match self.provenance {
            Provenance::VerificationTool => match self.verdict {
                Some(Verdict::Supported | Verdict::NotSupported) => 1.0,
                Some(Verdict::PartiallySupported) => 0.7,
                _ => 0.2,
            },
            Provenance::KnowledgeStore => 0.8 * self.weight,
            Provenance::SearchResult => 0.3,
        }
    }
}

// ── Priors, notes, audit ────────────────────────────────────────────────

/// An existing fact-check reply found in the knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorReply {
    pub article_id: String,
    pub reply_id: String,
    pub reply_type: ReplyType,
    pub text: String,
    pub helpful: u32,
    pub unhelpful: u32,
    /// Laplace-smoothed helpful ratio.
    pub weight: f64,
    /// Evidence recorded from the reply's reference field.
    pub evidence: Vec<EvidenceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum NoteSource {
    User,
    Reviewer { reviewer: String },
}

/// Context appended to the case by the user or by reviewer feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextNote {
    pub source: NoteSource,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    Failed { reason: String },
}

/// One collaborator call, kept for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: String,
    /// Literal queries the collaborator reported executing.
    pub queries: Vec<String>,
    pub status: CallStatus,
}

impl ToolCallRecord {
    pub fn ok(tool: impl Into<String>, input: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            tool: tool.into(),
            input: input.into(),
            queries,
            status: CallStatus::Ok,
        }
    }

    pub fn failed(tool: impl Into<String>, input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            input: input.into(),
            queries: Vec::new(),
            status: CallStatus::Failed {
                reason: reason.into(),
            },
        }
    }
}

// ── Case ────────────────────────────────────────────────────────────────

/// The unit of work: one suspicious message and everything learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub article_id: Option<String>,
    /// Message text, or the OCR/transcript for media messages.
    pub message: String,
    pub message_kind: Option<String>,
    atoms: Vec<ClaimAtom>,
    evidence: Vec<Evidence>,
    verdicts: Vec<ReviewerVerdict>,
    priors: Vec<PriorReply>,
    notes: Vec<ContextNote>,
    /// URLs the message itself links to, as crawled by the knowledge store.
    message_links: Vec<String>,
    traced_urls: BTreeSet<String>,
    calls: Vec<ToolCallRecord>,
    trail: Vec<Phase>,
}

impl Case {
    pub fn new(id: CaseId, article_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            article_id,
            message: message.into(),
            message_kind: None,
            atoms: Vec::new(),
            evidence: Vec::new(),
            verdicts: Vec::new(),
            priors: Vec::new(),
            notes: Vec::new(),
            message_links: Vec::new(),
            traced_urls: BTreeSet::new(),
            calls: Vec::new(),
            trail: Vec::new(),
        }
    }

    // -- URL tracing --

    /// Mark a URL as returned by a collaborator, making it citable.
    pub fn trace_url(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.traced_urls.insert(url.to_string());
        }
    }

    pub fn is_traced(&self, url: &str) -> bool {
        self.traced_urls.contains(url.trim())
    }

    /// Record a link found in the message by the knowledge store crawler.
    pub fn add_message_link(&mut self, url: &str) {
        self.trace_url(url);
        let url = url.trim().to_string();
        if !url.is_empty() && !self.message_links.contains(&url) {
            self.message_links.push(url);
        }
    }

    pub fn message_links(&self) -> &[String] {
        &self.message_links
    }

    // -- Claims --

    /// Add decomposed claims, returning the ids assigned to them.
    ///
    /// Blank claims and exact duplicates of existing claims are skipped.
    pub fn add_atoms(&mut self, claims: Vec<ProposedClaim>) -> Vec<AtomId> {
        let mut ids = Vec::new();
        for claim in claims {
            let text = claim.text.trim();
            if text.is_empty() || self.atoms.iter().any(|a| a.text == text) {
                continue;
            }
            let id = AtomId(self.atoms.len() as u32);
            self.atoms.push(ClaimAtom {
                id,
                text: text.to_string(),
                kind: claim.kind,
                status: VerificationStatus::Unchecked,
                verdicts: Vec::new(),
                downgraded: false,
            });
            ids.push(id);
        }
        ids
    }

    pub fn atoms(&self) -> &[ClaimAtom] {
        &self.atoms
    }

    pub fn atom(&self, id: AtomId) -> CaseResult<&ClaimAtom> {
        self.atoms
            .get(id.0 as usize)
            .ok_or(CaseError::UnknownAtom { atom: id })
    }

    /// Factual claims that no verification result has reached yet.
    pub fn unchecked_factual(&self) -> Vec<AtomId> {
        self.atoms
            .iter()
            .filter(|a| a.is_factual() && a.status == VerificationStatus::Unchecked)
            .map(|a| a.id)
            .collect()
    }

    /// Withdraw a claim's decisive status after COMPOSE found it lacked
    /// citable support. The claim ends `Unclear`, never `Unchecked`.
    pub fn downgrade(&mut self, id: AtomId) -> CaseResult<()> {
        let atom = self
            .atoms
            .get_mut(id.0 as usize)
            .ok_or(CaseError::UnknownAtom { atom: id })?;
        atom.downgraded = true;
        atom.recompute();
        Ok(())
    }

    // -- Evidence --

    /// Record evidence from a search result or the knowledge store.
    ///
    /// Duplicates (same URL, claim and provenance) return the existing id.
    pub fn record_evidence(
        &mut self,
        url: &str,
        summary: &str,
        atom: Option<AtomId>,
        provenance: Provenance,
        weight: f64,
    ) -> CaseResult<EvidenceId> {
        if let Some(atom) = atom {
            self.atom(atom)?;
        }
        self.push_evidence(url, summary, atom, provenance, None, None, weight)
    }

    /// Record a Verification Tool result for a claim and attach its verdict.
    pub fn record_verification(
        &mut self,
        atom: AtomId,
        verification: &Verification,
    ) -> CaseResult<EvidenceId> {
        let claim_text = self.atom(atom)?.text.clone();
        if let Some(claim) = &verification.claim {
            if claim.trim() != claim_text {
                return Err(CaseError::ClaimMismatch {
                    url: verification.url.clone(),
                    atom,
                });
            }
        }
        let id = self.push_evidence(
            &verification.url,
            &verification.content_summary,
            Some(atom),
            Provenance::VerificationTool,
            Some(verification.verdict),
            verification.quote.clone(),
            1.0,
        )?;
        self.atoms[atom.0 as usize].attach(verification.verdict);
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_evidence(
        &mut self,
        url: &str,
        summary: &str,
        atom: Option<AtomId>,
        provenance: Provenance,
        verdict: Option<Verdict>,
        quote: Option<String>,
        weight: f64,
    ) -> CaseResult<EvidenceId> {
        let url = url.trim();
        if !self.is_traced(url) {
            return Err(CaseError::UntracedUrl {
                url: url.to_string(),
            });
        }
        if verdict.is_none() {
            if let Some(existing) = self
                .evidence
                .iter()
                .find(|e| e.url == url && e.atom == atom && e.provenance == provenance)
            {
                return Ok(existing.id);
            }
        }
        let id = EvidenceId(self.evidence.len() as u32);
        self.evidence.push(Evidence {
            id,
            url: url.to_string(),
            summary: summary.trim().to_string(),
            atom,
            provenance,
            verdict,
            quote,
            weight,
        });
        Ok(id)
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn evidence_by_id(&self, id: EvidenceId) -> Option<&Evidence> {
        self.evidence.get(id.0 as usize)
    }

    pub fn evidence_for(&self, atom: AtomId) -> impl Iterator<Item = &Evidence> {
        self.evidence.iter().filter(move |e| e.atom == Some(atom))
    }

    /// Verification evidence with the given verdict for a claim.
    pub fn verified_as(&self, atom: AtomId, verdict: Verdict) -> Vec<&Evidence> {
        self.evidence_for(atom)
            .filter(|e| e.provenance == Provenance::VerificationTool && e.verdict == Some(verdict))
            .collect()
    }

    // -- Priors --

    pub fn add_prior(&mut self, prior: PriorReply) {
        let known = self
            .priors
            .iter()
            .any(|p| p.article_id == prior.article_id && p.reply_id == prior.reply_id);
        if !known {
            self.priors.push(prior);
        }
    }

    pub fn priors(&self) -> &[PriorReply] {
        &self.priors
    }

    // -- Review history (append-only) --

    pub fn push_verdict(&mut self, verdict: ReviewerVerdict) {
        self.verdicts.push(verdict);
    }

    pub fn verdicts(&self) -> &[ReviewerVerdict] {
        &self.verdicts
    }

    // -- Context and audit --

    pub fn note(&mut self, source: NoteSource, text: impl Into<String>) {
        let text = text.into();
        if !text.trim().is_empty() {
            self.notes.push(ContextNote {
                source,
                text: text.trim().to_string(),
            });
        }
    }

    pub fn notes(&self) -> &[ContextNote] {
        &self.notes
    }

    pub fn record_call(&mut self, record: ToolCallRecord) {
        self.calls.push(record);
    }

    pub fn calls(&self) -> &[ToolCallRecord] {
        &self.calls
    }

    pub fn enter(&mut self, phase: Phase) {
        self.trail.push(phase);
    }

    /// State transitions taken so far, in order.
    pub fn trail(&self) -> &[Phase] {
        &self.trail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_with_claim() -> (Case, AtomId) {
        let mut case = Case::new(CaseId::adhoc("msg"), None, "The subsidy is NT$20,000.");
        let ids = case.add_atoms(vec![ProposedClaim::factual("The subsidy is NT$20,000.")]);
        (case, ids[0])
    }

    fn verification(url: &str, claim: &str, verdict: Verdict) -> Verification {
        Verification {
            url: url.into(),
            claim: Some(claim.into()),
            content_summary: "Subsidy page".into(),
            verdict,
            quote: None,
        }
    }

    #[test]
    fn adhoc_ids_are_fixed_fnv_hashes() {
        assert_eq!(CaseId::adhoc("").as_str(), "text:cbf29ce484222325");
        assert_eq!(CaseId::adhoc("a").as_str(), "text:af63dc4c8601ec8c");
        assert_eq!(CaseId::adhoc("  a \n"), CaseId::adhoc("a"));
        assert_ne!(CaseId::adhoc("a"), CaseId::adhoc("b"));
    }

    #[test]
    fn untraced_url_is_rejected() {
        let (mut case, atom) = case_with_claim();
        let err = case
            .record_evidence("https://made.up/page", "x", Some(atom), Provenance::SearchResult, 1.0)
            .unwrap_err();
        assert!(matches!(err, CaseError::UntracedUrl { .. }));
        assert!(case.evidence().is_empty());
    }

    #[test]
    fn verification_moves_status_forward() {
        let (mut case, atom) = case_with_claim();
        assert_eq!(case.atom(atom).unwrap().status(), VerificationStatus::Unchecked);

        case.trace_url("https://gov.example/subsidy");
        case.record_verification(
            atom,
            &verification("https://gov.example/subsidy", "The subsidy is NT$20,000.", Verdict::Unclear),
        )
        .unwrap();
        assert_eq!(case.atom(atom).unwrap().status(), VerificationStatus::Unclear);

        case.record_verification(
            atom,
            &verification("https://gov.example/subsidy", "The subsidy is NT$20,000.", Verdict::NotSupported),
        )
        .unwrap();
        assert_eq!(case.atom(atom).unwrap().status(), VerificationStatus::NotSupported);
        assert_eq!(case.verified_as(atom, Verdict::NotSupported).len(), 1);
    }

    #[test]
    fn contradicting_verdicts_leave_claim_unclear() {
        let status = VerificationStatus::from_verdicts(&[Verdict::Supported, Verdict::NotSupported]);
        assert_eq!(status, VerificationStatus::Unclear);
        assert_eq!(
            VerificationStatus::from_verdicts(&[Verdict::Unclear, Verdict::PartiallySupported]),
            VerificationStatus::PartiallySupported
        );
    }

    #[test]
    fn downgrade_never_returns_to_unchecked() {
        let (mut case, atom) = case_with_claim();
        case.trace_url("https://gov.example/subsidy");
        case.record_verification(
            atom,
            &verification("https://gov.example/subsidy", "The subsidy is NT$20,000.", Verdict::NotSupported),
        )
        .unwrap();
        case.downgrade(atom).unwrap();
        assert_eq!(case.atom(atom).unwrap().status(), VerificationStatus::Unclear);
    }

    #[test]
    fn verification_for_another_claim_is_rejected() {
        let (mut case, atom) = case_with_claim();
        case.trace_url("https://gov.example/subsidy");
        let err = case
            .record_verification(
                atom,
                &verification("https://gov.example/subsidy", "Something else", Verdict::Supported),
            )
            .unwrap_err();
        assert!(matches!(err, CaseError::ClaimMismatch { .. }));
    }

    #[test]
    fn duplicate_claims_and_evidence_are_collapsed() {
        let (mut case, atom) = case_with_claim();
        assert!(case
            .add_atoms(vec![ProposedClaim::factual("The subsidy is NT$20,000.")])
            .is_empty());

        case.trace_url("https://news.example/a");
        let a = case
            .record_evidence("https://news.example/a", "A", Some(atom), Provenance::SearchResult, 1.0)
            .unwrap();
        let b = case
            .record_evidence("https://news.example/a", "A again", Some(atom), Provenance::SearchResult, 1.0)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(case.evidence().len(), 1);
    }

    #[test]
    fn adhoc_ids_are_stable_for_identical_text() {
        assert_eq!(CaseId::adhoc(" hello "), CaseId::adhoc("hello"));
        assert_ne!(CaseId::adhoc("hello"), CaseId::adhoc("world"));
        assert_eq!(CaseId::article("abc").as_str(), "article:abc");
    }

    #[test]
    fn verification_evidence_outranks_search_synthesis() {
        let (mut case, atom) = case_with_claim();
        case.trace_url("https://gov.example/subsidy");
        case.trace_url("https://blog.example/post");
        let v = case
            .record_verification(
                atom,
                &verification("https://gov.example/subsidy", "The subsidy is NT$20,000.", Verdict::NotSupported),
            )
            .unwrap();
        let s = case
            .record_evidence("https://blog.example/post", "blog", Some(atom), Provenance::SearchResult, 1.0)
            .unwrap();
        let rank = |id| case.evidence_by_id(id).unwrap().rank();
        assert!(rank(v) > rank(s));
    }
}
