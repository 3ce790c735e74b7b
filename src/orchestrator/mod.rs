//! The case state machine.
//!
//! [`Orchestrator::process`] walks one case through
//! `INTAKE → TRIAGE → LIGHT_PASS | FULL_PASS → COMPOSE → REVIEW →
//! REVISE_OR_FINALIZE → … → FINAL`. Every collaborator call runs under a
//! deadline and lands in the case's audit trail; a failed call is recorded
//! and treated as absence of evidence. A case with nothing to go on after
//! the light pass suspends in `AWAIT_USER_INPUT` and continues with
//! [`Orchestrator::resume`].

pub mod compose;
pub mod decompose;
pub mod phase;
pub mod triage;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::{ArchiveError, CaseArchive};
use crate::cancel::CancelToken;
use crate::case::{AtomId, Case, CaseId, NoteSource, ProposedClaim, Provenance, ToolCallRecord};
use crate::config::{DeskConfig, OrchestratorSettings};
use crate::draft::{ContractViolation, Draft};
use crate::knowledge::{Article, ArticleQuery, KnowledgeError, KnowledgeStore, parse_reference};
use crate::review::{ReviewPanel, Reviewer, ReviewerVerdict, open_questions, question_key};
use crate::tools::{
    Findings, ResearchTool, SourceLink, ToolOutcome, Verification, VerificationTool, run_with_deadline,
};

pub use compose::{Brief, LlmWriter, ReplyWriter, TemplateWriter};
pub use decompose::{Decomposer, LlmDecomposer, SentenceDecomposer};
pub use phase::Phase;
pub use triage::Route;

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error("no message to check: {prompt}")]
    #[diagnostic(
        code(factdesk::orchestrator::missing_reference),
        help("Pass a Cofacts article id or URL, or the message text itself.")
    )]
    MissingReference { prompt: String },

    #[error("insufficient evidence to compose a reply: {reason}")]
    #[diagnostic(
        code(factdesk::orchestrator::insufficient_evidence),
        help("Gather more sources for the disputed claims, or treat them as unclear.")
    )]
    InsufficientEvidence { reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Contract(#[from] ContractViolation),

    #[error("case {case} was cancelled")]
    #[diagnostic(code(factdesk::orchestrator::cancelled))]
    Cancelled { case: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Archive(#[from] ArchiveError),
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

const MISSING_REFERENCE_PROMPT: &str = "Which message should I check? Send a Cofacts article id \
or link (https://cofacts.tw/article/...), or paste the message text.";

const AWAIT_INPUT_PROMPT: &str = "No existing fact-check settles this message yet. Tell me \
anything you know about it (where it came from, which part worries you), or reply \"go\" to \
start a full investigation.";

/// Reviewer questions researched per revise round.
const MAX_QUESTION_SEARCHES: usize = 5;

/// Sources kept per researched question.
const SOURCES_PER_QUESTION: usize = 2;

// ── Configuration and collaborators ─────────────────────────────────────

/// Policy and deadlines the orchestrator runs with.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub settings: OrchestratorSettings,
    pub research_timeout: Duration,
    pub verify_timeout: Duration,
    pub review_timeout: Duration,
    pub knowledge_timeout: Duration,
    pub compose_timeout: Duration,
}

impl From<&DeskConfig> for OrchestratorConfig {
    fn from(config: &DeskConfig) -> Self {
        let t = &config.timeouts;
        Self {
            settings: config.orchestrator.clone(),
            research_timeout: Duration::from_secs(t.research),
            verify_timeout: Duration::from_secs(t.verify),
            review_timeout: Duration::from_secs(t.review),
            knowledge_timeout: Duration::from_secs(t.knowledge),
            compose_timeout: Duration::from_secs(t.compose),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        (&DeskConfig::default()).into()
    }
}

/// Everything the orchestrator delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub research: Arc<dyn ResearchTool>,
    pub verifier: Arc<dyn VerificationTool>,
    pub reviewers: Vec<Arc<dyn Reviewer>>,
    pub decomposer: Arc<dyn Decomposer>,
    pub writer: Arc<dyn ReplyWriter>,
}

// ── Inputs and outcomes ─────────────────────────────────────────────────

/// What a case starts from: an article reference, raw text, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseInput {
    pub reference: Option<String>,
    pub text: Option<String>,
    /// Extra context from the user, appended to the case as notes.
    pub context: Vec<String>,
}

impl CaseInput {
    pub fn reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, note: impl Into<String>) -> Self {
        self.context.push(note.into());
        self
    }
}

/// A finished case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finalized {
    pub case: Case,
    pub draft: Draft,
    /// Questions reviewers still consider open, acknowledged as residual.
    pub residual_questions: BTreeMap<String, Vec<String>>,
}

/// A case waiting for the user's next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspended {
    pub case: Case,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Final(Finalized),
    AwaitingInput(Suspended),
}

// ── Orchestrator ────────────────────────────────────────────────────────

/// Mutable state of one run through the state machine.
struct Run {
    case: Case,
    /// Knowledge-store urgency; `None` for cases without an article.
    urgency: Option<f64>,
    decomposed: bool,
    full_pass_done: bool,
    /// Revise loops taken so far.
    revisions: u32,
    draft: Option<Draft>,
    researched_questions: HashSet<String>,
}

impl Run {
    fn new(case: Case, urgency: Option<f64>) -> Self {
        Self {
            case,
            urgency,
            decomposed: false,
            full_pass_done: false,
            revisions: 0,
            draft: None,
            researched_questions: HashSet::new(),
        }
    }
}

/// What one claim's investigation returned, before it is merged.
struct ClaimWork {
    atom: AtomId,
    claim: String,
    research: ToolOutcome<Findings>,
    verifications: Vec<(String, ToolOutcome<Verification>)>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    collab: Collaborators,
    panel: ReviewPanel,
    archive: Option<Arc<dyn CaseArchive>>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, collab: Collaborators) -> Self {
        let panel = ReviewPanel::new(collab.reviewers.clone(), config.review_timeout);
        Self {
            config,
            collab,
            panel,
            archive: None,
            cancel: CancelToken::new(),
        }
    }

    /// Archive every finalized case.
    pub fn with_archive(mut self, archive: Arc<dyn CaseArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Share a cancellation flag. A cancelled orchestrator stays cancelled.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run a new case until it finalizes or needs the user.
    pub fn process(&self, input: CaseInput) -> OrchestratorResult<Outcome> {
        let run = self.intake(input)?;
        self.drive(run, Phase::Triage)
    }

    /// Continue a suspended case with the user's next turn.
    pub fn resume(&self, suspended: Suspended, user_turn: &str) -> OrchestratorResult<Outcome> {
        let mut case = suspended.case;
        let turn = user_turn.trim();
        if !turn.eq_ignore_ascii_case("go") {
            case.note(NoteSource::User, turn);
        }
        tracing::debug!(case = %case.id, "resuming suspended case");
        self.drive(Run::new(case, None), Phase::FullPass)
    }

    fn check_cancel(&self, case: &Case) -> OrchestratorResult<()> {
        if self.cancel.is_cancelled() {
            tracing::info!(case = %case.id, "case abandoned");
            return Err(OrchestratorError::Cancelled {
                case: case.id.to_string(),
            });
        }
        Ok(())
    }

    fn drive(&self, mut run: Run, mut phase: Phase) -> OrchestratorResult<Outcome> {
        loop {
            self.check_cancel(&run.case)?;
            run.case.enter(phase);
            tracing::debug!(case = %run.case.id, %phase, revisions = run.revisions, "transition");
            phase = match phase {
                Phase::Intake | Phase::Triage => self.triage(&mut run),
                Phase::LightPass => self.light_pass(&mut run),
                Phase::FullPass => self.full_pass(&mut run),
                Phase::Compose => self.compose(&mut run)?,
                Phase::Review => self.review(&mut run),
                Phase::ReviseOrFinalize => self.revise_or_finalize(&mut run),
                Phase::AwaitUserInput => {
                    tracing::info!(case = %run.case.id, "awaiting user input");
                    return Ok(Outcome::AwaitingInput(Suspended {
                        case: run.case,
                        prompt: AWAIT_INPUT_PROMPT.to_string(),
                    }));
                }
                Phase::Final => return self.finalize(run),
            };
        }
    }

    // ── INTAKE ──────────────────────────────────────────────────────────

    fn intake(&self, input: CaseInput) -> OrchestratorResult<Run> {
        let reference = input.reference.as_deref().and_then(parse_reference);
        let text = input
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        if reference.is_none() && text.is_none() {
            return Err(OrchestratorError::MissingReference {
                prompt: MISSING_REFERENCE_PROMPT.to_string(),
            });
        }
        self.check_cancel_id(reference.as_deref().or(text.as_deref()).unwrap_or_default())?;

        let mut run = match (reference, text) {
            (Some(id), text) => match self.fetch_article(&id) {
                Ok(article) => {
                    let message = if article.text.trim().is_empty() {
                        text.unwrap_or_default()
                    } else {
                        article.text.clone()
                    };
                    let mut case = Case::new(CaseId::article(&id), Some(id.clone()), message);
                    case.enter(Phase::Intake);
                    case.record_call(ToolCallRecord::ok("knowledge.get_by_id", &id, Vec::new()));
                    setup_from_article(&mut case, &article);
                    Run::new(case, Some(triage::urgency(&article)))
                }
                Err(e) => match text {
                    Some(text) => {
                        tracing::warn!(article = %id, error = %e, "article lookup failed, checking the text alone");
                        let mut case = Case::new(CaseId::adhoc(&text), None, text);
                        case.enter(Phase::Intake);
                        case.record_call(ToolCallRecord::failed("knowledge.get_by_id", &id, e.to_string()));
                        Run::new(case, None)
                    }
                    None => return Err(e.into()),
                },
            },
            (None, text) => {
                let text = text.unwrap_or_default();
                let mut case = Case::new(CaseId::adhoc(&text), None, text);
                case.enter(Phase::Intake);
                Run::new(case, None)
            }
        };

        if run.case.message.trim().is_empty() {
            return Err(OrchestratorError::MissingReference {
                prompt: "That article has no text I can check. Paste the message text instead.".into(),
            });
        }
        for note in input.context {
            run.case.note(NoteSource::User, note);
        }
        Ok(run)
    }

    fn check_cancel_id(&self, id: &str) -> OrchestratorResult<()> {
        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled { case: id.to_string() });
        }
        Ok(())
    }

    fn fetch_article(&self, id: &str) -> Result<Article, KnowledgeError> {
        let store = Arc::clone(&self.collab.knowledge);
        let owned = id.to_string();
        run_with_deadline("knowledge", self.config.knowledge_timeout, &self.cancel, move || {
            Ok(store.get_by_id(&owned))
        })
        .map_err(|failure| KnowledgeError::RequestFailed {
            message: failure.to_string(),
        })?
    }

    // ── TRIAGE ──────────────────────────────────────────────────────────

    fn triage(&self, run: &mut Run) -> Phase {
        let limit = self.config.settings.similar_articles;
        if limit > 0 {
            let store = Arc::clone(&self.collab.knowledge);
            let query = ArticleQuery::similar_to(&run.case.message).limit(limit);
            let outcome = run_with_deadline("knowledge", self.config.knowledge_timeout, &self.cancel, move || {
                Ok(store.search(&query))
            });
            let input = clip(&run.case.message, 80);
            match outcome {
                Ok(Ok(page)) => {
                    run.case.record_call(ToolCallRecord::ok("knowledge.search", input, Vec::new()));
                    let own = run.case.article_id.clone();
                    let mut priors = 0;
                    for edge in page.edges.iter().filter(|e| Some(&e.node.id) != own.as_ref()) {
                        priors += triage::record_priors(&mut run.case, &edge.node);
                    }
                    tracing::debug!(case = %run.case.id, similar = page.edges.len(), priors, "similar articles");
                }
                Ok(Err(e)) => {
                    tracing::warn!(case = %run.case.id, error = %e, "similar-article search failed");
                    run.case.record_call(ToolCallRecord::failed("knowledge.search", input, e.to_string()));
                }
                Err(failure) => {
                    tracing::warn!(case = %run.case.id, %failure, "similar-article search failed");
                    run.case.record_call(ToolCallRecord::failed("knowledge.search", input, failure.to_string()));
                }
            }
        }

        let route = triage::route(run.urgency, self.config.settings.urgency_threshold);
        tracing::debug!(case = %run.case.id, urgency = ?run.urgency, ?route, "triaged");
        match route {
            Route::Light => Phase::LightPass,
            Route::Full => Phase::FullPass,
        }
    }

    // ── LIGHT_PASS ──────────────────────────────────────────────────────

    fn light_pass(&self, run: &mut Run) -> Phase {
        let query = clip(&run.case.message, 300);
        let outcome = self.research(&query);
        if let Ok(findings) = &outcome {
            for source in &findings.sources {
                run.case.trace_url(&source.url);
                record_source(&mut run.case, source, &findings.findings_summary, None);
            }
        }
        record_research(&mut run.case, &query, &outcome);

        if triage::usable_prior(&run.case, self.config.settings.prior_min_ratio).is_some() {
            Phase::Compose
        } else {
            Phase::AwaitUserInput
        }
    }

    // ── FULL_PASS ───────────────────────────────────────────────────────

    fn full_pass(&self, run: &mut Run) -> Phase {
        if !run.decomposed {
            self.decompose(&mut run.case);
            run.decomposed = true;
        }
        self.investigate_claims(&mut run.case);
        if run.revisions > 0 {
            self.research_questions(run);
        }
        self.collect_critiques(&mut run.case);
        run.full_pass_done = true;
        Phase::Compose
    }

    fn decompose(&self, case: &mut Case) {
        let decomposer = Arc::clone(&self.collab.decomposer);
        let message = case.message.clone();
        let outcome = run_with_deadline("decompose", self.config.compose_timeout, &self.cancel, move || {
            decomposer.decompose(&message)
        });
        let input = clip(&case.message, 80);
        let claims = match outcome {
            Ok(claims) if claims.iter().any(|c| !c.text.trim().is_empty()) => {
                case.record_call(ToolCallRecord::ok("decompose", input, Vec::new()));
                claims
            }
            other => {
                let reason = match other {
                    Err(failure) => failure.to_string(),
                    Ok(_) => "no claims returned".to_string(),
                };
                tracing::warn!(case = %case.id, %reason, "decomposition failed, splitting sentences");
                case.record_call(ToolCallRecord::failed("decompose", input, reason));
                SentenceDecomposer.decompose(&case.message).unwrap_or_default()
            }
        };
        let mut added = case.add_atoms(claims);
        if added.is_empty() && case.atoms().is_empty() {
            let whole = ProposedClaim::factual(case.message.clone());
            added = case.add_atoms(vec![whole]);
        }
        tracing::debug!(case = %case.id, claims = added.len(), "decomposed");
    }

    /// Research and verify every factual claim no verification has reached.
    ///
    /// Claims run in parallel; the calls for one claim run in order. Results
    /// are merged into the case afterwards, one claim at a time.
    fn investigate_claims(&self, case: &mut Case) {
        let jobs: Vec<(AtomId, String)> = case
            .unchecked_factual()
            .into_iter()
            .filter_map(|id| case.atom(id).ok().map(|a| (id, a.text.clone())))
            .collect();
        if jobs.is_empty() {
            return;
        }
        let work: Vec<ClaimWork> = jobs
            .into_par_iter()
            .map(|(atom, claim)| self.investigate(atom, claim))
            .collect();
        for item in work {
            merge_claim_work(case, item);
        }
    }

    fn investigate(&self, atom: AtomId, claim: String) -> ClaimWork {
        let research = self.research(&claim);
        let mut urls: Vec<String> = Vec::new();
        if let Ok(findings) = &research {
            for source in &findings.sources {
                let url = source.url.trim();
                if !url.is_empty() && !urls.iter().any(|u| u == url) {
                    urls.push(url.to_string());
                }
            }
        }
        urls.truncate(self.config.settings.max_urls_per_claim);

        let mut verifications = Vec::with_capacity(urls.len());
        for url in urls {
            if self.cancel.is_cancelled() {
                break;
            }
            let verifier = Arc::clone(&self.collab.verifier);
            let (target, text) = (url.clone(), claim.clone());
            let outcome = run_with_deadline("verify", self.config.verify_timeout, &self.cancel, move || {
                verifier.verify(&target, Some(&text))
            });
            verifications.push((url, outcome));
        }
        ClaimWork {
            atom,
            claim,
            research,
            verifications,
        }
    }

    fn research(&self, query: &str) -> ToolOutcome<Findings> {
        let research = Arc::clone(&self.collab.research);
        let owned = query.to_string();
        run_with_deadline("research", self.config.research_timeout, &self.cancel, move || {
            research.search(&owned)
        })
    }

    /// Research open reviewer questions not looked into yet.
    fn research_questions(&self, run: &mut Run) {
        let mut questions = Vec::new();
        for list in open_questions(run.case.verdicts()).into_values() {
            for question in list {
                if questions.len() < MAX_QUESTION_SEARCHES && run.researched_questions.insert(question_key(&question)) {
                    questions.push(question);
                }
            }
        }
        if questions.is_empty() {
            return;
        }
        let results: Vec<(String, ToolOutcome<Findings>)> = questions
            .into_par_iter()
            .map(|q| {
                let outcome = self.research(&q);
                (q, outcome)
            })
            .collect();
        for (question, outcome) in results {
            if let Ok(findings) = &outcome {
                let summary = compose::question_summary(&question, &findings.findings_summary);
                for source in findings.sources.iter().take(SOURCES_PER_QUESTION) {
                    run.case.trace_url(&source.url);
                    if let Err(e) = run.case.record_evidence(&source.url, &summary, None, Provenance::SearchResult, 1.0) {
                        tracing::warn!(url = %source.url, "could not record question evidence: {e}");
                    }
                }
            }
            record_research(&mut run.case, &question, &outcome);
        }
    }

    /// Round-1 critiques from every reviewer that has not given one yet.
    fn collect_critiques(&self, case: &mut Case) {
        let missing: Vec<String> = self
            .panel
            .ids()
            .into_iter()
            .filter(|id| {
                !case
                    .verdicts()
                    .iter()
                    .any(|v| matches!(v, ReviewerVerdict::Critique { reviewer, .. } if reviewer == id))
            })
            .collect();
        if missing.is_empty() {
            return;
        }
        let verdicts = self.panel.critique_all(&case.message, Some(&missing), 1, &self.cancel);
        record_verdicts(case, verdicts, "critique");
    }

    // ── COMPOSE ─────────────────────────────────────────────────────────

    fn compose(&self, run: &mut Run) -> OrchestratorResult<Phase> {
        let min_ratio = self.config.settings.prior_min_ratio;
        let mut use_priors = true;
        let assessment = loop {
            match compose::assess(&run.case, min_ratio, use_priors) {
                Ok(assessment) => break assessment,
                Err(insufficient) if !run.full_pass_done => {
                    tracing::warn!(case = %run.case.id, reason = %insufficient.reason, "prior not citable, escalating");
                    return Ok(Phase::FullPass);
                }
                Err(insufficient) if !insufficient.atoms.is_empty() => {
                    tracing::warn!(case = %run.case.id, reason = %insufficient.reason, "downgrading unbacked claims");
                    for atom in insufficient.atoms {
                        run.case.downgrade(atom).map_err(|e| OrchestratorError::InsufficientEvidence {
                            reason: e.to_string(),
                        })?;
                    }
                }
                Err(insufficient) if use_priors => {
                    tracing::warn!(case = %run.case.id, reason = %insufficient.reason, "ignoring uncitable prior");
                    use_priors = false;
                }
                Err(insufficient) => {
                    return Err(OrchestratorError::InsufficientEvidence {
                        reason: insufficient.reason,
                    });
                }
            }
        };

        let brief = compose::brief(&run.case, &assessment);
        let writer = Arc::clone(&self.collab.writer);
        let input = brief.clone();
        let outcome = run_with_deadline("writer", self.config.compose_timeout, &self.cancel, move || {
            writer.write(&input)
        });
        self.check_cancel(&run.case)?;
        let label = assessment.classification.to_string();
        let written = match outcome {
            Ok(text) if !text.trim().is_empty() => {
                run.case.record_call(ToolCallRecord::ok("writer", &label, Vec::new()));
                Some(text)
            }
            Ok(_) => {
                run.case.record_call(ToolCallRecord::failed("writer", &label, "empty text"));
                None
            }
            Err(failure) => {
                tracing::warn!(case = %run.case.id, %failure, "writer failed, using the template");
                run.case.record_call(ToolCallRecord::failed("writer", &label, failure.to_string()));
                None
            }
        };

        let draft = match written {
            Some(text) => match compose::build_draft(&run.case, &assessment, &text, run.revisions) {
                Err(ContractViolation::UrlInText { found }) => {
                    tracing::warn!(case = %run.case.id, url = %found, "draft text held a URL, rewriting from the template");
                    run.case.record_call(ToolCallRecord::failed(
                        "writer",
                        &label,
                        format!("text held a URL ({found}), replaced by the template"),
                    ));
                    self.template_draft(&run.case, &brief, &assessment, run.revisions)?
                }
                other => other?,
            },
            None => self.template_draft(&run.case, &brief, &assessment, run.revisions)?,
        };
        tracing::debug!(
            case = %run.case.id,
            classification = %draft.classification(),
            references = draft.references().len(),
            "draft composed"
        );
        run.draft = Some(draft);
        Ok(Phase::Review)
    }

    fn template_draft(
        &self,
        case: &Case,
        brief: &Brief,
        assessment: &compose::Assessment,
        round: u32,
    ) -> OrchestratorResult<Draft> {
        let text = TemplateWriter.write(brief).map_err(|failure| OrchestratorError::InsufficientEvidence {
            reason: failure.to_string(),
        })?;
        Ok(compose::build_draft(case, assessment, &text, round)?)
    }

    // ── REVIEW ──────────────────────────────────────────────────────────

    fn review(&self, run: &mut Run) -> Phase {
        let Some(draft) = &run.draft else {
            return Phase::Compose;
        };
        let open = open_questions(run.case.verdicts());
        let round = 2 + run.revisions;
        let verdicts = self
            .panel
            .re_review_all(&run.case.message, draft, &open, round, &self.cancel);
        record_verdicts(&mut run.case, verdicts, "re_review");
        Phase::ReviseOrFinalize
    }

    // ── REVISE_OR_FINALIZE ──────────────────────────────────────────────

    fn revise_or_finalize(&self, run: &mut Run) -> Phase {
        let open = unresolved(&run.case);
        if open.is_empty() {
            return Phase::Final;
        }
        if run.revisions >= self.config.settings.max_revise_rounds {
            tracing::info!(
                case = %run.case.id,
                reviewers = open.len(),
                "revise bound reached, finalizing with residual questions"
            );
            return Phase::Final;
        }
        run.revisions += 1;
        for (reviewer, questions) in open {
            for question in questions {
                let source = NoteSource::Reviewer {
                    reviewer: reviewer.clone(),
                };
                let known = run
                    .case
                    .notes()
                    .iter()
                    .any(|n| n.source == source && n.text == question.trim());
                if !known {
                    run.case.note(source, question);
                }
            }
        }
        Phase::FullPass
    }

    // ── FINAL ───────────────────────────────────────────────────────────

    fn finalize(&self, run: Run) -> OrchestratorResult<Outcome> {
        let Run { case, draft, .. } = run;
        let Some(draft) = draft else {
            return Err(OrchestratorError::InsufficientEvidence {
                reason: "no draft was composed".into(),
            });
        };
        draft.validate(case.evidence())?;
        self.check_cancel(&case)?;

        let finalized = Finalized {
            residual_questions: unresolved(&case),
            case,
            draft,
        };
        tracing::info!(
            case = %finalized.case.id,
            classification = %finalized.draft.classification(),
            references = finalized.draft.references().len(),
            residual = finalized.residual_questions.values().map(Vec::len).sum::<usize>(),
            "case finalized"
        );
        if let Some(archive) = &self.archive {
            archive.store(&finalized)?;
        }
        Ok(Outcome::Final(finalized))
    }
}

// ── Merging ─────────────────────────────────────────────────────────────

fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn unresolved(case: &Case) -> BTreeMap<String, Vec<String>> {
    open_questions(case.verdicts())
        .into_iter()
        .filter(|(_, questions)| !questions.is_empty())
        .collect()
}

fn setup_from_article(case: &mut Case, article: &Article) {
    case.message_kind = article.article_type.clone();
    for link in &article.hyperlinks {
        case.add_message_link(&link.url);
    }
    for reason in article.additional_context() {
        case.note(NoteSource::User, format!("Reporter context: {reason}"));
    }
    let mut priors = triage::record_priors(case, article);
    for edge in &article.related_articles.edges {
        priors += triage::record_priors(case, &edge.node);
    }
    tracing::debug!(case = %case.id, priors, links = case.message_links().len(), "article loaded");
}

fn record_source(case: &mut Case, source: &SourceLink, fallback: &str, atom: Option<AtomId>) {
    let summary = [source.title.trim(), source.snippet.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(": ");
    let summary = if summary.is_empty() { fallback } else { summary.as_str() };
    if let Err(e) = case.record_evidence(&source.url, summary, atom, Provenance::SearchResult, 1.0) {
        tracing::warn!(url = %source.url, "could not record search evidence: {e}");
    }
}

fn record_research(case: &mut Case, input: &str, outcome: &ToolOutcome<Findings>) {
    match outcome {
        Ok(findings) => case.record_call(ToolCallRecord::ok("research", input, findings.queries_used.clone())),
        Err(failure) => {
            tracing::warn!(case = %case.id, %failure, "research returned no evidence");
            case.record_call(ToolCallRecord::failed("research", input, failure.to_string()));
        }
    }
}

fn record_verdicts(case: &mut Case, verdicts: Vec<ReviewerVerdict>, action: &str) {
    for verdict in verdicts {
        let tool = format!("reviewer:{}", verdict.reviewer());
        match &verdict {
            ReviewerVerdict::Failed { reason, .. } => case.record_call(ToolCallRecord::failed(tool, action, reason.clone())),
            _ => case.record_call(ToolCallRecord::ok(tool, action, Vec::new())),
        }
        case.push_verdict(verdict);
    }
}

fn merge_claim_work(case: &mut Case, work: ClaimWork) {
    let ClaimWork {
        atom,
        claim,
        research,
        verifications,
    } = work;
    if let Ok(findings) = &research {
        for source in &findings.sources {
            case.trace_url(&source.url);
            record_source(case, source, &findings.findings_summary, Some(atom));
        }
    }
    record_research(case, &claim, &research);

    for (url, outcome) in verifications {
        match outcome {
            Ok(verification) if verification.url.trim() != url => {
                tracing::warn!(requested = %url, returned = %verification.url, "verification answered for another URL");
                case.record_call(ToolCallRecord::failed(
                    "verify",
                    &url,
                    format!("result is for {}", verification.url),
                ));
            }
            Ok(verification) => {
                case.record_call(ToolCallRecord::ok("verify", &url, Vec::new()));
                match case.record_verification(atom, &verification) {
                    Ok(_) => tracing::debug!(%atom, url = %url, verdict = %verification.verdict, "verified"),
                    Err(e) => tracing::warn!(%atom, url = %url, "verification not attached: {e}"),
                }
            }
            Err(failure) => {
                tracing::warn!(%atom, url = %url, %failure, "verification failed");
                case.record_call(ToolCallRecord::failed("verify", &url, failure.to_string()));
            }
        }
    }
}
