//! End-to-end runs of the case state machine against scripted collaborators.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use factdesk::archive::JsonArchive;
use factdesk::cancel::CancelToken;
use factdesk::case::{CallStatus, NoteSource, ProposedClaim, VerificationStatus};
use factdesk::draft::{Classification, find_url};
use factdesk::knowledge::ReplyType;
use factdesk::orchestrator::{
    Brief, CaseInput, Finalized, Orchestrator, OrchestratorError, Outcome, Phase, ReplyWriter,
};
use factdesk::review::{Reviewer, ReviewerVerdict, ViewpointProfile};
use factdesk::tools::{ToolOutcome, Verdict};

use common::*;

const SUBSIDY_TEXT: &str = "Breaking! The government gives every household NT$20,000 starting \
next month. Register now at https://scam.example/claim before the quota runs out. This is the \
best policy in years.";

const FALSE_AMOUNT: &str = "The government gives every household NT$20,000 starting next month.";

fn subsidy_claims() -> Vec<ProposedClaim> {
    vec![
        ProposedClaim::factual(FALSE_AMOUNT),
        ProposedClaim::opinion("This is the best policy in years."),
    ]
}

fn refuting_verifier() -> Arc<ScriptedVerifier> {
    Arc::new(ScriptedVerifier::new().page(
        SUBSIDY_PAGE,
        Verdict::NotSupported,
        Some("NT$10,000 per household"),
    ))
}

fn finalized(outcome: Outcome) -> Finalized {
    match outcome {
        Outcome::Final(done) => done,
        Outcome::AwaitingInput(waiting) => panic!("case suspended: {}", waiting.prompt),
    }
}

#[test]
fn refuted_subsidy_claim_becomes_misinformation() {
    let store = CountingStore::new(vec![article("subsidy1", SUBSIDY_TEXT, 10, 0)]);
    let research = Arc::new(ScriptedResearch::new().answer("NT$20,000", vec![SUBSIDY_PAGE]));
    let reviewer = ScriptedReviewer::new("elder", &["Is the amount right?"], Resolve::All);
    let collab = collaborators(
        store,
        research,
        refuting_verifier(),
        subsidy_claims(),
        vec![reviewer.clone() as Arc<dyn Reviewer>],
    );
    let desk = Orchestrator::new(fast_config(), collab);

    let done = finalized(
        desk.process(CaseInput::reference("https://cofacts.tw/article/subsidy1"))
            .unwrap(),
    );

    assert_eq!(done.case.article_id.as_deref(), Some("subsidy1"));
    assert_eq!(done.draft.classification(), Classification::Misinformation);
    assert!(!done.draft.text().contains("http"), "narrative must not carry URLs");

    let refs = done.draft.references();
    assert!(!refs.is_empty());
    let subsidy = refs
        .iter()
        .find(|r| r.url == SUBSIDY_PAGE)
        .expect("refuting page is cited");
    assert!(subsidy.note.starts_with("NOT_SUPPORTED"));
    assert!(subsidy.note.contains("NT$10,000 per household"));
    assert!(refs.iter().all(|r| !r.url.contains("scam.example")));

    assert_eq!(
        done.case.trail(),
        &[
            Phase::Intake,
            Phase::Triage,
            Phase::FullPass,
            Phase::Compose,
            Phase::Review,
            Phase::ReviseOrFinalize,
            Phase::Final,
        ]
    );
    assert!(done.residual_questions.is_empty());
    assert_eq!(reviewer.critiques.load(Ordering::SeqCst), 1);

    let amount = done.draft.claims().iter().find(|c| c.text == FALSE_AMOUNT).unwrap();
    assert_eq!(amount.status, VerificationStatus::NotSupported);
    assert!(done.case.calls().iter().any(|c| c.tool == "verify" && c.status == CallStatus::Ok));
}

#[test]
fn missing_reference_prompts_without_calling_anything() {
    let store = CountingStore::new(Vec::new());
    let research = Arc::new(ScriptedResearch::new());
    let collab = collaborators(
        store.clone(),
        research.clone(),
        Arc::new(ScriptedVerifier::new()),
        Vec::new(),
        Vec::new(),
    );
    let desk = Orchestrator::new(fast_config(), collab);

    for input in [
        CaseInput::default(),
        CaseInput::text("   "),
        CaseInput::reference("not a reference/at all"),
    ] {
        let err = desk.process(input).unwrap_err();
        let OrchestratorError::MissingReference { prompt } = err else {
            panic!("expected a prompt for the message, got {err}");
        };
        assert!(prompt.contains("cofacts.tw/article"));
    }
    assert_eq!(store.calls(), 0);
    assert_eq!(research.calls(), 0);
}

#[test]
fn research_timeout_leaves_claims_unclear() {
    let research = Arc::new(
        ScriptedResearch::new()
            .answer("NT$20,000", vec![SUBSIDY_PAGE])
            .slow(Duration::from_millis(600)),
    );
    let verifier = refuting_verifier();
    let collab = collaborators(
        CountingStore::new(Vec::new()),
        research,
        verifier.clone(),
        vec![ProposedClaim::factual(FALSE_AMOUNT)],
        Vec::new(),
    );
    let mut config = fast_config();
    config.research_timeout = Duration::from_millis(100);
    let desk = Orchestrator::new(config, collab);

    let done = finalized(desk.process(CaseInput::text(SUBSIDY_TEXT)).unwrap());

    assert_eq!(done.draft.classification(), Classification::Opinionated);
    assert!(done.draft.references().is_empty());
    assert_eq!(done.draft.claims()[0].status, VerificationStatus::Unclear);
    assert_eq!(done.case.atoms()[0].status(), VerificationStatus::Unchecked);
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    assert!(done.case.calls().iter().any(|c| {
        c.tool == "research" && matches!(&c.status, CallStatus::Failed { reason } if reason.contains("timed out"))
    }));
}

#[test]
fn every_re_review_partitions_the_open_questions() {
    let research = Arc::new(ScriptedResearch::new().answer("NT$20,000", vec![SUBSIDY_PAGE]));
    let reviewer = ScriptedReviewer::new(
        "youth",
        &["Who announced this?", "When does it start?", "Is there a deadline?"],
        Resolve::One,
    );
    let collab = collaborators(
        CountingStore::new(Vec::new()),
        research,
        refuting_verifier(),
        subsidy_claims(),
        vec![reviewer as Arc<dyn Reviewer>],
    );
    let desk = Orchestrator::new(fast_config(), collab);

    let done = finalized(desk.process(CaseInput::text(SUBSIDY_TEXT)).unwrap());

    let mut open: Vec<String> = Vec::new();
    let mut re_reviews = 0;
    for verdict in done.case.verdicts() {
        match verdict {
            ReviewerVerdict::Critique { questions, .. } => open = questions.clone(),
            ReviewerVerdict::ReReview {
                resolved, unresolved, ..
            } => {
                re_reviews += 1;
                let mut answered: Vec<String> = resolved.iter().chain(unresolved).cloned().collect();
                answered.sort();
                let mut expected = open.clone();
                expected.sort();
                assert_eq!(answered, expected);
                assert!(resolved.iter().all(|q| !unresolved.contains(q)));
                open = unresolved.clone();
            }
            ReviewerVerdict::Failed { reason, .. } => panic!("unexpected failure: {reason}"),
        }
    }
    assert_eq!(re_reviews, 3);
    assert!(open.is_empty());
    assert!(done.residual_questions.is_empty());
}

#[test]
fn revise_bound_finalizes_with_residual_questions() {
    let research = Arc::new(ScriptedResearch::new().answer("NT$20,000", vec![SUBSIDY_PAGE]));
    let reviewer = ScriptedReviewer::new("skeptic", &["Who paid for this message?"], Resolve::None);
    let collab = collaborators(
        CountingStore::new(Vec::new()),
        research.clone(),
        refuting_verifier(),
        subsidy_claims(),
        vec![reviewer.clone() as Arc<dyn Reviewer>],
    );
    let desk = Orchestrator::new(fast_config(), collab);

    let done = finalized(desk.process(CaseInput::text(SUBSIDY_TEXT)).unwrap());

    assert_eq!(done.draft.classification(), Classification::Misinformation);
    assert_eq!(
        done.residual_questions.get("skeptic"),
        Some(&vec!["Who paid for this message?".to_string()])
    );
    assert_eq!(reviewer.critiques.load(Ordering::SeqCst), 1);
    assert_eq!(reviewer.re_reviews.load(Ordering::SeqCst), 4);
    assert_eq!(done.draft.round(), 3);

    let reviewer_notes = done
        .case
        .notes()
        .iter()
        .filter(|n| matches!(&n.source, NoteSource::Reviewer { reviewer } if reviewer == "skeptic"))
        .count();
    assert_eq!(reviewer_notes, 1);
    // The question is researched once, not once per round.
    let asked = research
        .queries
        .lock()
        .unwrap()
        .iter()
        .filter(|q| q.as_str() == "Who paid for this message?")
        .count();
    assert_eq!(asked, 1);
}

/// A writer that always slips a link into its text.
#[derive(Default)]
struct LinkingWriter {
    calls: AtomicUsize,
}

impl ReplyWriter for LinkingWriter {
    fn write(&self, _brief: &Brief) -> ToolOutcome<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("This is false. Details at https://gov.example/subsidy".into())
    }
}

#[test]
fn writer_text_with_a_url_falls_back_to_the_template() {
    let research = Arc::new(ScriptedResearch::new().answer("NT$20,000", vec![SUBSIDY_PAGE]));
    let writer = Arc::new(LinkingWriter::default());
    let mut collab = collaborators(
        CountingStore::new(vec![article("subsidy1", SUBSIDY_TEXT, 10, 0)]),
        research,
        refuting_verifier(),
        subsidy_claims(),
        Vec::new(),
    );
    collab.writer = writer.clone();
    let desk = Orchestrator::new(fast_config(), collab);

    let done = finalized(desk.process(CaseInput::reference("subsidy1")).unwrap());

    assert_eq!(done.draft.classification(), Classification::Misinformation);
    assert!(find_url(done.draft.text()).is_none(), "{}", done.draft.text());
    assert!(!done.draft.text().contains("http"));
    assert!(done.draft.text().starts_with("⚠️ This message contains false information."));
    assert!(done.draft.references().iter().any(|r| r.url == SUBSIDY_PAGE));

    assert!(writer.calls.load(Ordering::SeqCst) >= 1);
    let writer_calls: Vec<_> = done.case.calls().iter().filter(|c| c.tool == "writer").collect();
    assert!(!writer_calls.is_empty());
    assert!(writer_calls.iter().any(|c| matches!(
        &c.status,
        CallStatus::Failed { reason } if reason.contains("URL")
    )));
}

#[test]
fn failing_reviewer_does_not_block_the_case() {
    let research = Arc::new(ScriptedResearch::new().answer("NT$20,000", vec![SUBSIDY_PAGE]));
    let broken = Arc::new(BrokenReviewer(ViewpointProfile {
        id: "broken".into(),
        name: "Broken".into(),
        constituency: "nobody".into(),
        values: Vec::new(),
        focus_questions: vec!["Unasked?".into()],
    }));
    let healthy = ScriptedReviewer::new("elder", &["Is the amount right?"], Resolve::All);
    let collab = collaborators(
        CountingStore::new(Vec::new()),
        research,
        refuting_verifier(),
        subsidy_claims(),
        vec![broken as Arc<dyn Reviewer>, healthy as Arc<dyn Reviewer>],
    );
    let desk = Orchestrator::new(fast_config(), collab);

    let done = finalized(desk.process(CaseInput::text(SUBSIDY_TEXT)).unwrap());

    assert_eq!(done.draft.classification(), Classification::Misinformation);
    assert!(done.residual_questions.is_empty());
    assert!(done
        .case
        .verdicts()
        .iter()
        .any(|v| matches!(v, ReviewerVerdict::Failed { reviewer, .. } if reviewer == "broken")));
    assert!(done
        .case
        .calls()
        .iter()
        .any(|c| c.tool == "reviewer:broken" && matches!(c.status, CallStatus::Failed { .. })));
}

#[test]
fn cancellation_abandons_the_case() {
    let dir = tempfile::TempDir::new().unwrap();
    let archive = Arc::new(JsonArchive::new(dir.path().join("cases")));
    let token = CancelToken::new();
    let research = Arc::new(
        ScriptedResearch::new()
            .answer("NT$20,000", vec![SUBSIDY_PAGE])
            .cancelling(token.clone()),
    );
    let collab = collaborators(
        CountingStore::new(Vec::new()),
        research,
        refuting_verifier(),
        subsidy_claims(),
        Vec::new(),
    );
    let desk = Orchestrator::new(fast_config(), collab)
        .with_archive(archive.clone())
        .with_cancel(token);

    let err = desk.process(CaseInput::text(SUBSIDY_TEXT)).unwrap_err();

    assert!(matches!(err, OrchestratorError::Cancelled { .. }), "got {err}");
    assert!(archive.list().unwrap().is_empty());
}

#[test]
fn light_pass_follows_a_well_rated_prior() {
    let quiet = with_reply(
        article("quiet1", SUBSIDY_TEXT, 1, 1),
        ReplyType::Rumor,
        8,
        &format!("Official announcement: {SUBSIDY_PAGE}"),
    );
    let research = Arc::new(ScriptedResearch::new());
    let collab = collaborators(
        CountingStore::new(vec![quiet]),
        research.clone(),
        Arc::new(ScriptedVerifier::new()),
        subsidy_claims(),
        Vec::new(),
    );
    let desk = Orchestrator::new(fast_config(), collab);

    let done = finalized(desk.process(CaseInput::reference("quiet1")).unwrap());

    assert_eq!(done.draft.classification(), Classification::Misinformation);
    assert_eq!(research.calls(), 1);
    assert!(done.case.atoms().is_empty(), "a light pass does not decompose");
    let cited = done.draft.references().iter().find(|r| r.url == SUBSIDY_PAGE).unwrap();
    assert!(cited.note.contains("existing fact-check"));
    assert_eq!(
        done.case.trail(),
        &[
            Phase::Intake,
            Phase::Triage,
            Phase::LightPass,
            Phase::Compose,
            Phase::Review,
            Phase::ReviseOrFinalize,
            Phase::Final,
        ]
    );
}

#[test]
fn light_pass_without_prior_waits_for_the_user() {
    let quiet = article("quiet2", SUBSIDY_TEXT, 1, 1);
    let research = Arc::new(ScriptedResearch::new().answer("NT$20,000", vec![SUBSIDY_PAGE]));
    let collab = collaborators(
        CountingStore::new(vec![quiet]),
        research,
        refuting_verifier(),
        vec![ProposedClaim::factual(FALSE_AMOUNT)],
        Vec::new(),
    );
    let desk = Orchestrator::new(fast_config(), collab);

    let Outcome::AwaitingInput(waiting) = desk.process(CaseInput::reference("quiet2")).unwrap() else {
        panic!("a case with nothing to go on should wait");
    };
    assert_eq!(waiting.case.trail().last(), Some(&Phase::AwaitUserInput));
    assert!(waiting.prompt.contains("\"go\""));

    let done = finalized(desk.resume(waiting, "It was forwarded in a LINE group.").unwrap());

    assert_eq!(done.draft.classification(), Classification::Misinformation);
    assert!(done.case.trail().contains(&Phase::AwaitUserInput));
    assert_eq!(done.case.trail().last(), Some(&Phase::Final));
    assert!(done
        .case
        .notes()
        .iter()
        .any(|n| n.source == NoteSource::User && n.text == "It was forwarded in a LINE group."));
}
