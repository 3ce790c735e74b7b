//! Scripted collaborators for driving the orchestrator end to end.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use factdesk::cancel::CancelToken;
use factdesk::case::ProposedClaim;
use factdesk::draft::Draft;
use factdesk::knowledge::{
    Article, ArticlePage, ArticleQuery, ArticleReply, InMemoryStore, KnowledgeResult, KnowledgeStore,
    Reply, ReplyType,
};
use factdesk::orchestrator::{Collaborators, Decomposer, OrchestratorConfig, TemplateWriter};
use factdesk::review::{Critique, ReReview, Reviewer, ViewpointProfile};
use factdesk::tools::{
    Findings, ResearchTool, SourceLink, ToolFailure, ToolOutcome, Verdict, Verification,
    VerificationTool,
};

pub const SUBSIDY_PAGE: &str = "https://gov.example/subsidy";

// ── Knowledge store ─────────────────────────────────────────────────────

/// Counts every call before delegating to an in-memory store.
pub struct CountingStore {
    inner: InMemoryStore,
    pub calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(articles: Vec<Article>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStore::new(articles),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KnowledgeStore for CountingStore {
    fn search(&self, query: &ArticleQuery) -> KnowledgeResult<ArticlePage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query)
    }

    fn get_by_id(&self, id: &str) -> KnowledgeResult<Article> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_id(id)
    }
}

pub fn article(id: &str, text: &str, requests: u32, replies: u32) -> Article {
    let mut a = Article::new(id, text);
    a.reply_request_count = requests;
    a.reply_count = replies;
    a
}

pub fn with_reply(mut a: Article, reply_type: ReplyType, helpful: u32, reference: &str) -> Article {
    a.article_replies.push(ArticleReply {
        reply: Some(Reply {
            id: format!("{}-r{}", a.id, a.article_replies.len()),
            reply_type,
            text: "This amount was never announced. The real subsidy is NT$10,000.".into(),
            reference: Some(reference.into()),
        }),
        positive_feedback_count: helpful,
        negative_feedback_count: 0,
    });
    a
}

// ── Research ────────────────────────────────────────────────────────────

/// Answers queries by substring, optionally after a delay.
#[derive(Default)]
pub struct ScriptedResearch {
    answers: Vec<(String, Vec<&'static str>)>,
    delay: Option<Duration>,
    cancel_on_call: Option<CancelToken>,
    pub queries: Mutex<Vec<String>>,
}

impl ScriptedResearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries containing `needle` return these source URLs.
    pub fn answer(mut self, needle: &str, urls: Vec<&'static str>) -> Self {
        self.answers.push((needle.to_string(), urls));
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancel `token` as soon as the first query arrives.
    pub fn cancelling(mut self, token: CancelToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl ResearchTool for ScriptedResearch {
    fn search(&self, query: &str) -> ToolOutcome<Findings> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let urls = self
            .answers
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, urls)| urls.clone())
            .unwrap_or_default();
        Ok(Findings {
            findings_summary: if urls.is_empty() {
                "Nothing relevant found.".into()
            } else {
                "Official sources give a different amount.".into()
            },
            queries_used: vec![format!("{query} site:gov.example")],
            sources: urls
                .into_iter()
                .map(|url| SourceLink {
                    url: url.to_string(),
                    title: "Household subsidy".into(),
                    snippet: "NT$10,000 per household".into(),
                })
                .collect(),
        })
    }
}

// ── Verification ────────────────────────────────────────────────────────

/// Fixed verdicts per URL; unknown pages are unreadable.
#[derive(Default)]
pub struct ScriptedVerifier {
    pages: Vec<(&'static str, Verdict, Option<&'static str>)>,
    pub calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &'static str, verdict: Verdict, quote: Option<&'static str>) -> Self {
        self.pages.push((url, verdict, quote));
        self
    }
}

impl VerificationTool for ScriptedVerifier {
    fn verify(&self, url: &str, claim: Option<&str>) -> ToolOutcome<Verification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.pages.iter().find(|(u, ..)| *u == url) {
            Some((_, verdict, quote)) => Verification {
                url: url.to_string(),
                claim: claim.map(str::to_string),
                content_summary: "The household subsidy page lists NT$10,000.".into(),
                verdict: *verdict,
                quote: quote.map(str::to_string),
            },
            None => Verification::unreadable(url, claim, "HTTP 404"),
        })
    }
}

// ── Decomposition ───────────────────────────────────────────────────────

pub struct FixedClaims(pub Vec<ProposedClaim>);

impl Decomposer for FixedClaims {
    fn decompose(&self, _message: &str) -> ToolOutcome<Vec<ProposedClaim>> {
        Ok(self.0.clone())
    }
}

// ── Reviewers ───────────────────────────────────────────────────────────

/// How a scripted reviewer answers re-reviews.
#[derive(Debug, Clone, Copy)]
pub enum Resolve {
    All,
    None,
    /// The first open question each round.
    One,
}

pub struct ScriptedReviewer {
    profile: ViewpointProfile,
    resolve: Resolve,
    pub critiques: AtomicUsize,
    pub re_reviews: AtomicUsize,
}

impl ScriptedReviewer {
    pub fn new(id: &str, questions: &[&str], resolve: Resolve) -> Arc<Self> {
        Arc::new(Self {
            profile: ViewpointProfile {
                id: id.into(),
                name: id.into(),
                constituency: "test readers".into(),
                values: vec![],
                focus_questions: questions.iter().map(|q| q.to_string()).collect(),
            },
            resolve,
            critiques: AtomicUsize::new(0),
            re_reviews: AtomicUsize::new(0),
        })
    }
}

impl Reviewer for ScriptedReviewer {
    fn profile(&self) -> &ViewpointProfile {
        &self.profile
    }

    fn critique(&self, _message: &str) -> ToolOutcome<Critique> {
        self.critiques.fetch_add(1, Ordering::SeqCst);
        Ok(Critique {
            reviewer: self.profile.id.clone(),
            questions: self.profile.focus_questions.clone(),
            reactions: vec!["Worried".into()],
        })
    }

    fn re_review(&self, _message: &str, _draft: &Draft, prior: &[String]) -> ToolOutcome<ReReview> {
        self.re_reviews.fetch_add(1, Ordering::SeqCst);
        let split = match self.resolve {
            Resolve::All => prior.len(),
            Resolve::None => 0,
            Resolve::One => prior.len().min(1),
        };
        Ok(ReReview {
            reviewer: self.profile.id.clone(),
            resolved: prior[..split].to_vec(),
            unresolved: prior[split..].to_vec(),
        })
    }
}

/// A reviewer whose service is down.
pub struct BrokenReviewer(pub ViewpointProfile);

impl Reviewer for BrokenReviewer {
    fn profile(&self) -> &ViewpointProfile {
        &self.0
    }

    fn critique(&self, _message: &str) -> ToolOutcome<Critique> {
        Err(ToolFailure::unavailable("reviewer", "connection refused"))
    }

    fn re_review(&self, _message: &str, _draft: &Draft, _prior: &[String]) -> ToolOutcome<ReReview> {
        Err(ToolFailure::unavailable("reviewer", "connection refused"))
    }
}

// ── Wiring ──────────────────────────────────────────────────────────────

pub fn collaborators(
    knowledge: Arc<dyn KnowledgeStore>,
    research: Arc<dyn ResearchTool>,
    verifier: Arc<dyn VerificationTool>,
    claims: Vec<ProposedClaim>,
    reviewers: Vec<Arc<dyn Reviewer>>,
) -> Collaborators {
    Collaborators {
        knowledge,
        research,
        verifier,
        reviewers,
        decomposer: Arc::new(FixedClaims(claims)),
        writer: Arc::new(TemplateWriter),
    }
}

/// Defaults with short deadlines.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        research_timeout: Duration::from_secs(2),
        verify_timeout: Duration::from_secs(2),
        review_timeout: Duration::from_secs(2),
        knowledge_timeout: Duration::from_secs(2),
        compose_timeout: Duration::from_secs(2),
        ..OrchestratorConfig::default()
    }
}
