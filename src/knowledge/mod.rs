//! Knowledge store: previously reported messages and their fact-check replies.
//!
//! The store is read-only from this crate's point of view. [`KnowledgeStore`]
//! is the query contract; [`cofacts::CofactsClient`] implements it over the
//! Cofacts GraphQL API and [`memory::InMemoryStore`] over a local fixture.
//!
//! Wire types mirror the GraphQL field names (camelCase) so responses
//! deserialize directly. GraphQL freely returns `null` for lists and counts;
//! those fields read as their empty defaults.

pub mod cofacts;
pub mod memory;

use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use cofacts::{CofactsClient, KnowledgeConfig};
pub use memory::InMemoryStore;

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum KnowledgeError {
    #[error("article not found: {id}")]
    #[diagnostic(
        code(factdesk::knowledge::not_found),
        help("Check the article id, or pass the full Cofacts article URL.")
    )]
    NotFound { id: String },

    #[error("knowledge store request failed: {message}")]
    #[diagnostic(
        code(factdesk::knowledge::request_failed),
        help("Check network access and the [knowledge] endpoint in the config.")
    )]
    RequestFailed { message: String },

    #[error("knowledge store rejected the query: {message}")]
    #[diagnostic(
        code(factdesk::knowledge::graphql),
        help("The GraphQL API returned errors for this query.")
    )]
    GraphQl { message: String },

    #[error("unexpected knowledge store response: {message}")]
    #[diagnostic(code(factdesk::knowledge::parse))]
    Parse { message: String },

    #[error("failed to read fixture {path}: {message}")]
    #[diagnostic(
        code(factdesk::knowledge::fixture),
        help("Fixtures are JSON arrays of articles in the GraphQL response shape.")
    )]
    Fixture { path: String, message: String },
}

pub type KnowledgeResult<T> = std::result::Result<T, KnowledgeError>;

// ── Wire types ──────────────────────────────────────────────────────────

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Classification of an existing fact-check reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyType {
    Rumor,
    NotRumor,
    Opinionated,
    NotArticle,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ReplyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rumor => "RUMOR",
            Self::NotRumor => "NOT_RUMOR",
            Self::Opinionated => "OPINIONATED",
            Self::NotArticle => "NOT_ARTICLE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    #[serde(rename = "type")]
    pub reply_type: ReplyType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    /// Free-form reference field: URLs with notes.
    #[serde(default)]
    pub reference: Option<String>,
}

/// A reply attached to an article, with its community feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleReply {
    pub reply: Option<Reply>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub positive_feedback_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub negative_feedback_count: u32,
}

impl ArticleReply {
    /// Laplace-smoothed helpful ratio: `(helpful + 1) / (helpful + unhelpful + 2)`.
    ///
    /// A reply nobody rated sits at 0.5.
    pub fn helpful_ratio(&self) -> f64 {
        let helpful = f64::from(self.positive_feedback_count);
        let unhelpful = f64::from(self.negative_feedback_count);
        (helpful + 1.0) / (helpful + unhelpful + 2.0)
    }
}

/// A link found in a message, with the crawler's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperlink {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Context a reporter added when asking about the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEdge {
    pub node: Article,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedConnection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub edges: Vec<RelatedEdge>,
}

/// A reported message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    /// Message text, or the OCR/transcript for media messages.
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub article_type: Option<String>,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Number of fact-check replies.
    #[serde(default, deserialize_with = "null_as_default")]
    pub reply_count: u32,
    /// Number of people who asked about this message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub reply_request_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hyperlinks: Vec<Hyperlink>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub article_replies: Vec<ArticleReply>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reply_requests: Vec<ReplyRequest>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub related_articles: RelatedConnection,
}

impl Article {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            article_type: None,
            created_at: None,
            reply_count: 0,
            reply_request_count: 0,
            hyperlinks: Vec::new(),
            article_replies: Vec::new(),
            reply_requests: Vec::new(),
            related_articles: RelatedConnection::default(),
        }
    }

    /// Public page of this article.
    pub fn url(&self) -> String {
        article_url(&self.id)
    }

    /// Replies that carry a reply body.
    pub fn replies(&self) -> impl Iterator<Item = (&ArticleReply, &Reply)> {
        self.article_replies
            .iter()
            .filter_map(|ar| ar.reply.as_ref().map(|r| (ar, r)))
    }

    /// Non-empty reasons reporters gave.
    pub fn additional_context(&self) -> impl Iterator<Item = &str> {
        self.reply_requests
            .iter()
            .filter_map(|r| r.reason.as_deref())
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub first_cursor: Option<String>,
    #[serde(default)]
    pub last_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleEdge {
    pub node: Article,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_info: PageInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub edges: Vec<ArticleEdge>,
}

// ── Query contract ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Similarity score, best first.
    #[default]
    Relevance,
    /// Most-requested first, then newest.
    Demand,
    /// Newest first.
    Recency,
}

pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Filters for [`KnowledgeStore::search`]. Unset filters do not constrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleQuery {
    pub text: Option<String>,
    pub ids: Vec<String>,
    /// Only articles with strictly fewer replies than this.
    pub max_reply_count: Option<u32>,
    /// Only articles created within this many days.
    pub days_back: Option<u32>,
    pub order_by: OrderBy,
    /// Page size, 1 to 50.
    pub first: u32,
    /// Cursor of the last edge of the previous page.
    pub after: Option<String>,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            text: None,
            ids: Vec::new(),
            max_reply_count: None,
            days_back: None,
            order_by: OrderBy::Relevance,
            first: DEFAULT_PAGE_SIZE,
            after: None,
        }
    }
}

impl ArticleQuery {
    pub fn similar_to(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }

    /// Recent articles that still lack replies, most demanded first.
    pub fn trending(days_back: u32, max_reply_count: u32) -> Self {
        Self {
            days_back: Some(days_back),
            max_reply_count: Some(max_reply_count),
            order_by: OrderBy::Demand,
            ..Default::default()
        }
    }

    pub fn limit(mut self, first: u32) -> Self {
        self.first = first.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn ordered_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    /// Page size clamped to the accepted range.
    pub fn page_size(&self) -> u32 {
        self.first.clamp(1, MAX_PAGE_SIZE)
    }
}

/// Read-only access to the fact-check database.
pub trait KnowledgeStore: Send + Sync {
    fn search(&self, query: &ArticleQuery) -> KnowledgeResult<ArticlePage>;

    fn get_by_id(&self, id: &str) -> KnowledgeResult<Article>;
}

// ── References ──────────────────────────────────────────────────────────

const ARTICLE_URL_PREFIX: &str = "https://cofacts.tw/article/";

pub fn article_url(id: &str) -> String {
    format!("{ARTICLE_URL_PREFIX}{id}")
}

/// Resolve a message reference to an article id.
///
/// Accepts a bare id or an article URL (any scheme or `www.` host, with or
/// without trailing path, query or fragment). Blank input is no reference.
pub fn parse_reference(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    let rest = reference
        .strip_prefix("https://")
        .or_else(|| reference.strip_prefix("http://"))
        .unwrap_or(reference);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    if let Some(path) = rest.strip_prefix("cofacts.tw/article/") {
        let id = path.split(['/', '?', '#']).next().unwrap_or_default();
        return (!id.is_empty()).then(|| id.to_string());
    }
    if reference.chars().any(char::is_whitespace) || reference.contains('/') {
        return None;
    }
    Some(reference.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_resolve_to_ids() {
        assert_eq!(parse_reference(" abc123 ").as_deref(), Some("abc123"));
        assert_eq!(
            parse_reference("https://cofacts.tw/article/abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            parse_reference("http://www.cofacts.tw/article/abc123/?utm=x#top").as_deref(),
            Some("abc123")
        );
        assert_eq!(parse_reference("   "), None);
        assert_eq!(parse_reference("https://cofacts.tw/article/"), None);
        assert_eq!(parse_reference("not an id"), None);
    }

    #[test]
    fn nulls_read_as_defaults() {
        let article: Article = serde_json::from_value(serde_json::json!({
            "id": "a1",
            "text": null,
            "replyCount": null,
            "hyperlinks": null,
            "articleReplies": [
                {"reply": {"id": "r1", "type": "RUMOR", "text": "False.", "reference": null},
                 "positiveFeedbackCount": 3, "negativeFeedbackCount": null}
            ],
            "relatedArticles": null
        }))
        .unwrap();
        assert_eq!(article.text, "");
        assert_eq!(article.reply_count, 0);
        assert!(article.hyperlinks.is_empty());
        let (ar, reply) = article.replies().next().unwrap();
        assert_eq!(reply.reply_type, ReplyType::Rumor);
        assert_eq!(ar.negative_feedback_count, 0);
    }

    #[test]
    fn unknown_reply_types_are_tolerated() {
        let reply: Reply =
            serde_json::from_value(serde_json::json!({"id": "r", "type": "SOMETHING_NEW"})).unwrap();
        assert_eq!(reply.reply_type, ReplyType::Unknown);
    }

    #[test]
    fn helpful_ratio_is_smoothed() {
        let ar = |h, u| ArticleReply {
            reply: None,
            positive_feedback_count: h,
            negative_feedback_count: u,
        };
        assert!((ar(0, 0).helpful_ratio() - 0.5).abs() < 1e-9);
        assert!((ar(8, 0).helpful_ratio() - 0.9).abs() < 1e-9);
        assert!(ar(0, 5).helpful_ratio() < 0.2);
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(ArticleQuery::similar_to("x").limit(0).first, 1);
        assert_eq!(ArticleQuery::similar_to("x").limit(500).first, 50);
        assert_eq!(ArticleQuery::default().page_size(), 10);
    }
}
