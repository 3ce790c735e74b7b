//! Triage: urgency, routing, and prior replies from the knowledge store.

use crate::case::{Case, PriorReply, Provenance};
use crate::knowledge::{Article, ReplyType};

/// Which pass a case takes after triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Light,
    Full,
}

/// Community demand per existing reply: `requests / (replies + 1)`.
///
/// A message many people ask about and few have answered scores high.
pub fn urgency(article: &Article) -> f64 {
    f64::from(article.reply_request_count) / (f64::from(article.reply_count) + 1.0)
}

/// Route by urgency. Cases with no article behind them get the full pass.
pub fn route(urgency: Option<f64>, threshold: f64) -> Route {
    match urgency {
        Some(u) if u < threshold => Route::Light,
        _ => Route::Full,
    }
}

/// http(s) URLs mentioned in a free-form reference field.
pub fn reference_urls(reference: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for token in reference.split_whitespace() {
        let Some(start) = token.find("http://").or_else(|| token.find("https://")) else {
            continue;
        };
        let url = token[start..].trim_end_matches([',', '.', ';', ')', ']', '>', '」', '，', '。']);
        if url.len() > "https://".len() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Record every reply of `article` as a prior, with its reference URLs as
/// knowledge-store evidence. Returns how many priors were added.
pub fn record_priors(case: &mut Case, article: &Article) -> usize {
    let mut added = 0;
    for (feedback, reply) in article.replies() {
        let weight = feedback.helpful_ratio();
        let summary = format!(
            "Existing {} reply: {}",
            reply.reply_type,
            reply.text.chars().take(200).collect::<String>()
        );
        let mut evidence = Vec::new();
        for url in reply.reference.as_deref().map(reference_urls).unwrap_or_default() {
            case.trace_url(&url);
            match case.record_evidence(&url, &summary, None, Provenance::KnowledgeStore, weight) {
                Ok(id) => evidence.push(id),
                Err(e) => tracing::warn!(url = %url, "could not record prior evidence: {e}"),
            }
        }
        let before = case.priors().len();
        case.add_prior(PriorReply {
            article_id: article.id.clone(),
            reply_id: reply.id.clone(),
            reply_type: reply.reply_type,
            text: reply.text.clone(),
            helpful: feedback.positive_feedback_count,
            unhelpful: feedback.negative_feedback_count,
            weight,
            evidence,
        });
        added += case.priors().len() - before;
    }
    added
}

/// The prior reply the case may lean on, if any.
///
/// Replies judging the message not to be an article never count. Among
/// replies whose smoothed helpful ratio reaches `min_ratio`, the case's own
/// article wins over similar ones, then the higher ratio.
pub fn usable_prior(case: &Case, min_ratio: f64) -> Option<&PriorReply> {
    case.priors()
        .iter()
        .filter(|p| !matches!(p.reply_type, ReplyType::NotArticle | ReplyType::Unknown))
        .filter(|p| p.weight >= min_ratio)
        .max_by(|a, b| {
            let own = |p: &PriorReply| case.article_id.as_deref() == Some(p.article_id.as_str());
            own(a).cmp(&own(b)).then(a.weight.total_cmp(&b.weight))
        })
}
