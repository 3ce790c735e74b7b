//! In-memory knowledge store for offline use and tests.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::{
    Article, ArticleEdge, ArticlePage, ArticleQuery, KnowledgeError, KnowledgeResult,
    KnowledgeStore, OrderBy, PageInfo,
};

/// A [`KnowledgeStore`] over a fixed set of articles.
///
/// Similarity is the Jaccard overlap of character bigrams, which works for
/// both CJK and space-separated text. Cursors are result positions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    articles: Vec<Article>,
}

impl InMemoryStore {
    pub fn new(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    /// Load a JSON array of articles in the GraphQL response shape.
    pub fn from_json_file(path: &Path) -> KnowledgeResult<Self> {
        let fixture_err = |message: String| KnowledgeError::Fixture {
            path: path.display().to_string(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| fixture_err(e.to_string()))?;
        let articles: Vec<Article> =
            serde_json::from_str(&raw).map_err(|e| fixture_err(e.to_string()))?;
        tracing::debug!(path = %path.display(), count = articles.len(), "loaded article fixture");
        Ok(Self::new(articles))
    }

    pub fn insert(&mut self, article: Article) {
        self.articles.retain(|a| a.id != article.id);
        self.articles.push(article);
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    fn matches(&self, article: &Article, query: &ArticleQuery, now: DateTime<Utc>) -> bool {
        if !query.ids.is_empty() && !query.ids.contains(&article.id) {
            return false;
        }
        if let Some(max) = query.max_reply_count {
            if article.reply_count >= max {
                return false;
            }
        }
        if let Some(days) = query.days_back {
            let start = now - chrono::Duration::days(i64::from(days));
            match created_at(article) {
                Some(created) if created >= start && created <= now => {}
                _ => return false,
            }
        }
        true
    }
}

fn created_at(article: &Article) -> Option<DateTime<Utc>> {
    article
        .created_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Jaccard similarity of character bigrams, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (bigrams(a), bigrams(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    shared as f64 / (a.len() + b.len() - shared) as f64
}

impl KnowledgeStore for InMemoryStore {
    fn search(&self, query: &ArticleQuery) -> KnowledgeResult<ArticlePage> {
        let now = Utc::now();
        let text = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty());

        let mut hits: Vec<(&Article, Option<f64>)> = self
            .articles
            .iter()
            .filter(|a| self.matches(a, query, now))
            .filter_map(|a| match text {
                Some(t) => {
                    let score = similarity(t, &a.text);
                    (score > 0.0).then_some((a, Some(score)))
                }
                None => Some((a, None)),
            })
            .collect();

        let newest_first = |x: &Article, y: &Article| created_at(y).cmp(&created_at(x));
        match query.order_by {
            OrderBy::Relevance => hits.sort_by(|x, y| {
                y.1.unwrap_or(0.0)
                    .total_cmp(&x.1.unwrap_or(0.0))
                    .then_with(|| newest_first(x.0, y.0))
            }),
            OrderBy::Demand => hits.sort_by(|x, y| {
                y.0.reply_request_count
                    .cmp(&x.0.reply_request_count)
                    .then_with(|| newest_first(x.0, y.0))
            }),
            OrderBy::Recency => hits.sort_by(|x, y| newest_first(x.0, y.0)),
        }

        let start = query
            .after
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .map_or(0, |pos| pos + 1);
        let edges: Vec<ArticleEdge> = hits
            .iter()
            .enumerate()
            .skip(start)
            .take(query.page_size() as usize)
            .map(|(pos, (article, score))| ArticleEdge {
                node: (*article).clone(),
                score: *score,
                cursor: Some(pos.to_string()),
            })
            .collect();

        Ok(ArticlePage {
            total_count: hits.len() as u32,
            page_info: PageInfo {
                first_cursor: edges.first().and_then(|e| e.cursor.clone()),
                last_cursor: edges.last().and_then(|e| e.cursor.clone()),
            },
            edges,
        })
    }

    fn get_by_id(&self, id: &str) -> KnowledgeResult<Article> {
        self.articles
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| KnowledgeError::NotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, text: &str, replies: u32, demand: u32, days_ago: i64) -> Article {
        let mut a = Article::new(id, text);
        a.reply_count = replies;
        a.reply_request_count = demand;
        a.created_at = Some((Utc::now() - chrono::Duration::days(days_ago)).to_rfc3339());
        a
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(vec![
            article("a", "Government gives every household a NT$20,000 subsidy", 0, 12, 1),
            article("b", "Drinking hot water cures the flu", 2, 30, 3),
            article("c", "Household subsidy application opens in June", 1, 5, 40),
        ])
    }

    #[test]
    fn similarity_prefers_overlapping_text() {
        let page = store().search(&ArticleQuery::similar_to("household subsidy NT$20,000")).unwrap();
        assert_eq!(page.edges[0].node.id, "a");
        assert!(page.edges.iter().all(|e| e.score.unwrap_or(0.0) > 0.0));
        assert!(similarity("abc", "abc") > similarity("abc", "abd"));
        assert_eq!(similarity("", "abc"), 0.0);
    }

    #[test]
    fn trending_filters_and_orders_by_demand() {
        let page = store().search(&ArticleQuery::trending(7, 3)).unwrap();
        let ids: Vec<_> = page.edges.iter().map(|e| e.node.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let page = store().search(&ArticleQuery::trending(7, 1)).unwrap();
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn cursors_page_through_results() {
        let query = ArticleQuery::default().ordered_by(OrderBy::Recency).limit(2);
        let first = store().search(&query).unwrap();
        assert_eq!(first.total_count, 3);
        assert_eq!(first.edges.len(), 2);
        let cursor = first.page_info.last_cursor.clone().unwrap();
        let second = store().search(&query.after(cursor)).unwrap();
        assert_eq!(second.edges.len(), 1);
        assert_eq!(second.edges[0].node.id, "c");
    }

    #[test]
    fn missing_article_is_not_found() {
        assert!(matches!(store().get_by_id("zzz"), Err(KnowledgeError::NotFound { .. })));
        assert_eq!(store().get_by_id("b").unwrap().reply_request_count, 30);
    }

    #[test]
    fn fixture_loads_from_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::write(&path, r#"[{"id": "x", "text": "hello", "replyCount": 1}]"#).unwrap();
        let store = InMemoryStore::from_json_file(&path).unwrap();
        assert_eq!(store.len(), 1);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            InMemoryStore::from_json_file(&path),
            Err(KnowledgeError::Fixture { .. })
        ));
    }
}
