//! Cofacts GraphQL client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{
    Article, ArticlePage, ArticleQuery, KnowledgeError, KnowledgeResult, KnowledgeStore, OrderBy,
};

/// Settings for the knowledge store (`[knowledge]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Default page size for listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Serve articles from a JSON fixture instead of the API.
    #[serde(default)]
    pub fixture: Option<std::path::PathBuf>,
}

fn default_endpoint() -> String {
    "https://api.cofacts.tw/graphql".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_page_size() -> u32 {
    super::DEFAULT_PAGE_SIZE
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            fixture: None,
        }
    }
}

const ARTICLE_FIELDS: &str = r#"
fragment ArticleFields on Article {
  id
  text
  articleType
  createdAt
  replyCount
  replyRequestCount
  hyperlinks { url title summary }
  articleReplies(statuses: [NORMAL]) {
    reply { id type text reference }
    positiveFeedbackCount
    negativeFeedbackCount
  }
  replyRequests(statuses: [NORMAL]) { reason }
  relatedArticles(first: 10) {
    totalCount
    edges {
      node {
        id
        text
        articleType
        replyCount
        createdAt
        articleReplies(statuses: [NORMAL]) {
          reply { id type text reference }
          positiveFeedbackCount
          negativeFeedbackCount
        }
      }
      score
    }
  }
}
"#;

const LIST_ARTICLES: &str = r#"
query ListArticles($filter: ListArticleFilter!, $orderBy: [ListArticleOrderBy!]!, $first: Int!, $after: String) {
  ListArticles(filter: $filter, orderBy: $orderBy, first: $first, after: $after) {
    totalCount
    pageInfo { firstCursor lastCursor }
    edges { node { ...ArticleFields } score cursor }
  }
}
"#;

const GET_ARTICLE: &str = r#"
query GetArticle($id: String!) {
  GetArticle(id: $id) { ...ArticleFields }
}
"#;

/// [`KnowledgeStore`] over the Cofacts GraphQL API.
#[derive(Debug, Clone)]
pub struct CofactsClient {
    config: KnowledgeConfig,
}

impl CofactsClient {
    pub fn new(config: KnowledgeConfig) -> Self {
        Self { config }
    }

    /// POST one GraphQL operation and return its `data` object.
    fn execute(&self, operation: &str, query: &str, variables: Value) -> KnowledgeResult<Value> {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build();
        let body = json!({
            "query": format!("{ARTICLE_FIELDS}\n{query}"),
            "variables": variables,
        });

        tracing::debug!(operation, endpoint = %self.config.endpoint, "knowledge store query");
        let response = agent
            .post(&self.config.endpoint)
            .send_json(body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => KnowledgeError::RequestFailed {
                    message: format!("{operation}: HTTP {code}"),
                },
                ureq::Error::Transport(t) => KnowledgeError::RequestFailed {
                    message: format!("{operation}: {t}"),
                },
            })?;

        let json: Value = response.into_json().map_err(|e| KnowledgeError::Parse {
            message: e.to_string(),
        })?;
        graphql_data(json)
    }
}

/// Split a GraphQL response into its data, or its errors as a failure.
pub fn graphql_data(mut response: Value) -> KnowledgeResult<Value> {
    if let Some(errors) = response.get("errors").filter(|e| !e.is_null()) {
        return Err(KnowledgeError::GraphQl {
            message: errors.to_string(),
        });
    }
    match response.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(KnowledgeError::Parse {
            message: "response has no data".into(),
        }),
    }
}

/// Build the `ListArticles` variables for a query at time `now`.
pub fn list_variables(query: &ArticleQuery, now: DateTime<Utc>) -> Value {
    let mut filter = serde_json::Map::new();
    if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        filter.insert(
            "moreLikeThis".into(),
            json!({ "like": text, "minimumShouldMatch": "0" }),
        );
    }
    if !query.ids.is_empty() {
        filter.insert("ids".into(), json!(query.ids));
    }
    if let Some(max) = query.max_reply_count {
        filter.insert("replyCount".into(), json!({ "LT": max }));
    }
    if let Some(days) = query.days_back {
        let start = now - chrono::Duration::days(i64::from(days));
        filter.insert(
            "createdAt".into(),
            json!({ "GTE": start.to_rfc3339(), "LTE": now.to_rfc3339() }),
        );
    }

    let order_by = match query.order_by {
        OrderBy::Relevance => json!([{ "_score": "DESC" }]),
        OrderBy::Demand => json!([{ "replyRequestCount": "DESC" }, { "createdAt": "DESC" }]),
        OrderBy::Recency => json!([{ "createdAt": "DESC" }]),
    };

    json!({
        "filter": filter,
        "orderBy": order_by,
        "first": query.page_size(),
        "after": query.after,
    })
}

impl KnowledgeStore for CofactsClient {
    fn search(&self, query: &ArticleQuery) -> KnowledgeResult<ArticlePage> {
        let data = self.execute("ListArticles", LIST_ARTICLES, list_variables(query, Utc::now()))?;
        let page = data.get("ListArticles").cloned().unwrap_or(Value::Null);
        if page.is_null() {
            return Ok(ArticlePage::default());
        }
        serde_json::from_value(page).map_err(|e| KnowledgeError::Parse {
            message: format!("ListArticles: {e}"),
        })
    }

    fn get_by_id(&self, id: &str) -> KnowledgeResult<Article> {
        let data = self.execute("GetArticle", GET_ARTICLE, json!({ "id": id }))?;
        match data.get("GetArticle") {
            Some(article) if !article.is_null() => {
                serde_json::from_value(article.clone()).map_err(|e| KnowledgeError::Parse {
                    message: format!("GetArticle: {e}"),
                })
            }
            _ => Err(KnowledgeError::NotFound { id: id.to_string() }),
        }
    }
}
