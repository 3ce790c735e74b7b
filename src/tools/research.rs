//! Web research over a SearxNG-compatible JSON search API.
//!
//! A research call proposes a few literal queries for its input, runs each
//! one, keeps every result URL as a traceable source, and asks the model to
//! summarize what the result snippets say. The findings never cite a URL the
//! search backend did not return.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::{LanguageModel, parse_json_reply};

use super::{Findings, ResearchTool, SourceLink, ToolFailure, ToolOutcome};

const TOOL: &str = "research";

/// Settings for the search backend (`[search]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// SearxNG `/search` endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Upper bound on literal queries per research call.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    /// Timeout for each search request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8888/search".into()
}
fn default_max_queries() -> usize {
    3
}
fn default_results_per_query() -> usize {
    5
}
fn default_timeout_secs() -> u64 {
    15
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_queries: default_max_queries(),
            results_per_query: default_results_per_query(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

const QUERY_SYSTEM: &str = "You plan web searches for a fact-checking team. \
Given a claim or question, propose short search queries that would find \
authoritative sources (government pages, reputable news, official statistics). \
Respond with a JSON array of strings only.";

const SUMMARY_SYSTEM: &str = "You summarize web search results for a fact-checking team. \
Use only the numbered snippets you are given. Say plainly what the sources state \
about the question and where they disagree. Do not write any URL.";

/// [`ResearchTool`] backed by a search API and a language model.
pub struct WebResearcher {
    config: SearchConfig,
    llm: Arc<dyn LanguageModel>,
}

impl WebResearcher {
    pub fn new(config: SearchConfig, llm: Arc<dyn LanguageModel>) -> Self {
        Self { config, llm }
    }

    /// Literal queries to run for `input`, never empty.
    ///
    /// Falls back to the input itself when the model is unavailable or
    /// answers in an unexpected shape.
    pub fn plan_queries(&self, input: &str) -> Vec<String> {
        let prompt = format!(
            "Propose at most {} search queries for:\n{}",
            self.config.max_queries, input
        );
        let proposed: Vec<String> = match self
            .llm
            .generate(&prompt, Some(QUERY_SYSTEM))
            .and_then(|reply| parse_json_reply(&reply))
        {
            Ok(queries) => queries,
            Err(e) => {
                tracing::warn!(error = %e, "query planning failed, searching the input as-is");
                Vec::new()
            }
        };

        let mut queries: Vec<String> = Vec::new();
        for q in proposed.into_iter().map(|q| q.trim().to_string()) {
            if !q.is_empty() && !queries.contains(&q) {
                queries.push(q);
            }
        }
        queries.truncate(self.config.max_queries.max(1));
        if queries.is_empty() {
            queries.push(input.trim().to_string());
        }
        queries
    }

    fn run_query(&self, agent: &ureq::Agent, query: &str) -> Result<Vec<SourceLink>, String> {
        let response = agent
            .get(&self.config.endpoint)
            .query("q", query)
            .query("format", "json")
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => format!("search backend answered HTTP {code}"),
                ureq::Error::Transport(t) => format!("search backend unreachable: {t}"),
            })?;
        let json: serde_json::Value = response
            .into_json()
            .map_err(|e| format!("search backend sent invalid JSON: {e}"))?;
        Ok(parse_results(&json, self.config.results_per_query))
    }

    fn summarize(&self, input: &str, sources: &[SourceLink]) -> String {
        if sources.is_empty() {
            return "The search returned no results.".into();
        }
        let snippets: String = sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("[{}] {}: {}\n", i + 1, s.title, s.snippet))
            .collect();
        let prompt = format!("Question: {input}\n\nSearch results:\n{snippets}");
        match self.llm.generate(&prompt, Some(SUMMARY_SYSTEM)) {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) | Err(_) => {
                tracing::warn!("summary generation failed, returning raw snippets");
                sources
                    .iter()
                    .map(|s| format!("{}: {}", s.title, s.snippet))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}

impl ResearchTool for WebResearcher {
    fn search(&self, query: &str) -> ToolOutcome<Findings> {
        if query.trim().is_empty() {
            return Err(ToolFailure::malformed(TOOL, "empty query"));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build();

        let queries = self.plan_queries(query);
        let mut sources: Vec<SourceLink> = Vec::new();
        let mut failures = Vec::new();
        for q in &queries {
            match self.run_query(&agent, q) {
                Ok(results) => {
                    for mut link in results {
                        if is_grounding_redirect(&link.url) {
                            link.url = resolve_redirect(&agent, &link.url);
                        }
                        if !sources.iter().any(|s| s.url == link.url) {
                            sources.push(link);
                        }
                    }
                }
                Err(reason) => {
                    tracing::warn!(tool = TOOL, query = %q, %reason, "search query failed");
                    failures.push(reason);
                }
            }
        }

        if failures.len() == queries.len() {
            return Err(ToolFailure::unavailable(TOOL, failures.join("; ")));
        }

        tracing::debug!(tool = TOOL, queries = queries.len(), sources = sources.len(), "research done");
        Ok(Findings {
            findings_summary: self.summarize(query, &sources),
            queries_used: queries,
            sources,
        })
    }
}

/// Pull `{url, title, content}` results out of a SearxNG JSON response.
pub fn parse_results(json: &serde_json::Value, limit: usize) -> Vec<SourceLink> {
    json["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    let url = r["url"].as_str()?.trim();
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return None;
                    }
                    Some(SourceLink {
                        url: url.to_string(),
                        title: r["title"].as_str().unwrap_or_default().trim().to_string(),
                        snippet: r["content"].as_str().unwrap_or_default().trim().to_string(),
                    })
                })
                .take(limit)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether a URL is an opaque grounding redirect rather than a real source.
pub fn is_grounding_redirect(url: &str) -> bool {
    url.contains("vertexaisearch.cloud.google.com/grounding-api-redirect/")
}

/// Follow redirects to the final URL, keeping the original on failure.
fn resolve_redirect(agent: &ureq::Agent, url: &str) -> String {
    match agent.head(url).call() {
        Ok(resp) => resp.get_url().to_string(),
        Err(e) => {
            tracing::debug!(url, error = %e, "could not resolve redirect");
            url.to_string()
        }
    }
}
