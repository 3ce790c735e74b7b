//! Language model access.
//!
//! Every model-backed collaborator (research synthesis, page verification,
//! reviewers, claim decomposition, reply writing) talks to a
//! [`LanguageModel`]. The bundled implementation is an Ollama client over
//! blocking HTTP; tests substitute scripted models.

use miette::Diagnostic;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from the LLM subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("Ollama is not available at {url}")]
    #[diagnostic(
        code(factdesk::llm::unavailable),
        help("Start Ollama with `ollama serve`, or point [llm] base_url at a running server.")
    )]
    Unavailable { url: String },

    #[error("LLM request failed: {message}")]
    #[diagnostic(
        code(factdesk::llm::request_failed),
        help("Check that Ollama is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse LLM response: {message}")]
    #[diagnostic(
        code(factdesk::llm::parse_error),
        help("The model returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("LLM request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(factdesk::llm::timeout),
        help("Increase [llm] timeout_secs or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// A text-in, text-out model.
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`, optionally steered by a system prompt.
    fn generate(&self, prompt: &str, system: Option<&str>) -> LlmResult<String>;
}

/// Configuration for the Ollama client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name to use.
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Client for the Ollama REST API.
pub struct OllamaClient {
    config: OllamaConfig,
    available: bool,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            available: false,
        }
    }

    /// Check that the server answers and the configured model is present.
    ///
    /// Sends a lightweight request to `/api/tags`.
    pub fn probe(&mut self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(5))
            .build();

        self.available = match agent.get(&url).call() {
            Ok(resp) if resp.status() == 200 => {
                let models: Vec<String> = resp
                    .into_json::<serde_json::Value>()
                    .ok()
                    .and_then(|json| {
                        json["models"].as_array().map(|arr| {
                            arr.iter()
                                .filter_map(|m| m["name"].as_str().map(str::to_string))
                                .collect()
                        })
                    })
                    .unwrap_or_default();
                let target = &self.config.model;
                let found = models
                    .iter()
                    .any(|m| m == target || m.split(':').next() == Some(target.as_str()));
                if !found {
                    tracing::warn!(model = %target, "model not pulled on the Ollama server");
                }
                found
            }
            _ => false,
        };
        self.available
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

impl LanguageModel for OllamaClient {
    fn generate(&self, prompt: &str, system: Option<&str>) -> LlmResult<String> {
        if !self.available {
            return Err(LlmError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        let url = format!("{}/api/generate", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .build();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys.to_string());
        }

        let resp = agent.post(&url).send_json(body).map_err(|e| match e {
            ureq::Error::Transport(t) if t.to_string().contains("timed out") => LlmError::Timeout {
                timeout_secs: self.config.timeout_secs,
            },
            other => LlmError::RequestFailed {
                message: other.to_string(),
            },
        })?;

        let json: serde_json::Value = resp.into_json().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;

        json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'response' field".into(),
            })
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("available", &self.available)
            .finish()
    }
}

/// Parse the JSON value a model was asked to return.
///
/// Models wrap JSON in prose or code fences; this takes the outermost
/// `{...}` or `[...]` span, whichever opens first.
pub fn parse_json_reply<T: DeserializeOwned>(response: &str) -> LlmResult<T> {
    let trimmed = response.trim();
    let start = trimmed.find(['{', '[']).ok_or_else(|| LlmError::ParseError {
        message: "no JSON value found in response".into(),
    })?;
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close).filter(|&e| e > start).ok_or_else(|| LlmError::ParseError {
        message: "unterminated JSON value in response".into(),
    })?;
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| LlmError::ParseError {
        message: format!("JSON parse error: {e}"),
    })
}
