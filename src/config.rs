//! Configuration loaded from `config.toml`.
//!
//! Every field has a serde default, so a partial file (or none at all) is a
//! valid configuration.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::knowledge::KnowledgeConfig;
use crate::llm::OllamaConfig;
use crate::tools::SearchConfig;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(factdesk::config::read),
        help("Create one with `factdesk config init`, or pass --config.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(factdesk::config::parse),
        help("Check TOML syntax: {message}")
    )]
    ConfigParse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(factdesk::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value {field}: {reason}")]
    #[diagnostic(code(factdesk::config::invalid))]
    Invalid { field: String, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// `[orchestrator]`: triage and revise-loop policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Urgency at or above this runs the full pass.
    #[serde(default = "default_urgency_threshold")]
    pub urgency_threshold: f64,
    /// Revise rounds after the first review before finalizing anyway.
    #[serde(default = "default_max_revise_rounds")]
    pub max_revise_rounds: u32,
    /// Minimum smoothed helpful ratio for a prior reply to count.
    #[serde(default = "default_prior_min_ratio")]
    pub prior_min_ratio: f64,
    #[serde(default = "default_max_urls_per_claim")]
    pub max_urls_per_claim: usize,
    #[serde(default = "default_similar_articles")]
    pub similar_articles: u32,
}

fn default_urgency_threshold() -> f64 {
    2.0
}
fn default_max_revise_rounds() -> u32 {
    3
}
fn default_prior_min_ratio() -> f64 {
    0.6
}
fn default_max_urls_per_claim() -> usize {
    3
}
fn default_similar_articles() -> u32 {
    5
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            urgency_threshold: default_urgency_threshold(),
            max_revise_rounds: default_max_revise_rounds(),
            prior_min_ratio: default_prior_min_ratio(),
            max_urls_per_claim: default_max_urls_per_claim(),
            similar_articles: default_similar_articles(),
        }
    }
}

/// `[timeouts]`: per-collaborator deadlines in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_research_secs")]
    pub research: u64,
    #[serde(default = "default_verify_secs")]
    pub verify: u64,
    #[serde(default = "default_review_secs")]
    pub review: u64,
    #[serde(default = "default_knowledge_secs")]
    pub knowledge: u64,
    #[serde(default = "default_compose_secs")]
    pub compose: u64,
}

fn default_research_secs() -> u64 {
    30
}
fn default_verify_secs() -> u64 {
    20
}
fn default_review_secs() -> u64 {
    30
}
fn default_knowledge_secs() -> u64 {
    30
}
fn default_compose_secs() -> u64 {
    60
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            research: default_research_secs(),
            verify: default_verify_secs(),
            review: default_review_secs(),
            knowledge: default_knowledge_secs(),
            compose: default_compose_secs(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Extra reviewer profiles (`*.toml`) on top of the bundled ones.
    #[serde(default)]
    pub viewpoints_dir: Option<PathBuf>,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub llm: OllamaConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl DeskConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ConfigWrite {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &str, reason: &str| {
            Err(ConfigError::Invalid {
                field: field.into(),
                reason: reason.into(),
            })
        };
        let o = &self.orchestrator;
        if !o.urgency_threshold.is_finite() || o.urgency_threshold < 0.0 {
            return invalid("orchestrator.urgency_threshold", "must be a non-negative number");
        }
        if o.max_revise_rounds == 0 {
            return invalid("orchestrator.max_revise_rounds", "must be at least 1");
        }
        if !(0.0..=1.0).contains(&o.prior_min_ratio) {
            return invalid("orchestrator.prior_min_ratio", "must be between 0 and 1");
        }
        if o.max_urls_per_claim == 0 {
            return invalid("orchestrator.max_urls_per_claim", "must be at least 1");
        }
        let t = &self.timeouts;
        for (field, secs) in [
            ("timeouts.research", t.research),
            ("timeouts.verify", t.verify),
            ("timeouts.review", t.review),
            ("timeouts.knowledge", t.knowledge),
            ("timeouts.compose", t.compose),
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("knowledge.timeout_secs", self.knowledge.timeout_secs),
            ("search.timeout_secs", self.search.timeout_secs),
        ] {
            if secs == 0 {
                return invalid(field, "timeouts must be at least one second");
            }
        }
        Ok(())
    }
}
