//! Viewpoint profiles: the data that parametrizes a reviewer.
//!
//! Four profiles are bundled into the binary. More can be dropped into the
//! configured `viewpoints_dir` as `*.toml` files; a file whose `id` matches a
//! bundled profile replaces it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ReviewError, ReviewResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewpointProfile {
    pub id: String,
    pub name: String,
    /// Who this viewpoint speaks for.
    pub constituency: String,
    #[serde(default)]
    pub values: Vec<String>,
    /// Fixed questions every critique starts from.
    #[serde(default)]
    pub focus_questions: Vec<String>,
}

impl ViewpointProfile {
    /// System prompt describing the viewpoint to a model.
    pub fn persona(&self) -> String {
        let values: String = self.values.iter().map(|v| format!("- {v}\n")).collect();
        format!(
            "You speak for this audience: {}.\nViewpoint: {}.\nWhat they care about:\n{}\
             Be specific and respectful. Voice what would confuse, worry or anger them.",
            self.constituency, self.name, values
        )
    }
}

#[derive(Debug, Clone)]
pub enum ProfileSource {
    Bundled,
    External(PathBuf),
}

const TRADITIONAL_TOML: &str = include_str!("../../data/viewpoints/traditional.toml");
const PROGRESSIVE_TOML: &str = include_str!("../../data/viewpoints/progressive.toml");
const CENTRIST_TOML: &str = include_str!("../../data/viewpoints/centrist.toml");
const GRASSROOTS_TOML: &str = include_str!("../../data/viewpoints/grassroots.toml");

fn parse_profile(toml_str: &str, origin: &str) -> ReviewResult<ViewpointProfile> {
    let profile: ViewpointProfile = toml::from_str(toml_str).map_err(|e| ReviewError::ProfileParse {
        path: origin.to_string(),
        message: e.to_string(),
    })?;
    if profile.id.trim().is_empty() {
        return Err(ReviewError::ProfileParse {
            path: origin.to_string(),
            message: "id must not be empty".into(),
        });
    }
    Ok(profile)
}

/// Loaded viewpoint profiles, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ViewpointRegistry {
    profiles: BTreeMap<String, (ViewpointProfile, ProfileSource)>,
}

impl ViewpointRegistry {
    /// Only the bundled profiles.
    pub fn bundled() -> Self {
        let mut registry = Self::default();
        for (toml, name) in [
            (TRADITIONAL_TOML, "traditional"),
            (PROGRESSIVE_TOML, "progressive"),
            (CENTRIST_TOML, "centrist"),
            (GRASSROOTS_TOML, "grassroots"),
        ] {
            match parse_profile(toml, name) {
                Ok(profile) => registry.insert(profile, ProfileSource::Bundled),
                Err(e) => tracing::warn!(viewpoint = name, "failed to parse bundled profile: {e}"),
            }
        }
        registry
    }

    /// Bundled profiles plus every readable `*.toml` in `dir`.
    ///
    /// Unreadable or malformed files are skipped with a warning.
    pub fn discover(dir: &Path) -> Self {
        let mut registry = Self::bundled();
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::debug!(dir = %dir.display(), "no viewpoints directory");
            return registry;
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();
        for path in paths {
            match Self::load_file(&path) {
                Ok(profile) => registry.insert(profile, ProfileSource::External(path)),
                Err(e) => tracing::warn!(path = %path.display(), "skipping viewpoint profile: {e}"),
            }
        }
        registry
    }

    pub fn load_file(path: &Path) -> ReviewResult<ViewpointProfile> {
        let content = std::fs::read_to_string(path).map_err(|e| ReviewError::ProfileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        parse_profile(&content, &path.display().to_string())
    }

    pub fn insert(&mut self, profile: ViewpointProfile, source: ProfileSource) {
        self.profiles.insert(profile.id.clone(), (profile, source));
    }

    pub fn get(&self, id: &str) -> Option<&ViewpointProfile> {
        self.profiles.get(id).map(|(p, _)| p)
    }

    /// Profiles in id order.
    pub fn list(&self) -> Vec<(&ViewpointProfile, &ProfileSource)> {
        self.profiles.values().map(|(p, s)| (p, s)).collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &ViewpointProfile> {
        self.profiles.values().map(|(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
