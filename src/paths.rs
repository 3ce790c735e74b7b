//! XDG-compliant path resolution for factdesk.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(factdesk::paths::no_home),
        help("Set the HOME environment variable or pass --config explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(factdesk::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for factdesk.
#[derive(Debug, Clone)]
pub struct DeskPaths {
    /// `$XDG_CONFIG_HOME/factdesk/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/factdesk/`
    pub data_dir: PathBuf,
}

impl DeskPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("factdesk");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("factdesk");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Paths rooted somewhere other than the XDG locations.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
        }
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.cases_dir()] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Where finalized cases are archived.
    pub fn cases_dir(&self) -> PathBuf {
        self.data_dir.join("cases")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_layout() {
        let paths = DeskPaths::rooted_at("/tmp/fd");
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/fd/config/config.toml"));
        assert_eq!(paths.cases_dir(), PathBuf::from("/tmp/fd/data/cases"));
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = DeskPaths::rooted_at(dir.path());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.cases_dir().is_dir());
    }
}
