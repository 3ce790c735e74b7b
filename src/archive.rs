//! Persistence of finalized cases.
//!
//! Only [`Finalized`] cases reach an archive: a suspended or cancelled case
//! has no draft to keep. [`JsonArchive`] writes one pretty-printed JSON file
//! per case under the data directory, replacing the file when the same case
//! is finalized again.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::draft::Reply;
use crate::orchestrator::Finalized;

#[derive(Debug, Error, Diagnostic)]
pub enum ArchiveError {
    #[error("failed to write case archive: {path}")]
    #[diagnostic(
        code(factdesk::archive::write),
        help("Check that the data directory exists and is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read case archive: {path}")]
    #[diagnostic(code(factdesk::archive::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("case archive {path} is not valid: {message}")]
    #[diagnostic(
        code(factdesk::archive::format),
        help("The file may have been written by another version. Move it aside and re-run the case.")
    )]
    Format { path: String, message: String },
}

pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Where finalized cases go.
pub trait CaseArchive: Send + Sync {
    fn store(&self, finalized: &Finalized) -> ArchiveResult<()>;
}

/// On-disk record of one finalized case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedCase {
    pub archived_at: DateTime<Utc>,
    /// The submitted shape, kept alongside the full case for quick reading.
    pub reply: Reply,
    pub finalized: Finalized,
}

/// One JSON file per case in a directory.
#[derive(Debug, Clone)]
pub struct JsonArchive {
    dir: PathBuf,
}

impl JsonArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a case id maps to.
    ///
    /// The first `:` (the namespace separator) becomes `_`; every other
    /// byte outside `[A-Za-z0-9-]`, `_` included, is written as `%XX`.
    /// Distinct ids therefore never share a file.
    pub fn path_for(&self, case_id: &str) -> PathBuf {
        let mut name = String::with_capacity(case_id.len());
        let mut separator_seen = false;
        for b in case_id.bytes() {
            match b {
                b':' if !separator_seen => {
                    separator_seen = true;
                    name.push('_');
                }
                b if b.is_ascii_alphanumeric() || b == b'-' => name.push(char::from(b)),
                b => name.push_str(&format!("%{b:02X}")),
            }
        }
        self.dir.join(format!("{name}.json"))
    }

    pub fn load(&self, case_id: &str) -> ArchiveResult<ArchivedCase> {
        let path = self.path_for(case_id);
        let raw = std::fs::read_to_string(&path).map_err(|e| ArchiveError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| ArchiveError::Format {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Archived file stems, sorted. A missing directory holds nothing.
    pub fn list(&self) -> ArchiveResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ArchiveError::Read {
                    path: self.dir.display().to_string(),
                    source: e,
                });
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

impl CaseArchive for JsonArchive {
    fn store(&self, finalized: &Finalized) -> ArchiveResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ArchiveError::Write {
            path: self.dir.display().to_string(),
            source: e,
        })?;
        let path = self.path_for(finalized.case.id.as_str());
        let record = ArchivedCase {
            archived_at: Utc::now(),
            reply: finalized.draft.reply(),
            finalized: finalized.clone(),
        };
        let json = serde_json::to_string_pretty(&record).map_err(|e| ArchiveError::Format {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        // Never leave a half-written record behind.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| ArchiveError::Write {
            path: tmp.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| ArchiveError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        tracing::info!(case = %finalized.case.id, path = %path.display(), "case archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_ids_map_to_safe_file_names() {
        let archive = JsonArchive::new("/tmp/cases");
        assert_eq!(
            archive.path_for("article:2zn1LjQn7Ozm7"),
            PathBuf::from("/tmp/cases/article_2zn1LjQn7Ozm7.json")
        );
        assert_eq!(
            archive.path_for("../../etc/passwd"),
            PathBuf::from("/tmp/cases/%2E%2E%2F%2E%2E%2Fetc%2Fpasswd.json")
        );
        assert_eq!(
            archive.path_for("text:00ff"),
            PathBuf::from("/tmp/cases/text_00ff.json")
        );
    }

    #[test]
    fn look_alike_ids_get_distinct_files() {
        let archive = JsonArchive::new("/tmp/cases");
        let ids = ["article:abc", "article_abc", "article:a:bc", "article:a_bc", "article%3Aabc"];
        let paths: std::collections::HashSet<_> = ids.iter().map(|id| archive.path_for(id)).collect();
        assert_eq!(paths.len(), ids.len());
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = JsonArchive::new(dir.path().join("absent"));
        assert!(archive.list().unwrap().is_empty());
    }
}
