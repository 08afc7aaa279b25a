//! Local artifact store.
//!
//! Layout under the output root:
//!
//! ```text
//! <root>/<repo name>/test_<stem>.test.<ext>   one file per source file, overwritten per run
//! <root>/<repo name>/metadata.md              shared log, append-only
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::errors::StoreError;

pub const METADATA_FILE: &str = "metadata.md";

/// Generated tests for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedArtifact {
    pub source_path: String,
    pub code: String,
    pub metadata: String,
    pub packages: Vec<String>,
}

/// Name of the artifact file generated for `source_path`.
///
/// `a/b/File.tsx` becomes `test_File.test.tsx`. The stem is the part of the
/// base name before its first dot, the extension the part after its last dot.
/// Files without an extension get `test_<name>.test`.
pub fn artifact_file_name(source_path: &str) -> String {
    let base = source_path.rsplit('/').next().unwrap_or(source_path);
    let trimmed = base.trim_start_matches('.');
    match trimmed.rsplit_once('.') {
        Some((_, ext)) => {
            let stem = trimmed.split('.').next().unwrap_or(trimmed);
            format!("test_{}.test.{}", stem, ext)
        }
        None => format!("test_{}.test", trimmed),
    }
}

/// Writes artifacts below an output root, one directory per repository.
#[derive(Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
    metadata_lock: Mutex<()>,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_dir(&self, repo_name: &str) -> PathBuf {
        self.root.join(repo_name)
    }

    pub fn metadata_path(&self, repo_name: &str) -> PathBuf {
        self.repo_dir(repo_name).join(METADATA_FILE)
    }

    /// Write the artifact's code and append its metadata entry. Returns the code file path.
    pub fn persist(&self, repo_name: &str, artifact: &GeneratedArtifact) -> Result<PathBuf, StoreError> {
        let dir = self.repo_dir(repo_name);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Write {
            path: dir.clone(),
            source,
        })?;

        let file_name = artifact_file_name(&artifact.source_path);
        let path = dir.join(&file_name);
        fs::write(&path, &artifact.code).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;

        self.append_metadata(repo_name, &file_name, artifact)?;
        tracing::debug!(path = %path.display(), "artifact written");
        Ok(path)
    }

    fn append_metadata(
        &self,
        repo_name: &str,
        file_name: &str,
        artifact: &GeneratedArtifact,
    ) -> Result<(), StoreError> {
        let mut entry = format!(
            "## {} (from `{}`)\n\n{}\n\n## Required Packages\n",
            file_name,
            artifact.source_path,
            artifact.metadata.trim_end()
        );
        for package in &artifact.packages {
            entry.push_str(&format!("- {}\n", package));
        }
        entry.push('\n');

        let path = self.metadata_path(repo_name);
        let _guard = self.metadata_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        file.write_all(entry.as_bytes())
            .map_err(|source| StoreError::Write { path, source })
    }

    /// Regular files in the repository's directory, sorted by name. Empty when
    /// nothing was ever written.
    pub fn publishable(&self, repo_name: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.repo_dir(repo_name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Read { path: dir, source }),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Read {
                path: dir.clone(),
                source,
            })?;
            let is_file = entry
                .file_type()
                .map(|t| t.is_file())
                .map_err(|source| StoreError::Read {
                    path: entry.path(),
                    source,
                })?;
            if is_file {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}
