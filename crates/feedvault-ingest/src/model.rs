//! Pipeline data model: remote handles, per-file artifacts and run results

use chrono::{DateTime, Utc};
use feedvault_common::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::warn;

use crate::naming;

/// A file sitting in a provider's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFileHandle {
    /// File name without directory
    pub name: String,
    /// Path relative to the transfer session root, e.g. `inbox/a.csv.gpg`
    pub remote_path: String,
}

impl RemoteFileHandle {
    pub fn new(remote_dir: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        let remote_path = if remote_dir.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", remote_dir.trim_end_matches('/'), name)
        };
        Self { name, remote_path }
    }

    /// e.g. `.csv.gz.gpg`
    pub fn extension_chain(&self) -> &str {
        naming::extension_chain(&self.name)
    }

    /// Name once every transform has been applied.
    pub fn final_name(&self) -> &str {
        naming::final_name(&self.name)
    }
}

impl std::fmt::Display for RemoteFileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.remote_path)
    }
}

/// How far a file has travelled through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStage {
    Fetched,
    Decrypted,
    Decompressed,
    Uploaded,
}

/// Local working copy of one file.
///
/// Everything produced for the file lives inside a private scratch directory
/// which is removed by [`PipelineArtifact::release`], or on drop if the
/// artifact is abandoned.
#[derive(Debug)]
pub struct PipelineArtifact {
    handle: RemoteFileHandle,
    scratch: TempDir,
    path: Option<PathBuf>,
    stage: Option<ArtifactStage>,
}

impl PipelineArtifact {
    /// Reserve scratch space under `work_dir` for `handle`.
    pub fn create(work_dir: &Path, handle: RemoteFileHandle) -> Result<Self> {
        std::fs::create_dir_all(work_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("artifact-")
            .tempdir_in(work_dir)?;
        std::fs::create_dir(scratch.path().join("fetched"))?;
        std::fs::create_dir(scratch.path().join("output"))?;

        Ok(Self {
            handle,
            scratch,
            path: None,
            stage: None,
        })
    }

    pub fn handle(&self) -> &RemoteFileHandle {
        &self.handle
    }

    /// Where the raw transfer lands; decrypt/decompress intermediates sit beside it.
    pub fn fetch_dir(&self) -> PathBuf {
        self.scratch.path().join("fetched")
    }

    /// Final artifacts, keyed by final filename.
    pub fn output_dir(&self) -> PathBuf {
        self.scratch.path().join("output")
    }

    pub fn stage(&self) -> Option<ArtifactStage> {
        self.stage
    }

    /// Current local path. Errors before the file has been fetched.
    pub fn path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| {
            IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} has not been fetched yet", self.handle),
            ))
        })
    }

    pub fn advance(&mut self, path: PathBuf, stage: ArtifactStage) {
        self.path = Some(path);
        self.stage = Some(stage);
    }

    /// The file moved without changing stage.
    pub fn relocate(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    /// Remove every local file produced for this artifact.
    pub fn release(self) {
        let location = self.scratch.path().to_path_buf();
        if let Err(e) = self.scratch.close() {
            warn!(path = %location.display(), error = %e, "Failed to remove artifact scratch space");
        }
    }
}

/// A file whose pipeline failed, with the diagnostic text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: RemoteFileHandle,
    /// Error kind, e.g. "decryption"
    pub kind: String,
    pub error: String,
}

/// Aggregate outcome of one provider run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub provider: String,
    /// Pending files considered by this run
    pub total_files: usize,
    pub succeeded: usize,
    /// In processing order
    pub failures: Vec<FileFailure>,
    /// Destination keys written by this run
    pub uploaded_keys: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

impl RunResult {
    pub fn start(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            total_files: 0,
            succeeded: 0,
            failures: Vec::new(),
            uploaded_keys: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration_secs: 0.0,
        }
    }

    pub fn record_success(&mut self, key: String) {
        self.succeeded += 1;
        self.uploaded_keys.push(key);
    }

    pub fn record_failure(&mut self, file: RemoteFileHandle, error: &IngestError) {
        self.failures.push(FileFailure {
            file,
            kind: error.kind().to_string(),
            error: error.to_string(),
        });
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    pub fn complete(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_secs = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
