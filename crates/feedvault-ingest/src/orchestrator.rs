//! Job orchestrator
//!
//! Drives one provider run: `Listing -> PerFileLoop -> Draining -> Done`.
//! Inside the loop each file goes `Fetch -> Decrypt -> Decompress -> Upload ->
//! Cleanup`; an error at any working stage marks that file failed and the loop
//! moves on. Only listing and session-open failures end the run early.
//!
//! Files are processed strictly one at a time, and a file's scratch space is
//! released before the next file starts.

use feedvault_common::{IngestError, Result};
use std::path::PathBuf;
use tracing::{debug, error, info, instrument};

use crate::dedup;
use crate::model::{ArtifactStage, PipelineArtifact, RemoteFileHandle, RunResult};
use crate::progress::ProgressSender;
use crate::provider::ProviderAdapter;
use crate::transform::TransformStage;

/// Run-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Listing,
    PerFileLoop,
    Draining,
    Done,
}

/// Per-file working state, reported alongside failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Fetch,
    Decrypt,
    Decompress,
    Upload,
    Cleanup,
}

impl std::fmt::Display for FileStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileStage::Fetch => "fetch",
            FileStage::Decrypt => "decrypt",
            FileStage::Decompress => "decompress",
            FileStage::Upload => "upload",
            FileStage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Owns the adapter (and through it the transfer session) for one run.
pub struct Orchestrator {
    adapter: Box<dyn ProviderAdapter>,
    transform: TransformStage,
    work_dir: PathBuf,
    phase: RunPhase,
}

impl Orchestrator {
    pub fn new(adapter: Box<dyn ProviderAdapter>, transform: TransformStage, work_dir: PathBuf) -> Self {
        Self {
            adapter,
            transform,
            work_dir,
            phase: RunPhase::Listing,
        }
    }

    pub fn provider(&self) -> &str {
        self.adapter.name()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Run phase");
            self.phase = phase;
        }
    }

    /// Dry run: the files a run would process right now.
    pub async fn pending(&mut self) -> Result<Vec<RemoteFileHandle>> {
        self.enter(RunPhase::Listing);
        let pending = self.discover().await;
        self.adapter.close_session().await;
        self.enter(RunPhase::Done);
        pending
    }

    /// Execute the run to completion.
    ///
    /// `Ok` means the run completed, possibly with per-file failures recorded
    /// in the result. `Err` is a run-level failure. Either way the progress
    /// stream has been terminated and the session closed.
    #[instrument(skip_all, fields(provider = %self.adapter.name()))]
    pub async fn run(mut self, mut progress: ProgressSender) -> Result<RunResult> {
        let mut result = RunResult::start(self.adapter.name());
        info!("Starting run");

        let outcome = self.process(&mut result, &mut progress).await;

        self.enter(RunPhase::Draining);
        self.adapter.close_session().await;
        progress.finish();
        result.complete();
        self.enter(RunPhase::Done);

        match outcome {
            Ok(()) => {
                info!(
                    total = result.total_files,
                    succeeded = result.succeeded,
                    failed = result.failures.len(),
                    duration_secs = result.duration_secs,
                    "Run complete"
                );
                Ok(result)
            },
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Run failed");
                Err(e)
            },
        }
    }

    async fn discover(&mut self) -> Result<Vec<RemoteFileHandle>> {
        self.adapter.open_session().await?;
        let remote = self.adapter.list_inbox().await?;
        let uploaded = self.adapter.uploaded_keys().await?;

        let listed = remote.len();
        let pending = dedup::pending(remote, uploaded);
        info!(listed, pending = pending.len(), "Computed pending files");
        Ok(pending)
    }

    async fn process(&mut self, result: &mut RunResult, progress: &mut ProgressSender) -> Result<()> {
        self.enter(RunPhase::Listing);
        let pending = self.discover().await?;
        result.total_files = pending.len();

        self.enter(RunPhase::PerFileLoop);
        for handle in pending {
            match self.process_file(&handle).await {
                Ok(key) => result.record_success(key),
                Err((stage, e)) => {
                    error!(file = %handle, %stage, kind = e.kind(), error = %e, "File failed");
                    result.record_failure(handle, &e);
                },
            }
            let percent = progress.report(result.processed(), result.total_files);
            debug!(percent, "Progress");
        }
        Ok(())
    }

    /// Run one file through every stage, releasing its scratch space on
    /// every exit path.
    async fn process_file(
        &mut self,
        handle: &RemoteFileHandle,
    ) -> std::result::Result<String, (FileStage, IngestError)> {
        let mut artifact =
            PipelineArtifact::create(&self.work_dir, handle.clone()).map_err(|e| (FileStage::Fetch, e))?;

        let mut stage = FileStage::Fetch;
        let outcome = self.advance(&mut artifact, &mut stage).await;

        let reached = artifact.stage();
        artifact.release();
        debug!(file = %handle, stage = %FileStage::Cleanup, ?reached, "Released artifact");

        outcome.map_err(|e| (stage, e))
    }

    async fn advance(&mut self, artifact: &mut PipelineArtifact, stage: &mut FileStage) -> Result<String> {
        let handle = artifact.handle().clone();

        *stage = FileStage::Fetch;
        let fetched = self.adapter.fetch(&handle, &artifact.fetch_dir()).await?;
        artifact.advance(fetched, ArtifactStage::Fetched);

        *stage = FileStage::Decrypt;
        if let Some(path) = self
            .transform
            .decrypt(artifact.path()?, self.adapter.decryption_secret())
            .await?
        {
            artifact.advance(path, ArtifactStage::Decrypted);
        }

        *stage = FileStage::Decompress;
        if let Some(path) = self.transform.decompress(artifact.path()?).await? {
            artifact.advance(path, ArtifactStage::Decompressed);
        }
        let placed = self
            .transform
            .place(artifact.path()?, &artifact.output_dir())
            .await?;
        artifact.relocate(placed);

        *stage = FileStage::Upload;
        let upload = self.adapter.upload(artifact.path()?, handle.final_name()).await?;
        let uploaded = artifact.path()?.to_path_buf();
        artifact.advance(uploaded, ArtifactStage::Uploaded);

        Ok(upload.key)
    }
}
