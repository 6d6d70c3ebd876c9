//! Caller-owned job store
//!
//! The trigger and status boundary for background runs. At most one run per
//! provider is active at a time. A job's entry is dropped once its terminal
//! status has been read.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use uuid::Uuid;

use feedvault_common::IngestError;

use crate::model::RunResult;
use crate::orchestrator::Orchestrator;
use crate::progress::{self, ProgressEvent, ProgressStream};
use crate::provider::AdapterSource;
use crate::transform::TransformStage;

/// Opaque identifier of one triggered run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunHandle(Uuid);

impl RunHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

/// Outcome attached to a finished job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobPayload {
    /// The run finished; per-file failures are listed inside
    Completed(RunResult),
    /// Run-level failure
    Failed { kind: String, message: String },
}

/// What the status boundary reports for one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: RunHandle,
    pub provider: String,
    pub status: JobStatus,
    pub progress: f64,
    pub result: Option<JobPayload>,
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("A run for {0} is already in progress")]
    AlreadyRunning(String),

    #[error(transparent)]
    Provider(#[from] IngestError),
}

/// Why a run ended without a result
#[derive(Debug, thiserror::Error)]
enum RunAborted {
    #[error(transparent)]
    Failed(#[from] IngestError),

    #[error("Run task failed: {0}")]
    Panicked(String),
}

impl RunAborted {
    fn kind(&self) -> &'static str {
        match self {
            RunAborted::Failed(e) => e.kind(),
            RunAborted::Panicked(_) => "panic",
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "run panicked".to_string()),
        Err(err) => err.to_string(),
    }
}

#[derive(Default)]
struct Jobs {
    entries: HashMap<RunHandle, JobSnapshot>,
    /// provider -> its in-flight run
    active: HashMap<String, RunHandle>,
}

#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<Jobs>>,
    source: Arc<dyn AdapterSource>,
    transform: TransformStage,
    work_dir: PathBuf,
}

impl JobStore {
    pub fn new(source: Arc<dyn AdapterSource>, transform: TransformStage, work_dir: PathBuf) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(Jobs::default())),
            source,
            transform,
            work_dir,
        }
    }

    pub fn providers(&self) -> Vec<String> {
        self.source.names()
    }

    /// Start a background run for `provider`.
    pub async fn trigger(&self, provider: &str) -> Result<RunHandle, TriggerError> {
        let adapter = self.source.build(provider)?;
        let name = adapter.name().to_string();
        let handle = RunHandle::new();

        {
            let mut jobs = self.jobs.write().await;
            if jobs.active.contains_key(&name) {
                return Err(TriggerError::AlreadyRunning(name));
            }
            jobs.active.insert(name.clone(), handle);
            jobs.entries.insert(
                handle,
                JobSnapshot {
                    job_id: handle,
                    provider: name.clone(),
                    status: JobStatus::InProgress,
                    progress: 0.0,
                    result: None,
                },
            );
        }

        // One scratch area per run so concurrent providers never share files.
        let work_dir = self.work_dir.join(format!("{}-{}", name, handle));
        let orchestrator = Orchestrator::new(adapter, self.transform.clone(), work_dir.clone());
        let (sender, stream) = progress::channel();
        let store = self.clone();

        info!(provider = %name, job_id = %handle, "Run triggered");
        tokio::spawn(async move {
            // The run gets its own task so a panic still reaches `finish`.
            let run = tokio::spawn(orchestrator.run(sender));
            let (joined, ()) = tokio::join!(run, store.follow(handle, stream));
            let outcome = joined.map(|r| r.map_err(RunAborted::from)).unwrap_or_else(|e| {
                let message = panic_message(e);
                error!(provider = %name, job_id = %handle, error = %message, "Run task aborted");
                Err(RunAborted::Panicked(message))
            });
            store.finish(handle, &name, outcome).await;
            if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %work_dir.display(), error = %e, "Failed to remove run work dir");
                }
            }
        });

        Ok(handle)
    }

    /// Current status of a job.
    ///
    /// Terminal statuses are reported once; the entry is forgotten afterwards.
    pub async fn status(&self, handle: RunHandle) -> Option<JobSnapshot> {
        let mut jobs = self.jobs.write().await;
        let snapshot = jobs.entries.get(&handle)?.clone();
        if snapshot.status.is_terminal() {
            jobs.entries.remove(&handle);
        }
        Some(snapshot)
    }

    pub async fn is_running(&self, provider: &str) -> bool {
        self.jobs.read().await.active.contains_key(&provider.to_lowercase())
    }

    async fn follow(&self, handle: RunHandle, mut stream: ProgressStream) {
        while let Some(event) = stream.next().await {
            if let ProgressEvent::Progress(percent) = event {
                if let Some(entry) = self.jobs.write().await.entries.get_mut(&handle) {
                    entry.progress = percent;
                }
            }
        }
    }

    async fn finish(&self, handle: RunHandle, provider: &str, outcome: Result<RunResult, RunAborted>) {
        let mut jobs = self.jobs.write().await;
        jobs.active.remove(provider);

        let Some(entry) = jobs.entries.get_mut(&handle) else {
            return;
        };
        match outcome {
            Ok(result) => {
                entry.status = JobStatus::Complete;
                entry.progress = 100.0;
                entry.result = Some(JobPayload::Completed(result));
            },
            Err(e) => {
                entry.status = JobStatus::Error;
                entry.result = Some(JobPayload::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            },
        }
        info!(provider, job_id = %handle, status = ?entry.status, "Run finished");
    }
}
