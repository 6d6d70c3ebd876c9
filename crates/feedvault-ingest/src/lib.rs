//! Feedvault ingestion pipeline
//!
//! Pulls pending files from financial providers' SFTP inboxes, decrypts and
//! decompresses them, and deposits the results in object storage. Runs are
//! idempotent: files already present in the destination are never fetched
//! again.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod dedup;
pub mod jobs;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod progress;
pub mod provider;
pub mod storage;
pub mod transfer;
pub mod transform;

pub use config::{Environment, IngestSettings, ProviderConfig, SftpAuth};
pub use jobs::{JobPayload, JobSnapshot, JobStatus, JobStore, RunHandle, TriggerError};
pub use model::{FileFailure, RemoteFileHandle, RunResult};
pub use orchestrator::Orchestrator;
pub use progress::{ProgressEvent, ProgressSender, ProgressStream};
pub use provider::{AdapterSource, ProviderAdapter, ProviderRegistry, Providers};
pub use storage::{ObjectStore, S3Storage};
pub use transform::TransformStage;
