//! Trigger and status boundary tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

use feedvault_common::IngestError;
use feedvault_ingest::{JobPayload, JobSnapshot, JobStatus, JobStore, RunHandle, TriggerError};
use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn job_store(source: MemorySource, work: &std::path::Path) -> JobStore {
    JobStore::new(Arc::new(source), transform_without_gpg(work), work.to_path_buf())
}

async fn wait_for_terminal(store: &JobStore, handle: RunHandle) -> JobSnapshot {
    for _ in 0..200 {
        let snapshot = store.status(handle).await.expect("job disappeared before finishing");
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", handle);
}

#[tokio::test]
async fn test_unknown_provider_is_rejected() {
    let work = tempfile::tempdir().unwrap();
    let store = job_store(MemorySource::new(Arc::new(MemoryStore::default()), &[]), work.path());

    let err = store.trigger("acme").await.unwrap_err();
    assert!(matches!(err, TriggerError::Provider(IngestError::ProviderNotFound(_))));
}

#[tokio::test]
async fn test_one_active_run_per_provider() {
    let work = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let destination = Arc::new(MemoryStore::default());
    let mut source = MemorySource::new(Arc::clone(&destination), &[("b.xml.gz", gzip(b"<feed/>"))]);
    source.gate = Some(Arc::clone(&gate));
    let store = job_store(source, work.path());

    let handle = store.trigger("affirm").await.unwrap();
    assert!(store.is_running("affirm").await);

    let err = store.trigger("AFFIRM").await.unwrap_err();
    assert!(matches!(err, TriggerError::AlreadyRunning(ref name) if name == "affirm"));

    let snapshot = store.status(handle).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::InProgress);

    gate.notify_one();
    let snapshot = wait_for_terminal(&store, handle).await;
    assert_eq!(snapshot.status, JobStatus::Complete);
    assert_eq!(snapshot.progress, 100.0);
    match snapshot.result {
        Some(JobPayload::Completed(result)) => {
            assert_eq!(result.uploaded_keys, vec!["data/xml/affirm/undated/b.xml"]);
        },
        other => panic!("unexpected payload: {:?}", other),
    }

    // Terminal status is observed once, then forgotten.
    assert!(store.status(handle).await.is_none());
    assert!(!store.is_running("affirm").await);

    gate.notify_one();
    let again = store.trigger("affirm").await.unwrap();
    assert_ne!(again, handle);
    let snapshot = wait_for_terminal(&store, again).await;
    assert_eq!(snapshot.status, JobStatus::Complete);
}

#[tokio::test]
async fn test_run_level_failure_reports_error() {
    let work = tempfile::tempdir().unwrap();
    let mut source = MemorySource::new(Arc::new(MemoryStore::default()), &[("a.csv", b"x".to_vec())]);
    source.fail_open = true;
    let store = job_store(source, work.path());

    let handle = store.trigger("affirm").await.unwrap();
    let snapshot = wait_for_terminal(&store, handle).await;

    assert_eq!(snapshot.status, JobStatus::Error);
    match snapshot.result {
        Some(JobPayload::Failed { kind, message }) => {
            assert_eq!(kind, "connection");
            assert!(message.contains("connection refused"));
        },
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_panicking_run_still_terminates() {
    let work = tempfile::tempdir().unwrap();
    let mut source = MemorySource::new(Arc::new(MemoryStore::default()), &[("a.csv", b"x".to_vec())]);
    source.panic_on_upload = true;
    let store = job_store(source, work.path());

    let handle = store.trigger("affirm").await.unwrap();
    let snapshot = wait_for_terminal(&store, handle).await;

    assert_eq!(snapshot.status, JobStatus::Error);
    match snapshot.result {
        Some(JobPayload::Failed { kind, message }) => {
            assert_eq!(kind, "panic");
            assert!(message.contains("no subfolder for a.csv"), "{}", message);
        },
        other => panic!("unexpected payload: {:?}", other),
    }

    assert!(!store.is_running("affirm").await);
    assert!(store.trigger("affirm").await.is_ok());
}

#[tokio::test]
async fn test_snapshot_serializes_for_status_boundary() {
    let work = tempfile::tempdir().unwrap();
    let store = job_store(MemorySource::new(Arc::new(MemoryStore::default()), &[]), work.path());

    let handle = store.trigger("affirm").await.unwrap();
    let snapshot = wait_for_terminal(&store, handle).await;
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["status"], "complete");
    assert_eq!(json["job_id"], handle.to_string());
    assert_eq!(json["result"]["outcome"], "completed");
    assert_eq!(json["result"]["total_files"], 0);
}

#[test]
fn test_run_handle_parse() {
    assert!(RunHandle::parse("not-a-uuid").is_none());
    let raw = "67e55044-10b1-426f-9247-bb680e5fe0c8";
    assert_eq!(RunHandle::parse(raw).unwrap().to_string(), raw);
}
