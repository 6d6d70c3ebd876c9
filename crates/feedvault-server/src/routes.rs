//! HTTP routes: trigger boundary and status boundary over the job store

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use feedvault_ingest::{JobStore, RunHandle};
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::middleware;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
}

/// Create the application router with all routes and middleware
pub fn router(state: AppState, cors: &crate::config::CorsConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/providers", get(list_providers))
        // POST takes a provider name, GET a job id; one pattern serves both.
        .route("/api/v1/jobs/:id", post(trigger_job).get(job_status))
        .with_state(state)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "providers": state.jobs.providers() }))
}

async fn trigger_job(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.jobs.trigger(&provider).await?;
    info!(provider = %provider, job_id = %handle, "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": handle, "provider": provider.to_lowercase() })),
    ))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = RunHandle::parse(&job_id).ok_or_else(|| AppError::NotFound(format!("Unknown job: {}", job_id)))?;
    let snapshot = state
        .jobs
        .status(handle)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Unknown job: {}", job_id)))?;
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorsConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use feedvault_common::{IngestError, Result};
    use feedvault_ingest::config::{Environment, ProviderConfig, SftpAuth};
    use feedvault_ingest::provider::{BloombergAdapter, InboxEndpoint};
    use feedvault_ingest::storage::UploadResult;
    use feedvault_ingest::transfer::TransferChannel;
    use feedvault_ingest::transform::gpg::GpgDecryptor;
    use feedvault_ingest::{AdapterSource, ObjectStore, ProviderAdapter, TransformStage};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Inbox that is empty, or whose session never opens.
    struct FakeChannel {
        stuck: bool,
    }

    #[async_trait]
    impl TransferChannel for FakeChannel {
        async fn open(&mut self) -> Result<()> {
            if self.stuck {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
        async fn list(&mut self, _remote_dir: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn fetch(&mut self, remote_path: &str, _local_path: &std::path::Path) -> Result<u64> {
            Err(IngestError::Transport(format!("no such file: {}", remote_path)))
        }
        async fn close(&mut self) {}
    }

    struct EmptyStore;

    #[async_trait]
    impl ObjectStore for EmptyStore {
        async fn list_keys(&self, _bucket: &str, _prefix: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn put_file(&self, _bucket: &str, key: &str, _path: &std::path::Path) -> Result<UploadResult> {
            Ok(UploadResult {
                key: key.to_string(),
                checksum: String::new(),
                size: 0,
            })
        }
    }

    struct FakeSource {
        stuck: bool,
    }

    impl AdapterSource for FakeSource {
        fn build(&self, provider: &str) -> Result<Box<dyn ProviderAdapter>> {
            if !provider.eq_ignore_ascii_case(BloombergAdapter::NAME) {
                return Err(IngestError::ProviderNotFound(provider.to_string()));
            }
            let config = ProviderConfig {
                provider: BloombergAdapter::NAME.to_string(),
                bucket: "lake-bbg".to_string(),
                host: "sftp.bloomberg.example".to_string(),
                port: 22,
                username: "dl12345".to_string(),
                auth: SftpAuth::Password("pw".to_string()),
                decryption_secret: None,
                environment: Environment::Production,
            };
            let channel = FakeChannel { stuck: self.stuck };
            Ok(Box::new(BloombergAdapter::new(InboxEndpoint::new(
                config,
                Box::new(channel),
                Arc::new(EmptyStore),
            ))))
        }

        fn names(&self) -> Vec<String> {
            vec![BloombergAdapter::NAME.to_string()]
        }
    }

    fn app(stuck: bool, work: &std::path::Path) -> Router {
        let jobs = JobStore::new(
            Arc::new(FakeSource { stuck }),
            TransformStage::new(GpgDecryptor::new("gpg", None)),
            work.to_path_buf(),
        );
        router(AppState { jobs }, &CorsConfig { allowed_origins: Vec::new() })
    }

    async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_and_providers() {
        let work = tempfile::tempdir().unwrap();
        let app = app(false, work.path());

        let (status, body) = send(&app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/api/v1/providers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providers"][0], "bloomberg");
    }

    #[tokio::test]
    async fn test_trigger_unknown_provider() {
        let work = tempfile::tempdir().unwrap();
        let (status, body) = send(&app(false, work.path()), "POST", "/api/v1/jobs/acme").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["status"], 404);
    }

    #[tokio::test]
    async fn test_second_trigger_conflicts() {
        let work = tempfile::tempdir().unwrap();
        let app = app(true, work.path());

        let (status, body) = send(&app, "POST", "/api/v1/jobs/bloomberg").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, "POST", "/api/v1/jobs/Bloomberg").await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, "GET", &format!("/api/v1/jobs/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "in_progress");
        assert_eq!(body["provider"], "bloomberg");
    }

    #[tokio::test]
    async fn test_status_reports_completion_once() {
        let work = tempfile::tempdir().unwrap();
        let app = app(false, work.path());

        let (_, body) = send(&app, "POST", "/api/v1/jobs/bloomberg").await;
        let uri = format!("/api/v1/jobs/{}", body["job_id"].as_str().unwrap());

        let mut last = serde_json::Value::Null;
        for _ in 0..200 {
            let (status, body) = send(&app, "GET", &uri).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "in_progress" {
                last = body;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "complete");
        assert_eq!(last["progress"], 100.0);

        let (status, _) = send(&app, "GET", &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let work = tempfile::tempdir().unwrap();
        let app = app(false, work.path());

        let (status, _) = send(&app, "GET", "/api/v1/jobs/67e55044-10b1-426f-9247-bb680e5fe0c8").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", "/api/v1/jobs/not-a-job").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
