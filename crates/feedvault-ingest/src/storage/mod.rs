//! Destination object storage
//!
//! The orchestrator only needs two things from the destination store: the
//! keys already deposited (for dedup) and a way to deposit one file.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use feedvault_common::{checksum, IngestError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub mod config;

use config::StorageConfig;

/// Outcome of depositing one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: u64,
}

/// Long-term object storage holding processed output.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every key in `bucket` starting with `prefix`.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Deposit the local file at `path` under `key`.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<UploadResult>;
}

/// S3-compatible object store
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> anyhow::Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let mut builder = match config.static_credentials() {
            Some((access_key, secret_key)) => aws_sdk_s3::Config::builder()
                .credentials_provider(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "feedvault-storage",
                ))
                .region(Region::new(config.region.clone())),
            None => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(region = %config.region, endpoint = ?config.endpoint, "Storage client initialized");

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    IngestError::Connection(format!(
                        "Failed to list s3://{}/{}: {}",
                        bucket,
                        prefix,
                        DisplayErrorContext(&e)
                    ))
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!("Listed {} keys under s3://{}/{}", keys.len(), bucket, prefix);
        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<UploadResult> {
        let owned: PathBuf = path.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || checksum::sha256_file(owned))
            .await
            .map_err(|e| IngestError::Upload(format!("Checksum task panicked: {}", e)))??;
        let size = tokio::fs::metadata(path).await?.len();

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| IngestError::Upload(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .metadata("sha256", digest.as_str())
            .body(body);

        if let Some(content_type) = crate::naming::content_type(key) {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|e| {
            IngestError::Upload(format!(
                "Failed to upload s3://{}/{}: {}",
                bucket,
                key,
                DisplayErrorContext(&e)
            ))
        })?;

        info!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum: digest,
            size,
        })
    }
}
