use serde::{Deserialize, Serialize};

/// S3 client settings. The bucket is not part of this: each provider names
/// its own destination bucket.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Custom endpoint (MinIO, LocalStack); `None` means AWS
    pub endpoint: Option<String>,
    pub region: String,
    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl StorageConfig {
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            endpoint: lookup("S3_ENDPOINT"),
            region: lookup("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            access_key: lookup("S3_ACCESS_KEY").or_else(|| lookup("AWS_ACCESS_KEY_ID")),
            secret_key: lookup("S3_SECRET_KEY").or_else(|| lookup("AWS_SECRET_ACCESS_KEY")),
            path_style: lookup("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Static credentials are only used when both halves are present.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }
}
