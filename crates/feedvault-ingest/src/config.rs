//! Ingestion configuration
//!
//! Global settings (`FEEDVAULT_*`, `S3_*`) and per-provider settings
//! (`<PREFIX>_BUCKET`, `<PREFIX>_SFTP_HOST`, ...). Every loader has a
//! `from_lookup` twin so callers can resolve keys from something other than
//! the process environment.

use feedvault_common::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::config::StorageConfig;

/// Default SFTP port.
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Local tunnel endpoint used instead of the provider host in development.
pub const DEFAULT_DEV_PROXY: &str = "127.0.0.1:2222";

/// GnuPG executable resolved through `PATH`.
pub const DEFAULT_GPG_BIN: &str = "gpg";

/// Deployment environment; decides how transfer sessions are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Connections go through the local proxy endpoint.
    Development,
    #[default]
    Production,
}

impl std::str::FromStr for Environment {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(IngestError::Config(format!(
                "Invalid FEEDVAULT_ENV: {}. Must be 'development' or 'production'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// How the transfer session authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum SftpAuth {
    KeyFile(PathBuf),
    Password(String),
}

impl std::fmt::Debug for SftpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SftpAuth::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            SftpAuth::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
        }
    }
}

/// Immutable per-provider settings, loaded once per run.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Registry name, e.g. "affirm"
    pub provider: String,
    /// Destination bucket for processed files
    pub bucket: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SftpAuth,
    /// GnuPG passphrase; `None` for providers that never encrypt
    pub decryption_secret: Option<String>,
    pub environment: Environment,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("bucket", &self.bucket)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("auth", &self.auth)
            .field(
                "decryption_secret",
                &self.decryption_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("environment", &self.environment)
            .finish()
    }
}

impl ProviderConfig {
    /// Load a provider's settings from `<prefix>_*` keys.
    ///
    /// A key path wins over a password when both are present.
    pub fn from_lookup<F>(
        provider: &str,
        prefix: &str,
        environment: Environment,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |suffix: &str| format!("{}_{}", prefix, suffix);
        let get = |suffix: &str| lookup(&key(suffix)).filter(|v| !v.trim().is_empty());
        let require = |suffix: &str| {
            get(suffix).ok_or_else(|| IngestError::Config(format!("{} must be set", key(suffix))))
        };

        let port = match get("SFTP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                IngestError::Config(format!("{} is not a valid port: {}", key("SFTP_PORT"), raw))
            })?,
            None => DEFAULT_SFTP_PORT,
        };

        let auth = match (get("SFTP_KEY_PATH"), get("SFTP_PASSWORD")) {
            (Some(path), _) => SftpAuth::KeyFile(PathBuf::from(path)),
            (None, Some(password)) => SftpAuth::Password(password),
            (None, None) => {
                return Err(IngestError::Config(format!(
                    "{} or {} must be set",
                    key("SFTP_KEY_PATH"),
                    key("SFTP_PASSWORD")
                )))
            },
        };

        let config = Self {
            provider: provider.to_string(),
            bucket: require("BUCKET")?,
            host: require("SFTP_HOST")?,
            port,
            username: require("SFTP_USERNAME")?,
            auth,
            decryption_secret: get("DECRYPTION_SECRET"),
            environment,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(IngestError::Config(format!("{}: bucket cannot be empty", self.provider)));
        }
        if self.host.is_empty() {
            return Err(IngestError::Config(format!("{}: SFTP host cannot be empty", self.provider)));
        }
        if self.port == 0 {
            return Err(IngestError::Config(format!(
                "{}: SFTP port must be greater than 0",
                self.provider
            )));
        }
        Ok(())
    }
}

/// Process-wide settings shared by every provider run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub environment: Environment,
    /// Root of the local working area; each run stages files below it
    pub work_dir: PathBuf,
    /// OpenSSH known_hosts file used for host-key verification
    pub known_hosts: PathBuf,
    /// `host:port` dialled instead of the provider host in development
    pub dev_proxy: String,
    pub gpg_bin: PathBuf,
    pub gpg_home: Option<PathBuf>,
    pub storage: StorageConfig,
}

impl IngestSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("FEEDVAULT_ENV") {
            Some(raw) => raw.parse()?,
            None => Environment::default(),
        };

        let known_hosts = lookup("FEEDVAULT_KNOWN_HOSTS")
            .map(PathBuf::from)
            .unwrap_or_else(|| match lookup("HOME") {
                Some(home) => PathBuf::from(home).join(".ssh").join("known_hosts"),
                None => PathBuf::from("/etc/ssh/ssh_known_hosts"),
            });

        let settings = Self {
            environment,
            work_dir: lookup("FEEDVAULT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("feedvault-work")),
            known_hosts,
            dev_proxy: lookup("FEEDVAULT_DEV_PROXY").unwrap_or_else(|| DEFAULT_DEV_PROXY.to_string()),
            gpg_bin: lookup("FEEDVAULT_GPG_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GPG_BIN)),
            gpg_home: lookup("FEEDVAULT_GPG_HOME").map(PathBuf::from),
            storage: StorageConfig::from_lookup(&lookup),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.environment == Environment::Development && !self.dev_proxy.contains(':') {
            return Err(IngestError::Config(format!(
                "FEEDVAULT_DEV_PROXY must be host:port, got: {}",
                self.dev_proxy
            )));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(IngestError::Config("FEEDVAULT_WORK_DIR cannot be empty".to_string()));
        }
        Ok(())
    }
}
