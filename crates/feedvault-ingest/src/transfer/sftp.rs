//! SFTP transfer channel
//!
//! `ssh2` is blocking, so every call runs on the blocking pool via
//! `spawn_blocking` and the session is shared with those tasks behind a mutex.
//! There is deliberately no retry: a failed call surfaces immediately.

use async_trait::async_trait;
use feedvault_common::{IngestError, Result};
use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

use super::TransferChannel;
use crate::config::{Environment, IngestSettings, ProviderConfig, SftpAuth};

/// Everything needed to reach and authenticate against one SFTP endpoint.
#[derive(Debug, Clone)]
pub struct SftpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SftpAuth,
    pub known_hosts: PathBuf,
    pub environment: Environment,
    pub dev_proxy: String,
}

impl SftpEndpoint {
    pub fn new(config: &ProviderConfig, settings: &IngestSettings) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            auth: config.auth.clone(),
            known_hosts: settings.known_hosts.clone(),
            environment: config.environment,
            dev_proxy: settings.dev_proxy.clone(),
        }
    }

    /// The socket address actually dialled.
    ///
    /// Development routes through the local proxy; host-key checks still use
    /// the real host name.
    pub fn connect_address(&self) -> String {
        match self.environment {
            Environment::Development => self.dev_proxy.clone(),
            Environment::Production => format!("{}:{}", self.host, self.port),
        }
    }
}

struct SftpSession {
    session: Session,
    sftp: Sftp,
}

/// Transfer channel backed by an `ssh2` SFTP subsystem
pub struct SftpChannel {
    endpoint: SftpEndpoint,
    session: Option<Arc<Mutex<SftpSession>>>,
}

impl SftpChannel {
    pub fn new(endpoint: SftpEndpoint) -> Self {
        Self {
            endpoint,
            session: None,
        }
    }

    fn active(&self) -> Result<Arc<Mutex<SftpSession>>> {
        self.session
            .clone()
            .ok_or_else(|| IngestError::Transport("SFTP session is not open".to_string()))
    }

    fn connect_blocking(endpoint: &SftpEndpoint) -> Result<SftpSession> {
        let addr = endpoint.connect_address();
        debug!("Connecting to SFTP server: {} (via {})", endpoint.host, addr);

        let tcp = TcpStream::connect(&addr)
            .map_err(|e| IngestError::Connection(format!("TCP connection to {} failed: {}", addr, e)))?;

        let mut session = Session::new()
            .map_err(|e| IngestError::Connection(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| IngestError::Connection(format!("SSH handshake with {} failed: {}", addr, e)))?;

        Self::verify_host_key(&session, endpoint)?;

        debug!("Authenticating as: {}", endpoint.username);
        let auth_result = match &endpoint.auth {
            SftpAuth::KeyFile(key_path) => {
                session.userauth_pubkey_file(&endpoint.username, None, key_path, None)
            },
            SftpAuth::Password(password) => session.userauth_password(&endpoint.username, password),
        };
        auth_result.map_err(|e| {
            IngestError::Connection(format!(
                "SSH authentication as {} failed: {}",
                endpoint.username, e
            ))
        })?;

        if !session.authenticated() {
            return Err(IngestError::Connection(format!(
                "SSH authentication as {} was not accepted",
                endpoint.username
            )));
        }

        let sftp = session
            .sftp()
            .map_err(|e| IngestError::Connection(format!("Failed to start SFTP subsystem: {}", e)))?;

        Ok(SftpSession { session, sftp })
    }

    fn verify_host_key(session: &Session, endpoint: &SftpEndpoint) -> Result<()> {
        let mut known_hosts = session
            .known_hosts()
            .map_err(|e| IngestError::Connection(format!("Failed to init known hosts: {}", e)))?;
        known_hosts
            .read_file(&endpoint.known_hosts, KnownHostFileKind::OpenSSH)
            .map_err(|e| {
                IngestError::Connection(format!(
                    "Failed to read known hosts {}: {}",
                    endpoint.known_hosts.display(),
                    e
                ))
            })?;

        let (key, _) = session
            .host_key()
            .ok_or_else(|| IngestError::Connection("Server presented no host key".to_string()))?;

        match known_hosts.check_port(&endpoint.host, endpoint.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => Err(IngestError::Connection(format!(
                "Host key for {}:{} not found in {}",
                endpoint.host,
                endpoint.port,
                endpoint.known_hosts.display()
            ))),
            CheckResult::Mismatch => Err(IngestError::Connection(format!(
                "Host key for {}:{} does not match {}",
                endpoint.host,
                endpoint.port,
                endpoint.known_hosts.display()
            ))),
            CheckResult::Failure => Err(IngestError::Connection(format!(
                "Host key check for {}:{} failed",
                endpoint.host, endpoint.port
            ))),
        }
    }

    fn list_blocking(session: &Mutex<SftpSession>, remote_dir: &str) -> Result<Vec<String>> {
        let guard = session
            .lock()
            .map_err(|_| IngestError::Transport("SFTP session lock poisoned".to_string()))?;

        let entries = guard
            .sftp
            .readdir(Path::new(remote_dir))
            .map_err(|e| IngestError::Transport(format!("Failed to list {}: {}", remote_dir, e)))?;

        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(path, _)| path.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn fetch_blocking(
        session: &Mutex<SftpSession>,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<u64> {
        let guard = session
            .lock()
            .map_err(|_| IngestError::Transport("SFTP session lock poisoned".to_string()))?;

        let copy = || -> std::io::Result<u64> {
            let mut remote = guard.sftp.open(Path::new(remote_path))?;
            let mut local = std::fs::File::create(local_path)?;
            let bytes = std::io::copy(&mut remote as &mut dyn Read, &mut local)?;
            local.sync_all()?;
            Ok(bytes)
        };

        copy().map_err(|e| {
            if local_path.exists() {
                if let Err(cleanup) = std::fs::remove_file(local_path) {
                    warn!(path = %local_path.display(), error = %cleanup, "Failed to remove partial download");
                }
            }
            IngestError::Transport(format!("Failed to download {}: {}", remote_path, e))
        })
    }
}

#[async_trait]
impl TransferChannel for SftpChannel {
    #[instrument(skip(self), fields(host = %self.endpoint.host))]
    async fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let endpoint = self.endpoint.clone();
        let session = tokio::task::spawn_blocking(move || Self::connect_blocking(&endpoint))
            .await
            .map_err(|e| IngestError::Connection(format!("SFTP connect task panicked: {}", e)))??;

        info!("SFTP session established with {}:{}", self.endpoint.host, self.endpoint.port);
        self.session = Some(Arc::new(Mutex::new(session)));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<String>> {
        let session = self.active()?;
        let dir = remote_dir.to_string();

        let names = tokio::task::spawn_blocking(move || Self::list_blocking(&session, &dir))
            .await
            .map_err(|e| IngestError::Transport(format!("SFTP list task panicked: {}", e)))??;

        info!("Listed {} ({} files)", remote_dir, names.len());
        Ok(names)
    }

    #[instrument(skip(self, local_path))]
    async fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let session = self.active()?;
        let remote = remote_path.to_string();
        let local = local_path.to_path_buf();

        let bytes = tokio::task::spawn_blocking(move || Self::fetch_blocking(&session, &remote, &local))
            .await
            .map_err(|e| IngestError::Transport(format!("SFTP fetch task panicked: {}", e)))??;

        debug!("Downloaded {} bytes from {}", bytes, remote_path);
        Ok(bytes)
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let result = tokio::task::spawn_blocking(move || {
            let guard = session.lock().map_err(|_| "SFTP session lock poisoned".to_string())?;
            guard
                .session
                .disconnect(None, "feedvault run complete", None)
                .map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(Ok(())) => debug!("SFTP session closed"),
            Ok(Err(e)) => warn!(error = %e, "Failed to close SFTP session gracefully"),
            Err(e) => warn!(error = %e, "SFTP close task panicked"),
        }
    }
}
