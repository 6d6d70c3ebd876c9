//! GnuPG decryption
//!
//! Runs the configured `gpg` binary non-interactively with the passphrase fed
//! on stdin. A non-zero exit surfaces gpg's stderr in the error.

use feedvault_common::{IngestError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct GpgDecryptor {
    bin: PathBuf,
    home: Option<PathBuf>,
}

impl GpgDecryptor {
    pub fn new(bin: impl Into<PathBuf>, home: Option<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            home,
        }
    }

    #[instrument(skip(self, passphrase), fields(input = %input.display()))]
    pub async fn decrypt(&self, input: &Path, output: &Path, passphrase: &str) -> Result<()> {
        let mut command = Command::new(&self.bin);
        if let Some(home) = &self.home {
            command.arg("--homedir").arg(home);
        }
        command
            .args([
                "--batch",
                "--yes",
                "--pinentry-mode",
                "loopback",
                "--passphrase-fd",
                "0",
                "--output",
            ])
            .arg(output)
            .arg("--decrypt")
            .arg(input)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            IngestError::Decryption(format!("Failed to launch {}: {}", self.bin.display(), e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // gpg may exit before reading; its exit status is what counts.
            if let Err(e) = stdin.write_all(format!("{}\n", passphrase).as_bytes()).await {
                debug!(error = %e, "gpg closed stdin early");
            }
            drop(stdin);
        }

        let result = child.wait_with_output().await.map_err(|e| {
            IngestError::Decryption(format!("Failed waiting for {}: {}", self.bin.display(), e))
        })?;

        if result.status.success() {
            debug!("Decrypted to {}", output.display());
            return Ok(());
        }

        if output.exists() {
            let _ = tokio::fs::remove_file(output).await;
        }
        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        Err(IngestError::Decryption(format!(
            "gpg exited with {} for {}: {}",
            result.status,
            input.display(),
            if stderr.is_empty() { "no diagnostic output" } else { stderr.as_str() }
        )))
    }
}
