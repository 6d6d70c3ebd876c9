//! Decrypt/decompress stage
//!
//! Turns a fetched artifact into its final uploadable form. Both transforms
//! are chosen purely from filename suffixes and each writes its result next
//! to its input, so the artifact's scratch directory holds every intermediate.

use feedvault_common::{IngestError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

pub mod decompression;
pub mod gpg;

use crate::config::IngestSettings;
use crate::naming::{self, Compression};
use gpg::GpgDecryptor;

/// Stateless across files; one instance serves a whole run.
#[derive(Debug, Clone)]
pub struct TransformStage {
    gpg: GpgDecryptor,
}

impl TransformStage {
    pub fn new(gpg: GpgDecryptor) -> Self {
        Self { gpg }
    }

    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self::new(GpgDecryptor::new(
            settings.gpg_bin.clone(),
            settings.gpg_home.clone(),
        ))
    }

    /// Decrypt `input` if its name carries an encryption suffix.
    ///
    /// Returns the decrypted path, or `None` when the file is not encrypted.
    #[instrument(skip(self, secret), fields(input = %input.display()))]
    pub async fn decrypt(&self, input: &Path, secret: Option<&str>) -> Result<Option<PathBuf>> {
        let name = file_name(input)?;
        let Some(stem) = naming::strip_encryption(&name) else {
            return Ok(None);
        };

        let secret = secret.ok_or_else(|| {
            IngestError::Decryption(format!("{} is encrypted but no decryption secret is configured", name))
        })?;

        let output = input.with_file_name(stem);
        self.gpg.decrypt(input, &output, secret).await?;
        Ok(Some(output))
    }

    /// Decompress `input` if its name carries a recognized compression suffix.
    #[instrument(skip(self), fields(input = %input.display()))]
    pub async fn decompress(&self, input: &Path) -> Result<Option<PathBuf>> {
        let name = file_name(input)?;
        let Some((stem, compression)) = naming::strip_compression(&name) else {
            return Ok(None);
        };

        let source = input.to_path_buf();
        let output = input.with_file_name(stem);
        let target = output.clone();
        let bytes = tokio::task::spawn_blocking(move || match compression {
            Compression::Gzip => decompression::gunzip_file(&source, &target),
            Compression::TarGzip => decompression::extract_single_tar_gz(&source, &target),
        })
        .await
        .map_err(|e| IngestError::Decompression(format!("Decompression task panicked: {}", e)))??;

        debug!("Decompressed {} ({:?}, {} bytes)", name, compression, bytes);
        Ok(Some(output))
    }

    /// Move the finished artifact into `output_dir` under its own name.
    pub async fn place(&self, path: &Path, output_dir: &Path) -> Result<PathBuf> {
        let destination = output_dir.join(file_name(path)?);
        tokio::fs::rename(path, &destination).await?;
        Ok(destination)
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            ))
        })
}
