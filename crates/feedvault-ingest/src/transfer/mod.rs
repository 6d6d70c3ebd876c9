//! Secure transfer channel
//!
//! An authenticated session against a provider's transfer endpoint, plus
//! per-file listing and download. [`SftpChannel`] is the production channel.

use async_trait::async_trait;
use feedvault_common::Result;
use std::path::Path;

pub mod sftp;

pub use sftp::{SftpChannel, SftpEndpoint};

#[async_trait]
pub trait TransferChannel: Send + Sync {
    /// Establish the session. Fails with `IngestError::Connection`.
    async fn open(&mut self) -> Result<()>;

    /// File names (not paths) in `remote_dir`. Fails with `IngestError::Transport`.
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<String>>;

    /// Download `remote_path` to `local_path`, returning the byte count.
    ///
    /// On failure no partial file is left at `local_path`.
    async fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<u64>;

    /// Tear the session down. Safe to call repeatedly, or without a prior `open`.
    async fn close(&mut self);
}
