//! Provider adapters
//!
//! A provider binds its configuration keys and destination naming onto the
//! shared capability set. The SFTP session and object-store plumbing live in
//! [`InboxEndpoint`], so a new provider only decides where its files land.

use async_trait::async_trait;
use feedvault_common::{IngestError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub mod affirm;
pub mod bloomberg;
pub mod registry;

pub use affirm::AffirmAdapter;
pub use bloomberg::BloombergAdapter;
pub use registry::{AdapterSource, ProviderRegistry, Providers};

use crate::config::ProviderConfig;
use crate::model::RemoteFileHandle;
use crate::naming;
use crate::storage::{ObjectStore, UploadResult};
use crate::transfer::TransferChannel;

/// Transfer session plus destination store for one provider run.
pub struct InboxEndpoint {
    config: ProviderConfig,
    channel: Box<dyn TransferChannel>,
    store: Arc<dyn ObjectStore>,
}

impl InboxEndpoint {
    pub fn new(
        config: ProviderConfig,
        channel: Box<dyn TransferChannel>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            channel,
            store,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Capability set every provider exposes to the orchestrator.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name, lower-case
    fn name(&self) -> &str;

    fn endpoint(&self) -> &InboxEndpoint;

    fn endpoint_mut(&mut self) -> &mut InboxEndpoint;

    /// Provider-specific part of the destination key for a final filename.
    fn provider_subfolder(&self, final_name: &str) -> String;

    fn config(&self) -> &ProviderConfig {
        self.endpoint().config()
    }

    fn destination_bucket(&self) -> &str {
        &self.config().bucket
    }

    fn decryption_secret(&self) -> Option<&str> {
        self.config().decryption_secret.as_deref()
    }

    fn destination_key(&self, final_name: &str) -> String {
        naming::destination_key(&self.provider_subfolder(final_name), final_name)
    }

    async fn open_session(&mut self) -> Result<()> {
        self.endpoint_mut().channel.open().await
    }

    /// Every file currently in the provider's inbox.
    async fn list_inbox(&mut self) -> Result<Vec<RemoteFileHandle>> {
        let names = self
            .endpoint_mut()
            .channel
            .list(naming::INBOX_DIR)
            .await
            .map_err(|e| match e {
                IngestError::Transport(msg) => IngestError::Connection(msg),
                other => other,
            })?;

        debug!(provider = %self.name(), count = names.len(), "Listed inbox");
        Ok(names
            .into_iter()
            .map(|name| RemoteFileHandle::new(naming::INBOX_DIR, name))
            .collect())
    }

    /// Download `handle` into `local_dir`, returning the local path.
    async fn fetch(&mut self, handle: &RemoteFileHandle, local_dir: &Path) -> Result<PathBuf> {
        let local_path = local_dir.join(&handle.name);
        let bytes = self
            .endpoint_mut()
            .channel
            .fetch(&handle.remote_path, &local_path)
            .await?;
        debug!(provider = %self.name(), file = %handle, bytes, "Fetched");
        Ok(local_path)
    }

    /// Keys already deposited under the destination root.
    async fn uploaded_keys(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", naming::DESTINATION_ROOT);
        self.endpoint()
            .store
            .list_keys(self.destination_bucket(), &prefix)
            .await
    }

    /// Deposit the finished artifact at `path` under its destination key.
    async fn upload(&self, path: &Path, final_name: &str) -> Result<UploadResult> {
        let key = self.destination_key(final_name);
        let result = self
            .endpoint()
            .store
            .put_file(self.destination_bucket(), &key, path)
            .await?;
        info!(provider = %self.name(), key = %result.key, size = result.size, "Uploaded");
        Ok(result)
    }

    async fn close_session(&mut self) {
        self.endpoint_mut().channel.close().await
    }
}
