//! Test helpers for feedvault-ingest integration tests
//!
//! In-memory stand-ins for the SFTP inbox and the destination store, plus
//! builders wiring them into real provider adapters.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use feedvault_common::{checksum, IngestError, Result};
use feedvault_ingest::config::{Environment, ProviderConfig, SftpAuth};
use feedvault_ingest::provider::{AffirmAdapter, BloombergAdapter, InboxEndpoint};
use feedvault_ingest::storage::UploadResult;
use feedvault_ingest::transfer::TransferChannel;
use feedvault_ingest::transform::gpg::GpgDecryptor;
use feedvault_ingest::{AdapterSource, ObjectStore, ProviderAdapter, TransformStage};
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const BUCKET: &str = "lake-test";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,feedvault_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// What a [`MemoryChannel`] observed, shared with the test.
#[derive(Default)]
pub struct ChannelProbe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub fetched: Mutex<Vec<String>>,
    /// Most artifact directories seen in the work dir during a single fetch
    pub max_live_artifacts: AtomicUsize,
}

impl ChannelProbe {
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

/// Inbox served from memory.
pub struct MemoryChannel {
    inbox: Vec<(String, Vec<u8>)>,
    open: bool,
    fail_open: bool,
    fail_list: bool,
    gate: Option<Arc<Notify>>,
    work_dir: Option<PathBuf>,
    probe: Arc<ChannelProbe>,
}

impl MemoryChannel {
    pub fn new(inbox: &[(&str, Vec<u8>)]) -> Self {
        Self {
            inbox: inbox.iter().map(|(n, d)| (n.to_string(), d.clone())).collect(),
            open: false,
            fail_open: false,
            fail_list: false,
            gate: None,
            work_dir: None,
            probe: Arc::new(ChannelProbe::default()),
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// `open` waits until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Count live artifact directories under `work_dir` on every fetch.
    pub fn watching(mut self, work_dir: &Path) -> Self {
        self.work_dir = Some(work_dir.to_path_buf());
        self
    }

    pub fn probe(&self) -> Arc<ChannelProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl TransferChannel for MemoryChannel {
    async fn open(&mut self) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(IngestError::Connection("connection refused".to_string()));
        }
        self.open = true;
        Ok(())
    }

    async fn list(&mut self, _remote_dir: &str) -> Result<Vec<String>> {
        if !self.open {
            return Err(IngestError::Transport("session is not open".to_string()));
        }
        if self.fail_list {
            return Err(IngestError::Transport("permission denied".to_string()));
        }
        Ok(self.inbox.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        if let Some(work_dir) = &self.work_dir {
            let live = std::fs::read_dir(work_dir).map(|d| d.count()).unwrap_or(0);
            self.probe.max_live_artifacts.fetch_max(live, Ordering::SeqCst);
        }

        let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        let (_, data) = self
            .inbox
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| IngestError::Transport(format!("no such file: {}", remote_path)))?;

        std::fs::write(local_path, data)?;
        self.probe.fetched.lock().unwrap().push(remote_path.to_string());
        Ok(data.len() as u64)
    }

    async fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }
}

/// Destination store held in memory, keyed by `(bucket, key)`.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn with_keys(bucket: &str, keys: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut objects = store.objects.lock().unwrap();
            for key in keys {
                objects.insert((bucket.to_string(), key.to_string()), Vec::new());
            }
        }
        store
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<UploadResult> {
        let data = std::fs::read(path)?;
        let checksum = checksum::sha256_file(path)?;
        let size = data.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }
}

pub fn provider_config(provider: &str, secret: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        provider: provider.to_string(),
        bucket: BUCKET.to_string(),
        host: format!("sftp.{}.example", provider),
        port: 22,
        username: "feeds".to_string(),
        auth: SftpAuth::Password("pw".to_string()),
        decryption_secret: secret.map(str::to_string),
        environment: Environment::Development,
    }
}

pub fn affirm(channel: MemoryChannel, store: Arc<MemoryStore>) -> Box<dyn ProviderAdapter> {
    let endpoint = InboxEndpoint::new(provider_config("affirm", Some("secret")), Box::new(channel), store);
    Box::new(AffirmAdapter::new(endpoint).unwrap())
}

pub fn bloomberg(channel: MemoryChannel, store: Arc<MemoryStore>) -> Box<dyn ProviderAdapter> {
    let endpoint = InboxEndpoint::new(provider_config("bloomberg", None), Box::new(channel), store);
    Box::new(BloombergAdapter::new(endpoint))
}

/// Affirm stand-in whose destination naming panics.
pub struct PanickingAdapter {
    endpoint: InboxEndpoint,
}

impl ProviderAdapter for PanickingAdapter {
    fn name(&self) -> &str {
        "affirm"
    }

    fn endpoint(&self) -> &InboxEndpoint {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut InboxEndpoint {
        &mut self.endpoint
    }

    fn provider_subfolder(&self, final_name: &str) -> String {
        panic!("no subfolder for {}", final_name)
    }
}

/// Transform stage whose gpg binary does not exist, so every decryption fails.
pub fn transform_without_gpg(dir: &Path) -> TransformStage {
    TransformStage::new(GpgDecryptor::new(dir.join("missing-gpg"), None))
}

/// Transform stage backed by a shell script standing in for gpg.
#[cfg(unix)]
pub fn transform_with_script(dir: &Path, body: &str) -> TransformStage {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-gpg");
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    TransformStage::new(GpgDecryptor::new(path, None))
}

/// gpg stand-in that copies its input to `--output` unchanged.
#[cfg(unix)]
pub fn transform_with_passthrough_gpg(dir: &Path) -> TransformStage {
    transform_with_script(
        dir,
        r#"#!/bin/sh
cat >/dev/null
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift ;;
    --decrypt) in="$2"; shift ;;
  esac
  shift
done
cp "$in" "$out"
"#,
    )
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), flate2::Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Builds Affirm adapters over a fixed inbox for job-store tests.
pub struct MemorySource {
    pub store: Arc<MemoryStore>,
    pub inbox: Vec<(String, Vec<u8>)>,
    pub gate: Option<Arc<Notify>>,
    pub fail_open: bool,
    /// Build adapters that panic while naming the destination of a file
    pub panic_on_upload: bool,
}

impl MemorySource {
    pub fn new(store: Arc<MemoryStore>, inbox: &[(&str, Vec<u8>)]) -> Self {
        Self {
            store,
            inbox: inbox.iter().map(|(n, d)| (n.to_string(), d.clone())).collect(),
            gate: None,
            fail_open: false,
            panic_on_upload: false,
        }
    }
}

impl AdapterSource for MemorySource {
    fn build(&self, provider: &str) -> Result<Box<dyn ProviderAdapter>> {
        if !provider.eq_ignore_ascii_case("affirm") {
            return Err(IngestError::ProviderNotFound(provider.to_string()));
        }
        let inbox: Vec<(&str, Vec<u8>)> =
            self.inbox.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
        let mut channel = MemoryChannel::new(&inbox);
        if let Some(gate) = &self.gate {
            channel = channel.gated(Arc::clone(gate));
        }
        if self.fail_open {
            channel = channel.failing_open();
        }
        if self.panic_on_upload {
            let config = provider_config("affirm", Some("secret"));
            let endpoint = InboxEndpoint::new(config, Box::new(channel), Arc::clone(&self.store) as Arc<dyn ObjectStore>);
            return Ok(Box::new(PanickingAdapter { endpoint }));
        }
        Ok(affirm(channel, Arc::clone(&self.store)))
    }

    fn names(&self) -> Vec<String> {
        vec!["affirm".to_string()]
    }
}
