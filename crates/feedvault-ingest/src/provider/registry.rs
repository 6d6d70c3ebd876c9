//! Provider registry: name -> constructor
//!
//! Lookup is case-insensitive. Unknown names resolve to
//! [`IngestError::ProviderNotFound`] rather than panicking.

use feedvault_common::{IngestError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{AffirmAdapter, BloombergAdapter, InboxEndpoint, ProviderAdapter};
use crate::config::{IngestSettings, ProviderConfig};
use crate::storage::ObjectStore;
use crate::transfer::{SftpChannel, SftpEndpoint};

/// Builds a provider's adapter around its endpoint.
pub type AdapterFactory = fn(InboxEndpoint) -> Result<Box<dyn ProviderAdapter>>;

#[derive(Clone, Copy)]
pub struct ProviderEntry {
    pub name: &'static str,
    /// Upper-case prefix of the provider's configuration keys
    pub config_prefix: &'static str,
    pub factory: AdapterFactory,
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: BTreeMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every provider shipped with feedvault.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ProviderEntry {
            name: AffirmAdapter::NAME,
            config_prefix: AffirmAdapter::CONFIG_PREFIX,
            factory: |endpoint| Ok(Box::new(AffirmAdapter::new(endpoint)?)),
        });
        registry.register(ProviderEntry {
            name: BloombergAdapter::NAME,
            config_prefix: BloombergAdapter::CONFIG_PREFIX,
            factory: |endpoint| Ok(Box::new(BloombergAdapter::new(endpoint))),
        });
        registry
    }

    /// Add or replace a provider.
    pub fn register(&mut self, entry: ProviderEntry) {
        self.entries.insert(entry.name.to_lowercase(), entry);
    }

    pub fn get(&self, name: &str) -> Result<&ProviderEntry> {
        self.entries
            .get(&name.trim().to_lowercase())
            .ok_or_else(|| IngestError::ProviderNotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.values().map(|entry| entry.name).collect()
    }
}

/// Where the job store and CLI obtain ready-to-run adapters.
pub trait AdapterSource: Send + Sync {
    fn build(&self, provider: &str) -> Result<Box<dyn ProviderAdapter>>;

    fn names(&self) -> Vec<String>;
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Adapters wired to real SFTP sessions and the shared object store.
#[derive(Clone)]
pub struct Providers {
    registry: ProviderRegistry,
    settings: IngestSettings,
    store: Arc<dyn ObjectStore>,
    lookup: Lookup,
}

impl Providers {
    /// Provider configuration is read from the process environment.
    pub fn new(registry: ProviderRegistry, settings: IngestSettings, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            registry,
            settings,
            store,
            lookup: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }
}

impl AdapterSource for Providers {
    fn build(&self, provider: &str) -> Result<Box<dyn ProviderAdapter>> {
        let entry = self.registry.get(provider)?;
        let config = ProviderConfig::from_lookup(
            entry.name,
            entry.config_prefix,
            self.settings.environment,
            |key| (self.lookup)(key),
        )?;
        debug!(provider = entry.name, ?config, "Loaded provider config");

        let channel = SftpChannel::new(SftpEndpoint::new(&config, &self.settings));
        let endpoint = InboxEndpoint::new(config, Box::new(channel), Arc::clone(&self.store));
        (entry.factory)(endpoint)
    }

    fn names(&self) -> Vec<String> {
        self.registry.names().into_iter().map(String::from).collect()
    }
}
