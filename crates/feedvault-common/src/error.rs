//! Error taxonomy for provider runs

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while ingesting a provider's inbox.
///
/// Every variant keeps the underlying diagnostic text so it can be logged
/// and reported to the caller verbatim.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Session open or inbox listing failed; the run cannot proceed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single file could not be transferred.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether this error ends the whole run rather than a single file.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            IngestError::Connection(_) | IngestError::ProviderNotFound(_) | IngestError::Config(_)
        )
    }

    /// Short machine-friendly name of the variant, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Connection(_) => "connection",
            IngestError::Transport(_) => "transport",
            IngestError::Decryption(_) => "decryption",
            IngestError::Decompression(_) => "decompression",
            IngestError::Upload(_) => "upload",
            IngestError::ProviderNotFound(_) => "provider_not_found",
            IngestError::Config(_) => "config",
            IngestError::Io(_) => "io",
        }
    }
}
