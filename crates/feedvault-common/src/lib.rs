//! Feedvault Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the feedvault workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the ingestion error taxonomy shared by the pipeline and
//!   the HTTP surface
//! - **Logging**: tracing subscriber setup (console, rolling file, JSON)
//! - **Checksums**: SHA-256 helpers used when depositing artifacts
//!
//! # Example
//!
//! ```no_run
//! use feedvault_common::{checksum, IngestError, Result};
//!
//! fn digest(path: &str) -> Result<String> {
//!     let sum = checksum::sha256_file(path)?;
//!     Ok(sum)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{IngestError, Result};
