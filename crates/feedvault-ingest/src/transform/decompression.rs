//! Decompression of fetched artifacts
//!
//! # Supported Formats
//!
//! - **Gzip** (.gz): single member, via flate2
//! - **Tar.gz** (.tar.gz, .tgz): gzip + tar, must hold exactly one regular file
//!
//! Both functions are blocking and stream from disk to disk.

use feedvault_common::{IngestError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Decompress a gzip file into `output`.
///
/// Returns the number of decompressed bytes written.
pub fn gunzip_file(input: &Path, output: &Path) -> Result<u64> {
    let result = (|| -> std::io::Result<u64> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(input)?));
        let mut writer = BufWriter::new(File::create(output)?);
        let bytes = std::io::copy(&mut decoder, &mut writer)?;
        writer.flush()?;
        Ok(bytes)
    })();

    match result {
        Ok(bytes) => {
            debug!("Decompressed {} -> {} bytes", input.display(), bytes);
            Ok(bytes)
        },
        Err(e) => {
            remove_partial(output);
            Err(IngestError::Decompression(format!(
                "Failed to decompress gzip data from {}: {}",
                input.display(),
                e
            )))
        },
    }
}

/// Extract the single regular file held by a tar.gz archive into `output`.
///
/// Directory entries are ignored. Any other entry type, or a regular-file
/// count other than one, is rejected.
pub fn extract_single_tar_gz(input: &Path, output: &Path) -> Result<u64> {
    let result = extract_single_entry(input, output);
    if result.is_err() {
        remove_partial(output);
    }
    result
}

fn extract_single_entry(input: &Path, output: &Path) -> Result<u64> {
    let fail = |msg: String| IngestError::Decompression(format!("{}: {}", input.display(), msg));

    let file = File::open(input).map_err(|e| fail(format!("cannot open archive: {}", e)))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut extracted: Option<(String, u64)> = None;
    let entries = archive
        .entries()
        .map_err(|e| fail(format!("failed to read tar entries: {}", e)))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| fail(format!("failed to read tar entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| fail(format!("failed to get entry path: {}", e)))?
            .to_string_lossy()
            .to_string();

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            continue;
        }
        if !kind.is_file() {
            return Err(fail(format!("entry {} is not a regular file", path)));
        }
        if let Some((first, _)) = &extracted {
            return Err(fail(format!(
                "archive holds more than one file ({}, {})",
                first, path
            )));
        }

        let mut writer = BufWriter::new(
            File::create(output).map_err(|e| fail(format!("cannot create output: {}", e)))?,
        );
        let bytes = std::io::copy(&mut entry, &mut writer)
            .and_then(|bytes| writer.flush().map(|_| bytes))
            .map_err(|e| fail(format!("failed to read tar entry {}: {}", path, e)))?;
        debug!("Extracted {} ({} bytes)", path, bytes);
        extracted = Some((path, bytes));
    }

    extracted
        .map(|(_, bytes)| bytes)
        .ok_or_else(|| fail("archive holds no regular file".to_string()))
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            debug!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}
