//! Filename conventions shared by the transform stage, the dedup tracker
//! and destination key layout.
//!
//! Everything here is suffix inspection; file contents are never sniffed.

/// Remote directory holding a provider's pending files.
pub const INBOX_DIR: &str = "inbox";

/// Detached signatures sit next to the file they sign and are never processed.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Root of every destination key.
pub const DESTINATION_ROOT: &str = "data";

const ENCRYPTION_SUFFIXES: &[&str] = &[".gpg", ".pgp"];

/// Longest suffix first so `.tar.gz` is never mistaken for `.gz`.
const COMPRESSION_SUFFIXES: &[(&str, Compression)] = &[
    (".tar.gz", Compression::TarGzip),
    (".tgz", Compression::TarGzip),
    (".gz", Compression::Gzip),
];

/// Recognized compression layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    TarGzip,
}

/// Last path segment of a remote path or object key.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn is_signature(name: &str) -> bool {
    has_suffix(name, SIGNATURE_SUFFIX)
}

/// The name with its encryption suffix removed, if it has one.
pub fn strip_encryption(name: &str) -> Option<&str> {
    ENCRYPTION_SUFFIXES
        .iter()
        .find_map(|suffix| strip_suffix(name, suffix))
}

/// The name with its compression suffix removed, and the layer it denotes.
pub fn strip_compression(name: &str) -> Option<(&str, Compression)> {
    COMPRESSION_SUFFIXES
        .iter()
        .find_map(|(suffix, kind)| strip_suffix(name, suffix).map(|stem| (stem, *kind)))
}

/// The name a remote file ends up with once decrypted and decompressed.
///
/// `a.csv.gz.gpg` -> `a.csv`, `b.xml.gz` -> `b.xml`, `c.pdf` -> `c.pdf`.
pub fn final_name(name: &str) -> &str {
    let name = basename(name);
    let decrypted = strip_encryption(name).unwrap_or(name);
    strip_compression(decrypted)
        .map(|(stem, _)| stem)
        .unwrap_or(decrypted)
}

/// The whole extension chain of a name, e.g. `.csv.gz.gpg`.
pub fn extension_chain(name: &str) -> &str {
    let name = basename(name);
    match name.trim_start_matches('.').find('.') {
        Some(idx) => &name[idx + (name.len() - name.trim_start_matches('.').len())..],
        None => "",
    }
}

/// Type subfolder chosen from the final file extension.
pub fn type_subfolder(final_name: &str) -> &'static str {
    match extension(final_name).as_deref() {
        Some("csv") => "csv",
        Some("pdf") => "pdf",
        Some("xml") => "xml",
        _ => "other",
    }
}

/// `data/<type>/<provider-subfolder>/<final name>`
pub fn destination_key(provider_subfolder: &str, final_name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        DESTINATION_ROOT,
        type_subfolder(final_name),
        provider_subfolder.trim_matches('/'),
        final_name
    )
}

/// MIME type for keys whose extension we recognize.
pub fn content_type(key: &str) -> Option<&'static str> {
    match extension(basename(key)).as_deref() {
        Some("csv") => Some("text/csv"),
        Some("pdf") => Some("application/pdf"),
        Some("xml") => Some("application/xml"),
        _ => None,
    }
}

fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn has_suffix(name: &str, suffix: &str) -> bool {
    name.len() > suffix.len() && name.to_ascii_lowercase().ends_with(suffix)
}

/// Case-insensitive suffix strip that refuses to leave an empty stem.
fn strip_suffix<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if has_suffix(name, suffix) {
        Some(&name[..name.len() - suffix.len()])
    } else {
        None
    }
}
