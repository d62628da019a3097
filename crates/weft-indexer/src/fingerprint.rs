//! Module fingerprinting

use std::path::Path;
use std::time::UNIX_EPOCH;

use weft_core::Fingerprint;

/// A module read from disk together with its fingerprint.
#[derive(Debug, Clone)]
pub struct FingerprintedSource {
    pub fingerprint: Fingerprint,
    pub source: String,
}

/// Read `path` and fingerprint its raw bytes. Non UTF-8 bytes are replaced
/// in the returned source but the fingerprint covers the bytes as stored.
pub fn fingerprint_file(path: &Path) -> std::io::Result<FingerprintedSource> {
    let bytes = std::fs::read(path)?;
    let mtime_ms = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as u64);

    let fingerprint = Fingerprint::from_content(&bytes, mtime_ms);
    let source = match String::from_utf8(bytes) {
        Ok(source) => source,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    Ok(FingerprintedSource {
        fingerprint,
        source,
    })
}
