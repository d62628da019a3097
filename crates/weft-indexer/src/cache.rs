//! Discovery cache
//!
//! Entries are content addressed: each `(module path, fingerprint, analysis
//! metadata)` triple has its own slot, so snapshots produced under different
//! metadata coexist. A per-path index keeps the most recent keys of every
//! module for `peek` and `delete`, and bounds how many versions of one
//! module are retained.
//!
//! When the cache is opened on a directory, every stored snapshot is also
//! written to `<dir>/snapshots/<key digest>.snap` and warm-loaded on the next
//! open. Disk failures are logged and behave as misses; they never fail a
//! build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use weft_core::{normalize_path, AnalysisMetadata, ContentHash, DiscoverySnapshot, Fingerprint};

/// Subdirectory holding one file per cache entry.
pub const SNAPSHOT_DIR: &str = "snapshots";

/// File extension of cached snapshots.
pub const SNAPSHOT_EXT: &str = "snap";

/// Marker file describing the cache directory.
pub const CACHE_INDEX: &str = "index.json";

/// Versions of one module kept before the oldest is evicted.
pub const MAX_ENTRIES_PER_MODULE: usize = 4;

const SNAPSHOT_MAGIC: [u8; 4] = *b"WEFT";

/// Increment on breaking changes to the header, payload or file naming.
const SNAPSHOT_FORMAT_VERSION: u32 = 2;

/// Errors that can occur while persisting or reading cache entries.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid snapshot header in {path}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("{path} holds the entry for key {actual}, not {expected}")]
    MisplacedEntry {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

/// Lookup key: a module path at a given content and analysis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file_path: PathBuf,
    pub fingerprint: Fingerprint,
    pub metadata: AnalysisMetadata,
}

impl CacheKey {
    pub fn new(file_path: &Path, fingerprint: Fingerprint, metadata: &AnalysisMetadata) -> Self {
        CacheKey {
            file_path: file_path.to_path_buf(),
            fingerprint,
            metadata: metadata.clone(),
        }
    }

    /// The key `snapshot` is stored under.
    pub fn of(snapshot: &DiscoverySnapshot) -> Self {
        CacheKey::new(&snapshot.file_path, snapshot.fingerprint, &snapshot.metadata)
    }

    /// Content address of this key. Modification time is left out, matching
    /// [`Fingerprint::same_content`].
    pub fn digest(&self) -> ContentHash {
        let path = normalize_path(&self.file_path);
        let hash = self.fingerprint.hash.to_hex();
        let size = self.fingerprint.size_bytes.to_le_bytes();
        ContentHash::from_parts([
            path.as_bytes(),
            hash.as_bytes(),
            &size[..],
            self.metadata.schema_hash.as_bytes(),
            self.metadata.analyzer_version.as_bytes(),
        ])
    }

    pub fn matches(&self, snapshot: &DiscoverySnapshot) -> bool {
        snapshot.file_path == self.file_path
            && snapshot.fingerprint.same_content(&self.fingerprint)
            && snapshot.metadata == self.metadata
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: [u8; 4],
    format_version: u32,
    checksum: ContentHash,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    format_version: u32,
    weft_version: String,
    opened_at: String,
}

pub struct DiscoveryCache {
    entries: DashMap<ContentHash, Arc<DiscoverySnapshot>>,
    /// Keys stored for each module path, oldest first.
    by_path: DashMap<PathBuf, Vec<ContentHash>>,
    dir: Option<PathBuf>,
}

impl DiscoveryCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        DiscoveryCache {
            entries: DashMap::new(),
            by_path: DashMap::new(),
            dir: None,
        }
    }

    /// Open (or create) a persistent cache rooted at `dir` and warm-load
    /// every valid entry. Unreadable entries are removed.
    pub fn open(dir: &Path) -> Self {
        let cache = DiscoveryCache {
            dir: Some(dir.to_path_buf()),
            ..DiscoveryCache::in_memory()
        };

        if let Err(e) = cache.write_index() {
            tracing::warn!("Discovery cache disabled on disk: {}", e);
            return DiscoveryCache::in_memory();
        }

        let snapshot_dir = dir.join(SNAPSHOT_DIR);
        let Ok(read_dir) = std::fs::read_dir(&snapshot_dir) else {
            return cache;
        };
        let mut files: Vec<PathBuf> = read_dir
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXT))
            .collect();
        files.sort();

        for path in files {
            match read_entry(&path).and_then(|snapshot| check_placement(&path, snapshot)) {
                Ok((digest, snapshot)) => cache.index(digest, Arc::new(snapshot)),
                Err(e) => {
                    tracing::warn!("Ignoring cache entry {}: {}", path.display(), e);
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        tracing::debug!(
            "Discovery cache opened at {} with {} entries",
            dir.display(),
            cache.entries.len()
        );
        cache
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// The snapshot stored under `key`, if any.
    pub fn load(&self, key: &CacheKey) -> Option<Arc<DiscoverySnapshot>> {
        let entry = self.entries.get(&key.digest())?;
        key.matches(&entry).then(|| Arc::clone(entry.value()))
    }

    /// Store (or replace) the snapshot under its own key. Entries of the same
    /// module under other keys are kept, up to [`MAX_ENTRIES_PER_MODULE`].
    pub fn store(&self, snapshot: Arc<DiscoverySnapshot>) {
        let digest = CacheKey::of(&snapshot).digest();
        if let Some(dir) = &self.dir {
            if let Err(e) = write_entry(dir, &digest, &snapshot) {
                tracing::warn!(
                    "Failed to persist cache entry for {}: {}",
                    snapshot.file_path.display(),
                    e
                );
            }
        }
        self.index(digest, snapshot);
    }

    /// The most recently stored snapshot for `path`, whatever its key.
    pub fn peek(&self, path: &Path) -> Option<Arc<DiscoverySnapshot>> {
        let digest = *self.by_path.get(path)?.last()?;
        self.entries.get(&digest).map(|e| Arc::clone(e.value()))
    }

    /// Drop every entry of `path`. Returns the most recent one.
    pub fn delete(&self, path: &Path) -> Option<Arc<DiscoverySnapshot>> {
        let (_, digests) = self.by_path.remove(path)?;
        let mut latest = None;
        for digest in digests {
            if let Some(removed) = self.evict(&digest) {
                latest = Some(removed);
            }
        }
        latest
    }

    /// All stored snapshots, ordered by module path.
    pub fn entries(&self) -> Vec<Arc<DiscoverySnapshot>> {
        let mut out: Vec<(ContentHash, Arc<DiscoverySnapshot>)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        out.sort_by(|(ka, a), (kb, b)| a.file_path.cmp(&b.file_path).then(ka.cmp(kb)));
        out.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, on disk too.
    pub fn clear(&self) {
        self.entries.clear();
        self.by_path.clear();
        if let Some(dir) = &self.dir {
            let snapshot_dir = dir.join(SNAPSHOT_DIR);
            if let Err(e) = std::fs::remove_dir_all(&snapshot_dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to clear {}: {}", snapshot_dir.display(), e);
                }
            }
        }
    }

    fn index(&self, digest: ContentHash, snapshot: Arc<DiscoverySnapshot>) {
        let overflow: Vec<ContentHash> = {
            let mut keys = self.by_path.entry(snapshot.file_path.clone()).or_default();
            keys.retain(|k| *k != digest);
            keys.push(digest);
            let excess = keys.len().saturating_sub(MAX_ENTRIES_PER_MODULE);
            keys.drain(..excess).collect()
        };
        self.entries.insert(digest, snapshot);
        for old in overflow {
            self.evict(&old);
        }
    }

    /// Remove one entry from memory and disk, leaving the path index alone.
    fn evict(&self, digest: &ContentHash) -> Option<Arc<DiscoverySnapshot>> {
        if let Some(dir) = &self.dir {
            let file = entry_path(dir, digest);
            if let Err(e) = std::fs::remove_file(&file) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to delete cache entry {}: {}", file.display(), e);
                }
            }
        }
        self.entries.remove(digest).map(|(_, snapshot)| snapshot)
    }

    fn write_index(&self) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let index = CacheIndex {
            format_version: SNAPSHOT_FORMAT_VERSION,
            weft_version: env!("CARGO_PKG_VERSION").to_string(),
            opened_at: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&index).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let path = dir.join(CACHE_INDEX);
        std::fs::write(&path, json).map_err(|e| CacheError::Io { path, source: e })
    }
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// File holding the entry with key `digest`.
fn entry_path(dir: &Path, digest: &ContentHash) -> PathBuf {
    dir.join(SNAPSHOT_DIR)
        .join(format!("{}.{}", digest.to_hex(), SNAPSHOT_EXT))
}

/// A file must be named after the key of the snapshot it holds.
fn check_placement(
    path: &Path,
    snapshot: DiscoverySnapshot,
) -> Result<(ContentHash, DiscoverySnapshot), CacheError> {
    let digest = CacheKey::of(&snapshot).digest();
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if stem != digest.to_hex() {
        return Err(CacheError::MisplacedEntry {
            path: path.to_path_buf(),
            expected: stem.to_string(),
            actual: digest.to_hex(),
        });
    }
    Ok((digest, snapshot))
}

fn write_entry(dir: &Path, digest: &ContentHash, snapshot: &DiscoverySnapshot) -> Result<(), CacheError> {
    let snapshot_dir = dir.join(SNAPSHOT_DIR);
    std::fs::create_dir_all(&snapshot_dir).map_err(|e| CacheError::Io {
        path: snapshot_dir.clone(),
        source: e,
    })?;

    let payload = bincode::serialize(snapshot).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    let header = SnapshotHeader {
        magic: SNAPSHOT_MAGIC,
        format_version: SNAPSHOT_FORMAT_VERSION,
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serialize(&header).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;

    // 4-byte header length (little-endian) + header + payload
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);

    let path = entry_path(dir, digest);
    std::fs::write(&path, &output).map_err(|e| CacheError::Io { path, source: e })
}

fn read_entry(path: &Path) -> Result<DiscoverySnapshot, CacheError> {
    let raw = std::fs::read(path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let invalid = |reason: &str| CacheError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("truncated header length"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = raw
        .get(4..4 + header_len)
        .ok_or_else(|| invalid("truncated header"))?;
    let header: SnapshotHeader =
        bincode::deserialize(header_bytes).map_err(|e| invalid(&e.to_string()))?;

    if header.magic != SNAPSHOT_MAGIC {
        return Err(invalid("bad magic bytes"));
    }
    if header.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            path: path.to_path_buf(),
            expected: SNAPSHOT_FORMAT_VERSION,
            actual: header.format_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum.to_hex(),
            actual: actual.to_hex(),
        });
    }

    bincode::deserialize(payload).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot_for;
    use tempfile::TempDir;

    fn metadata() -> AnalysisMetadata {
        AnalysisMetadata::new("schema-1", "test")
    }

    #[test]
    fn hit_requires_fingerprint_and_metadata() {
        let cache = DiscoveryCache::in_memory();
        let snapshot = snapshot_for("/src/a.ts", "export const a = 1;", &metadata());
        let fingerprint = snapshot.fingerprint;
        cache.store(Arc::new(snapshot));

        let key = CacheKey::new(Path::new("/src/a.ts"), fingerprint, &metadata());
        assert!(cache.load(&key).is_some());

        let other_meta = CacheKey::new(
            Path::new("/src/a.ts"),
            fingerprint,
            &AnalysisMetadata::new("schema-2", "test"),
        );
        assert!(cache.load(&other_meta).is_none());

        let other_content = CacheKey::new(
            Path::new("/src/a.ts"),
            Fingerprint::from_content(b"changed", 0),
            &metadata(),
        );
        assert!(cache.load(&other_content).is_none());
        assert!(cache.peek(Path::new("/src/a.ts")).is_some());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let cache = DiscoveryCache::open(dir.path());
            cache.store(Arc::new(snapshot_for("/src/a.ts", "a", &metadata())));
            cache.store(Arc::new(snapshot_for("/src/b.ts", "b", &metadata())));
        }
        assert!(dir.path().join(CACHE_INDEX).exists());

        let reopened = DiscoveryCache::open(dir.path());
        assert_eq!(reopened.len(), 2);
        let paths: Vec<PathBuf> = reopened.entries().iter().map(|s| s.file_path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/src/a.ts"), PathBuf::from("/src/b.ts")]);
        let restored = reopened.peek(Path::new("/src/a.ts")).unwrap();
        assert_eq!(*restored, snapshot_for("/src/a.ts", "a", &metadata()));
    }

    #[test]
    fn corrupt_entries_are_misses() {
        let dir = TempDir::new().unwrap();
        {
            let cache = DiscoveryCache::open(dir.path());
            cache.store(Arc::new(snapshot_for("/src/a.ts", "a", &metadata())));
        }
        let digest = CacheKey::of(&snapshot_for("/src/a.ts", "a", &metadata())).digest();
        let file = entry_path(dir.path(), &digest);
        let mut bytes = std::fs::read(&file).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&file, bytes).unwrap();

        assert!(matches!(read_entry(&file), Err(CacheError::ChecksumMismatch { .. })));
        let reopened = DiscoveryCache::open(dir.path());
        assert!(reopened.is_empty());
    }

    #[test]
    fn truncated_entry_is_invalid() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.snap");
        std::fs::write(&file, [1u8, 0]).unwrap();
        assert!(matches!(read_entry(&file), Err(CacheError::InvalidHeader { .. })));
    }

    #[test]
    fn delete_and_clear_remove_files() {
        let dir = TempDir::new().unwrap();
        let cache = DiscoveryCache::open(dir.path());
        cache.store(Arc::new(snapshot_for("/src/a.ts", "a", &metadata())));
        cache.store(Arc::new(snapshot_for("/src/b.ts", "b", &metadata())));

        let key_a = CacheKey::of(&snapshot_for("/src/a.ts", "a", &metadata())).digest();
        let key_b = CacheKey::of(&snapshot_for("/src/b.ts", "b", &metadata())).digest();

        assert!(cache.delete(Path::new("/src/a.ts")).is_some());
        assert!(!entry_path(dir.path(), &key_a).exists());
        assert!(entry_path(dir.path(), &key_b).exists());
        assert!(cache.peek(Path::new("/src/a.ts")).is_none());

        cache.clear();
        assert!(cache.is_empty());
        assert!(!dir.path().join(SNAPSHOT_DIR).exists());
    }

    #[test]
    fn entries_under_other_metadata_coexist() {
        let dir = TempDir::new().unwrap();
        let schema_b = AnalysisMetadata::new("schema-2", "test");
        let under_a = snapshot_for("/src/a.ts", "export const a = 1;", &metadata());
        let under_b = snapshot_for("/src/a.ts", "export const a = 1;", &schema_b);
        let (key_a, key_b) = (CacheKey::of(&under_a), CacheKey::of(&under_b));
        assert_ne!(key_a.digest(), key_b.digest());

        let cache = DiscoveryCache::open(dir.path());
        cache.store(Arc::new(under_a));
        cache.store(Arc::new(under_b));

        assert!(cache.load(&key_a).is_some());
        assert!(cache.load(&key_b).is_some());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(Path::new("/src/a.ts")).unwrap().metadata, schema_b);

        let reopened = DiscoveryCache::open(dir.path());
        assert!(reopened.load(&key_a).is_some());
        assert!(reopened.load(&key_b).is_some());

        assert!(reopened.delete(Path::new("/src/a.ts")).is_some());
        assert!(reopened.is_empty());
        assert_eq!(std::fs::read_dir(dir.path().join(SNAPSHOT_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn oldest_versions_of_a_module_are_evicted() {
        let cache = DiscoveryCache::in_memory();
        let keys: Vec<CacheKey> = (0..=MAX_ENTRIES_PER_MODULE)
            .map(|i| {
                let snapshot = snapshot_for("/src/a.ts", &format!("export const a = {i};"), &metadata());
                let key = CacheKey::of(&snapshot);
                cache.store(Arc::new(snapshot));
                key
            })
            .collect();

        assert_eq!(cache.len(), MAX_ENTRIES_PER_MODULE);
        assert!(cache.load(&keys[0]).is_none());
        assert!(keys[1..].iter().all(|key| cache.load(key).is_some()));
    }

    #[test]
    fn misplaced_files_are_dropped_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let cache = DiscoveryCache::open(dir.path());
            cache.store(Arc::new(snapshot_for("/src/a.ts", "a", &metadata())));
        }
        let digest = CacheKey::of(&snapshot_for("/src/a.ts", "a", &metadata())).digest();
        let renamed = dir.path().join(SNAPSHOT_DIR).join(format!("{}.{}", "0".repeat(32), SNAPSHOT_EXT));
        std::fs::rename(entry_path(dir.path(), &digest), &renamed).unwrap();

        let reopened = DiscoveryCache::open(dir.path());
        assert!(reopened.is_empty());
        assert!(!renamed.exists());
    }

    #[test]
    fn error_display() {
        let err = CacheError::VersionMismatch {
            path: PathBuf::from("old.snap"),
            expected: 2,
            actual: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("got 1"));
    }
}
