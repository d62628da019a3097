//! Test utilities for weft-indexer

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use weft_core::{normalize_path, AnalysisMetadata, ContentHash, DiscoverySnapshot, Fingerprint};

use crate::analyzer::{AnalyzerHelper, ModuleAnalysis, ModuleAnalyzer, ModuleInput};
use crate::languages::TypeScriptAnalyzer;

/// A snapshot with no analysis results, as if `content` had been read from
/// `path`.
pub fn snapshot_for(path: &str, content: &str, metadata: &AnalysisMetadata) -> DiscoverySnapshot {
    let path = PathBuf::from(path);
    DiscoverySnapshot {
        normalized_path: normalize_path(&path),
        fingerprint: Fingerprint::from_content(content.as_bytes(), 0),
        signature: ContentHash::from_bytes(content.as_bytes()),
        metadata: metadata.clone(),
        definitions: Vec::new(),
        imports: Vec::new(),
        exports: Vec::new(),
        diagnostics: Vec::new(),
        analyzed_at_ms: 0,
        file_path: path,
    }
}

/// Write `files` (relative path, content) under a fresh temporary directory.
pub fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, content) in files {
        write_file(dir.path(), rel, content);
    }
    dir
}

pub fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Wraps the TypeScript analyzer and counts calls.
pub struct CountingAnalyzer {
    inner: TypeScriptAnalyzer,
    calls: AtomicUsize,
}

impl CountingAnalyzer {
    pub fn new() -> Self {
        CountingAnalyzer {
            inner: TypeScriptAnalyzer::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModuleAnalyzer for CountingAnalyzer {
    fn version(&self) -> &str {
        self.inner.version()
    }

    fn analyze(&self, input: &ModuleInput, helper: &AnalyzerHelper) -> Option<ModuleAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.analyze(input, helper)
    }
}

/// An analyzer that never succeeds.
pub struct FailingAnalyzer;

impl ModuleAnalyzer for FailingAnalyzer {
    fn version(&self) -> &str {
        "failing"
    }

    fn analyze(&self, _input: &ModuleInput, _helper: &AnalyzerHelper) -> Option<ModuleAnalysis> {
        None
    }
}
