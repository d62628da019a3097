//! Module discovery
//!
//! Breadth-first traversal from the entry modules along runtime import
//! edges. Each module reached is fingerprinted and either served from the
//! discovery cache (hit) or analyzed and stored (miss, or skip when the
//! caller invalidated a module whose cache entry still matched).

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use weft_core::{
    normalize_lexically, normalize_path, resolve_specifier, AnalysisMetadata, ContentHash,
    Diagnostic, DiscoverySnapshot, Resolution, SnapshotMap,
};

use crate::analyzer::{AnalyzerHelper, ModuleAnalysis, ModuleAnalyzer, ModuleInput};
use crate::cache::{CacheKey, DiscoveryCache};
use crate::fingerprint::{fingerprint_file, FingerprintedSource};

/// Diagnostic codes attached by discovery itself.
pub mod codes {
    pub const UNRESOLVED_IMPORT: &str = "unresolved-import";
    pub const UNREADABLE_MODULE: &str = "unreadable-module";
    pub const ANALYSIS_FAILED: &str = "analysis-failed";
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("entry module not found: {}", path.display())]
    EntryNotFound { path: PathBuf },
}

pub struct DiscoveryRequest<'a> {
    pub entry_paths: &'a [PathBuf],
    pub analyzer: &'a dyn ModuleAnalyzer,
    pub helper: &'a AnalyzerHelper,
    pub cache: &'a DiscoveryCache,
    pub metadata: &'a AnalysisMetadata,
    /// Modules to re-analyze even when their cache entry matches.
    pub invalidated_paths: BTreeSet<PathBuf>,
    /// Modules the caller already holds. They bound the traversal and are
    /// not part of the result unless also invalidated.
    pub known_paths: BTreeSet<PathBuf>,
}

impl<'a> DiscoveryRequest<'a> {
    pub fn new(
        entry_paths: &'a [PathBuf],
        analyzer: &'a dyn ModuleAnalyzer,
        helper: &'a AnalyzerHelper,
        cache: &'a DiscoveryCache,
        metadata: &'a AnalysisMetadata,
    ) -> Self {
        DiscoveryRequest {
            entry_paths,
            analyzer,
            helper,
            cache,
            metadata,
            invalidated_paths: BTreeSet::new(),
            known_paths: BTreeSet::new(),
        }
    }

    pub fn invalidate(mut self, paths: BTreeSet<PathBuf>) -> Self {
        self.invalidated_paths = paths;
        self
    }

    pub fn known(mut self, paths: BTreeSet<PathBuf>) -> Self {
        self.known_paths = paths;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub snapshots: SnapshotMap,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_skips: usize,
}

pub fn discover_modules(request: &DiscoveryRequest<'_>) -> Result<DiscoveryResult, DiscoveryError> {
    // Entries share one spelling with resolved import targets.
    let entries: Vec<PathBuf> = request
        .entry_paths
        .iter()
        .map(|entry| normalize_lexically(entry))
        .collect();
    for entry in &entries {
        if !entry.is_file() {
            return Err(DiscoveryError::EntryNotFound {
                path: entry.clone(),
            });
        }
    }

    let mut result = DiscoveryResult::default();
    let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
    let mut queue: VecDeque<PathBuf> = entries.into_iter().collect();

    while let Some(path) = queue.pop_front() {
        if !visited.insert(path.clone()) {
            continue;
        }
        if request.known_paths.contains(&path) && !request.invalidated_paths.contains(&path) {
            continue;
        }

        let snapshot = discover_one(&path, request, &mut result);

        let mut missing = Vec::new();
        for specifier in snapshot.runtime_specifiers() {
            match resolve_specifier(&path, specifier, |candidate| candidate.is_file()) {
                Resolution::Resolved(target) => {
                    if !visited.contains(&target) {
                        queue.push_back(target);
                    }
                }
                Resolution::Missing(_) => missing.push(specifier.to_string()),
                Resolution::External => {}
            }
        }

        let snapshot = if missing.is_empty() {
            snapshot
        } else {
            let mut annotated = (*snapshot).clone();
            for specifier in missing {
                annotated.diagnostics.push(Diagnostic::warning(
                    codes::UNRESOLVED_IMPORT,
                    format!("cannot resolve \"{specifier}\""),
                ));
            }
            Arc::new(annotated)
        };

        result.snapshots.insert(path, snapshot);
    }

    tracing::info!(
        "Discovered {} modules ({} hits, {} misses, {} skips)",
        result.snapshots.len(),
        result.cache_hits,
        result.cache_misses,
        result.cache_skips
    );
    Ok(result)
}

fn discover_one(
    path: &Path,
    request: &DiscoveryRequest<'_>,
    result: &mut DiscoveryResult,
) -> Arc<DiscoverySnapshot> {
    let source = match fingerprint_file(path) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", path.display(), e);
            result.cache_misses += 1;
            return Arc::new(unreadable_snapshot(path, request.metadata, &e));
        }
    };

    let key = CacheKey::new(path, source.fingerprint, request.metadata);
    let cached = request.cache.load(&key);
    let forced = request.invalidated_paths.contains(path);

    match cached {
        Some(snapshot) if !forced => {
            tracing::debug!("Cache hit: {}", path.display());
            result.cache_hits += 1;
            snapshot
        }
        cached => {
            if cached.is_some() {
                tracing::debug!("Cache skip (invalidated): {}", path.display());
                result.cache_skips += 1;
            } else {
                tracing::debug!("Cache miss: {}", path.display());
                result.cache_misses += 1;
            }
            let snapshot = Arc::new(analyze_module(path, source, request));
            request.cache.store(Arc::clone(&snapshot));
            snapshot
        }
    }
}

fn analyze_module(
    path: &Path,
    source: FingerprintedSource,
    request: &DiscoveryRequest<'_>,
) -> DiscoverySnapshot {
    let FingerprintedSource {
        fingerprint,
        source,
    } = source;
    let signature = ContentHash::from_bytes(source.as_bytes());
    let input = ModuleInput {
        file_path: path.to_path_buf(),
        source,
    };

    let (analysis, failure) = match request.analyzer.analyze(&input, request.helper) {
        Some(analysis) => (analysis, None),
        None => (
            ModuleAnalysis::default(),
            Some(Diagnostic::error(
                codes::ANALYSIS_FAILED,
                format!("analyzer {} could not analyze this module", request.analyzer.version()),
            )),
        ),
    };

    let mut diagnostics = analysis.diagnostics;
    diagnostics.extend(failure);

    DiscoverySnapshot {
        file_path: path.to_path_buf(),
        normalized_path: normalize_path(path),
        fingerprint,
        signature,
        metadata: request.metadata.clone(),
        definitions: analysis.definitions,
        imports: analysis.imports,
        exports: analysis.exports,
        diagnostics,
        analyzed_at_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
    }
}

fn unreadable_snapshot(
    path: &Path,
    metadata: &AnalysisMetadata,
    error: &std::io::Error,
) -> DiscoverySnapshot {
    DiscoverySnapshot {
        file_path: path.to_path_buf(),
        normalized_path: normalize_path(path),
        fingerprint: weft_core::Fingerprint::from_content(&[], 0),
        signature: ContentHash::default(),
        metadata: metadata.clone(),
        definitions: Vec::new(),
        imports: Vec::new(),
        exports: Vec::new(),
        diagnostics: vec![Diagnostic::error(
            codes::UNREADABLE_MODULE,
            format!("cannot read module: {error}"),
        )],
        analyzed_at_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
    }
}
