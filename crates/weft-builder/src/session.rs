//! Builder session
//!
//! A session owns the committed build state: snapshots, the dependency graph
//! with its indexes, the chunk manifest and the last artifact. Every build
//! runs against a scratch copy of that state and replaces it only once all
//! steps succeeded, so a failed build leaves the previous result in place.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use weft_core::resolve::candidates;
use weft_core::{
    apply_graph_patch, build_dependency_graph_for, collect_affected_modules,
    diff_chunk_manifests, diff_dependency_graphs, drop_removed_files, normalize_lexically,
    plan_chunks, reachable_modules, specifier_bases, AnalysisMetadata, BuildState, ChunkDiff,
    ChunkManifest,
};
use weft_indexer::{
    discover_modules, fingerprint_file, AnalyzerHelper, DiscoveryCache, DiscoveryRequest,
    DiscoveryResult, ModuleAnalyzer,
};

use crate::artifact::{ArtifactBuilder, ArtifactRequest, BuildStats, BuilderArtifact};
use crate::error::BuildError;
use crate::prebuild::PrebuildSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInput {
    pub entries: Vec<PathBuf>,
    pub metadata: AnalysisMetadata,
}

impl BuildInput {
    /// Entries with `.` and `..` components resolved, sorted and without
    /// duplicates. Two spellings of the same entry set compare equal.
    pub fn normalized(self) -> Self {
        let entries: BTreeSet<PathBuf> = self.entries.iter().map(|p| normalize_lexically(p)).collect();
        BuildInput {
            entries: entries.into_iter().collect(),
            metadata: self.metadata,
        }
    }
}

/// File changes since the last build, as reported by a watcher or derived
/// by [`BuilderSession::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub added: Vec<PathBuf>,
    pub updated: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub metadata: AnalysisMetadata,
}

impl Changeset {
    pub fn new(metadata: AnalysisMetadata) -> Self {
        Changeset {
            metadata,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// The same changes with every path spelled the way snapshots are keyed.
    pub fn normalized(self) -> Self {
        let normalize = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
            paths.iter().map(|p| normalize_lexically(p)).collect()
        };
        Changeset {
            added: normalize(self.added),
            updated: normalize(self.updated),
            removed: normalize(self.removed),
            metadata: self.metadata,
        }
    }
}

struct Committed {
    input: BuildInput,
    state: BuildState,
    chunks: ChunkManifest,
    chunk_diff: ChunkDiff,
    artifact: Arc<BuilderArtifact>,
}

pub struct BuilderSession {
    analyzer: Arc<dyn ModuleAnalyzer>,
    helper: AnalyzerHelper,
    cache: Arc<DiscoveryCache>,
    builder: ArtifactBuilder,
    committed: Option<Committed>,
    generation: u64,
}

impl BuilderSession {
    pub fn new(
        analyzer: Arc<dyn ModuleAnalyzer>,
        cache: Arc<DiscoveryCache>,
        prebuild: Arc<dyn PrebuildSource>,
    ) -> Self {
        BuilderSession {
            analyzer,
            helper: AnalyzerHelper::new(),
            cache,
            builder: ArtifactBuilder::new(prebuild),
            committed: None,
            generation: 0,
        }
    }

    pub fn with_helper(mut self, helper: AnalyzerHelper) -> Self {
        self.helper = helper;
        self
    }

    /// Number of successful builds since creation or the last reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_artifact(&self) -> Option<Arc<BuilderArtifact>> {
        self.committed.as_ref().map(|c| Arc::clone(&c.artifact))
    }

    pub fn chunk_manifest(&self) -> Option<&ChunkManifest> {
        self.committed.as_ref().map(|c| &c.chunks)
    }

    /// Chunks the last committed build added, changed or removed.
    pub fn last_chunk_diff(&self) -> Option<&ChunkDiff> {
        self.committed.as_ref().map(|c| &c.chunk_diff)
    }

    pub fn state(&self) -> Option<&BuildState> {
        self.committed.as_ref().map(|c| &c.state)
    }

    pub fn entries(&self) -> Option<&[PathBuf]> {
        self.committed.as_ref().map(|c| c.input.entries.as_slice())
    }

    pub fn cache(&self) -> &Arc<DiscoveryCache> {
        &self.cache
    }

    /// Forget all in-memory state. The discovery cache is left alone.
    pub fn reset(&mut self) {
        self.committed = None;
        self.generation = 0;
    }

    /// Build everything reachable from `input.entries` from scratch.
    pub async fn build_initial(&mut self, input: BuildInput) -> Result<Arc<BuilderArtifact>, BuildError> {
        let input = input.normalized();
        let started = Instant::now();
        let generation = self.generation + 1;
        tracing::info!(
            "Full build from {} entries (generation {})",
            input.entries.len(),
            generation
        );

        let discovery = discover_modules(&DiscoveryRequest::new(
            &input.entries,
            self.analyzer.as_ref(),
            &self.helper,
            &self.cache,
            &input.metadata,
        ))?;
        let stats = stats_of(&discovery);
        let state = BuildState::new(discovery.snapshots);

        let chunks = plan_chunks(&state.graph.graph, generation);
        let empty = ChunkManifest::default();
        let previous_chunks = self.committed.as_ref().map_or(&empty, |c| &c.chunks);
        let chunk_diff = diff_chunk_manifests(previous_chunks, &chunks);

        let artifact = self
            .builder
            .build(ArtifactRequest {
                graph: &state.graph.graph,
                snapshots: &state.snapshots,
                changed_modules: None,
                previous: None,
                stats,
                started,
                generation,
                metadata: &input.metadata,
            })
            .await?;
        let artifact = Arc::new(artifact);

        tracing::info!(
            "Built {} elements from {} modules in {}ms",
            artifact.elements.len(),
            state.snapshots.len(),
            artifact.report.duration_ms
        );

        self.committed = Some(Committed {
            input,
            state,
            chunks,
            chunk_diff,
            artifact: Arc::clone(&artifact),
        });
        self.generation = generation;
        Ok(artifact)
    }

    /// Apply `changeset` to the committed build.
    pub async fn update(&mut self, changeset: Changeset) -> Result<Arc<BuilderArtifact>, BuildError> {
        let changeset = changeset.normalized();
        let Some(committed) = self.committed.as_ref() else {
            return Err(BuildError::NotInitialized);
        };

        if committed.input.metadata != changeset.metadata {
            tracing::info!("Analysis metadata changed, rebuilding from scratch");
            let input = BuildInput {
                entries: committed.input.entries.clone(),
                metadata: changeset.metadata,
            };
            return self.build_initial(input).await;
        }

        let started = Instant::now();
        let entries = committed.input.entries.clone();
        let mut scratch = committed.state.clone();

        let mut removed: BTreeSet<PathBuf> = changeset
            .removed
            .iter()
            .filter(|p| scratch.snapshots.contains_key(*p))
            .cloned()
            .collect();
        let mut added: BTreeSet<PathBuf> = BTreeSet::new();
        let mut updated: BTreeSet<PathBuf> = BTreeSet::new();
        for path in &changeset.updated {
            if changeset.removed.contains(path) {
                continue;
            }
            if !scratch.snapshots.contains_key(path) {
                // Edits to untracked files may satisfy a missing import.
                added.insert(path.clone());
            } else if path.is_file() {
                updated.insert(path.clone());
            } else {
                removed.insert(path.clone());
            }
        }
        added.extend(
            changeset
                .added
                .iter()
                .filter(|p| !changeset.removed.contains(*p) && !scratch.snapshots.contains_key(*p))
                .cloned(),
        );
        // A tracked module reported as added was rewritten.
        updated.extend(
            changeset
                .added
                .iter()
                .filter(|p| scratch.snapshots.contains_key(*p) && !removed.contains(*p))
                .cloned(),
        );

        let adjacency = &scratch.graph.module_adjacency;
        let mut affected = collect_affected_modules(updated.iter().chain(&added), adjacency);

        let bases: BTreeSet<PathBuf> = added.iter().flat_map(|p| specifier_bases(p)).collect();
        let satisfied: Vec<PathBuf> = scratch
            .graph
            .graph
            .modules()
            .filter(|summary| summary.unresolved.iter().any(|b| bases.contains(b)))
            .map(|summary| summary.file_path.clone())
            .collect();
        affected.extend(collect_affected_modules(&satisfied, adjacency));

        let importers = drop_removed_files(&removed, &mut scratch);
        affected.extend(collect_affected_modules(&importers, &scratch.graph.module_adjacency));
        affected.retain(|p| !removed.contains(p));

        if affected.is_empty() && removed.is_empty() {
            tracing::debug!("Changeset affects no tracked module, keeping generation {}", self.generation);
            return Ok(Arc::clone(&committed.artifact));
        }

        let generation = self.generation + 1;
        tracing::info!(
            "Incremental build: {} added, {} updated, {} removed, {} affected (generation {})",
            added.len(),
            updated.len(),
            removed.len(),
            affected.len(),
            generation
        );

        let known: BTreeSet<PathBuf> = scratch
            .snapshots
            .keys()
            .filter(|p| !affected.contains(*p))
            .cloned()
            .collect();
        let roots: Vec<PathBuf> = entries
            .iter()
            .chain(affected.iter().filter(|p| scratch.snapshots.contains_key(*p)))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let discovery = discover_modules(
            &DiscoveryRequest::new(
                &roots,
                self.analyzer.as_ref(),
                &self.helper,
                &self.cache,
                &changeset.metadata,
            )
            .invalidate(affected.clone())
            .known(known),
        )?;
        let stats = stats_of(&discovery);

        let mut changed = affected;
        for (path, snapshot) in discovery.snapshots {
            changed.insert(path.clone());
            scratch.snapshots.insert(path, snapshot);
        }

        let reachable = reachable_modules(&scratch.snapshots, &entries);
        let unreachable: Vec<PathBuf> = scratch
            .snapshots
            .keys()
            .filter(|p| !reachable.contains(*p))
            .cloned()
            .collect();
        for path in unreachable {
            tracing::debug!("Pruning unreachable module {}", path.display());
            scratch.snapshots.remove(&path);
            changed.insert(path);
        }

        let old_graph = scratch.graph.graph.restrict_to(&changed);
        let new_graph = build_dependency_graph_for(&scratch.snapshots, &changed);
        let diff = diff_dependency_graphs(&old_graph, &new_graph);
        apply_graph_patch(&mut scratch.graph, &diff);

        let chunks = plan_chunks(&scratch.graph.graph, generation);
        let chunk_diff = diff_chunk_manifests(&committed.chunks, &chunks);

        let snapshots_unchanged = changed
            .iter()
            .all(|p| scratch.snapshots.get(p) == committed.state.snapshots.get(p));
        if snapshots_unchanged && diff.is_empty() && chunk_diff.is_empty() {
            tracing::debug!(
                "Rebuild of {} modules changed nothing, keeping generation {}",
                changed.len(),
                self.generation
            );
            return Ok(Arc::clone(&committed.artifact));
        }

        let artifact = self
            .builder
            .build(ArtifactRequest {
                graph: &scratch.graph.graph,
                snapshots: &scratch.snapshots,
                changed_modules: Some(&changed),
                previous: Some(&committed.artifact),
                stats,
                started,
                generation,
                metadata: &changeset.metadata,
            })
            .await?;
        let artifact = Arc::new(artifact);

        tracing::info!(
            "Rebuilt {} modules: graph +{} ~{} -{}, chunks +{} ~{} -{} in {}ms",
            changed.len(),
            diff.added.len(),
            diff.updated.len(),
            diff.removed.len(),
            chunk_diff.added.len(),
            chunk_diff.updated.len(),
            chunk_diff.removed.len(),
            artifact.report.duration_ms
        );

        self.committed = Some(Committed {
            input: BuildInput {
                entries,
                metadata: changeset.metadata,
            },
            state: scratch,
            chunks,
            chunk_diff,
            artifact: Arc::clone(&artifact),
        });
        self.generation = generation;
        Ok(artifact)
    }

    /// Build `input`, incrementally when the session already holds a build
    /// of the same entries and metadata. Changes are found by
    /// re-fingerprinting every tracked module.
    pub async fn build(&mut self, input: BuildInput) -> Result<Arc<BuilderArtifact>, BuildError> {
        let input = input.normalized();
        let changeset = match self.committed.as_ref() {
            Some(committed) if committed.input == input => {
                detect_changes(&committed.state, input.metadata)
            }
            _ => return self.build_initial(input).await,
        };
        self.update(changeset).await
    }
}

fn stats_of(discovery: &DiscoveryResult) -> BuildStats {
    BuildStats {
        hits: discovery.cache_hits,
        misses: discovery.cache_misses,
        skips: discovery.cache_skips,
    }
}

fn detect_changes(state: &BuildState, metadata: AnalysisMetadata) -> Changeset {
    let mut changeset = Changeset::new(metadata);

    for (path, snapshot) in &state.snapshots {
        match fingerprint_file(path) {
            Ok(source) if source.fingerprint.same_content(&snapshot.fingerprint) => {}
            Ok(_) => changeset.updated.push(path.clone()),
            Err(_) if !path.exists() => changeset.removed.push(path.clone()),
            Err(_) => changeset.updated.push(path.clone()),
        }
    }

    let mut added = BTreeSet::new();
    for summary in state.graph.graph.modules() {
        for base in &summary.unresolved {
            if let Some(found) = candidates(base).into_iter().find(|c| c.is_file()) {
                if !state.snapshots.contains_key(&found) {
                    added.insert(found);
                }
            }
        }
    }
    changeset.added.extend(added);

    tracing::debug!(
        "Detected {} added, {} updated, {} removed",
        changeset.added.len(),
        changeset.updated.len(),
        changeset.removed.len()
    );
    changeset
}
