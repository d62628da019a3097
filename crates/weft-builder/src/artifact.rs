//! Artifact assembly and persistence

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use weft_core::{
    normalize_path, AnalysisMetadata, CanonicalId, ContentHash, DependencyGraph, ElementType,
    SnapshotMap,
};

use crate::error::BuildError;
use crate::prebuild::{PrebuildMap, PrebuildRequest, PrebuildSource, Prebuilt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderArtifact {
    pub elements: BTreeMap<CanonicalId, ArtifactElement>,
    pub report: BuildReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ArtifactMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactElement {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub metadata: ElementMetadata,
    pub prebuild: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMetadata {
    pub source_path: String,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub duration_ms: u64,
    pub warnings: Vec<String>,
    pub stats: BuildStats,
}

/// Discovery cache counters for one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub hits: usize,
    pub misses: usize,
    pub skips: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    pub generation: u64,
    pub schema_hash: String,
    pub analyzer_version: String,
    pub intermediate_modules: Vec<String>,
}

impl BuilderArtifact {
    pub fn element(&self, id: &CanonicalId) -> Option<&ArtifactElement> {
        self.elements.get(id)
    }

    pub async fn write_json(&self, path: &Path) -> Result<(), BuildError> {
        let io_err = |source| BuildError::ArtifactIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|source| BuildError::ArtifactFormat {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, json).await.map_err(io_err)?;
        tracing::debug!("Wrote artifact ({} elements) to {}", self.elements.len(), path.display());
        Ok(())
    }

    pub async fn read_json(path: &Path) -> Result<Self, BuildError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| BuildError::ArtifactIo {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| BuildError::ArtifactFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Inputs for [`build_artifact`].
pub struct ArtifactInput<'a> {
    pub graph: &'a DependencyGraph,
    pub snapshots: &'a SnapshotMap,
    pub prebuilt: &'a PrebuildMap,
    pub intermediate_module_paths: &'a [PathBuf],
    pub stats: BuildStats,
    pub started: Instant,
    /// When set, the artifact carries a `meta` block for this generation.
    pub meta: Option<(u64, &'a AnalysisMetadata)>,
}

/// Assemble an artifact. Every graph node needs a prebuild payload.
pub fn build_artifact(input: ArtifactInput<'_>) -> Result<BuilderArtifact, BuildError> {
    let mut elements = BTreeMap::new();
    for node in input.graph.nodes() {
        let prebuilt = input
            .prebuilt
            .get(&node.id)
            .ok_or_else(|| BuildError::ElementNotFound {
                id: node.id.clone(),
            })?;
        let content_hash = input
            .snapshots
            .get(&node.file_path)
            .map(|snapshot| snapshot.fingerprint.hash)
            .unwrap_or_default();
        elements.insert(
            node.id.clone(),
            ArtifactElement {
                element_type: prebuilt.element_type,
                metadata: ElementMetadata {
                    source_path: normalize_path(&node.file_path),
                    content_hash,
                },
                prebuild: prebuilt.payload.clone(),
            },
        );
    }

    let meta = input.meta.map(|(generation, metadata)| ArtifactMeta {
        generation,
        schema_hash: metadata.schema_hash.clone(),
        analyzer_version: metadata.analyzer_version.clone(),
        intermediate_modules: input
            .intermediate_module_paths
            .iter()
            .map(|p| normalize_path(p))
            .collect(),
    });

    Ok(BuilderArtifact {
        elements,
        report: BuildReport {
            duration_ms: input.started.elapsed().as_millis() as u64,
            warnings: collect_warnings(input.snapshots),
            stats: input.stats,
        },
        meta,
    })
}

/// Diagnostics of every snapshot as `<path>: [<code>] <message>`.
pub fn collect_warnings(snapshots: &SnapshotMap) -> Vec<String> {
    snapshots
        .values()
        .flat_map(|snapshot| {
            snapshot.diagnostics.iter().map(move |d| {
                format!("{}: [{}] {}", snapshot.normalized_path, d.code, d.message)
            })
        })
        .collect()
}

/// Modules that own no definitions but sit on the import paths of the build.
pub fn intermediate_modules(snapshots: &SnapshotMap) -> Vec<PathBuf> {
    snapshots
        .iter()
        .filter(|(_, snapshot)| snapshot.definitions.is_empty())
        .map(|(path, _)| path.clone())
        .collect()
}

/// One artifact build request.
pub struct ArtifactRequest<'a> {
    pub graph: &'a DependencyGraph,
    pub snapshots: &'a SnapshotMap,
    /// Modules whose payloads must be recomputed. `None` means all of them.
    pub changed_modules: Option<&'a BTreeSet<PathBuf>>,
    pub previous: Option<&'a BuilderArtifact>,
    pub stats: BuildStats,
    pub started: Instant,
    pub generation: u64,
    pub metadata: &'a AnalysisMetadata,
}

/// Gathers payloads from a [`PrebuildSource`] and assembles artifacts.
#[derive(Clone)]
pub struct ArtifactBuilder {
    source: Arc<dyn PrebuildSource>,
}

impl ArtifactBuilder {
    pub fn new(source: Arc<dyn PrebuildSource>) -> Self {
        Self { source }
    }

    pub async fn build(&self, request: ArtifactRequest<'_>) -> Result<BuilderArtifact, BuildError> {
        let mut prebuilt = PrebuildMap::new();
        let mut pending = Vec::new();

        for node in request.graph.nodes() {
            let changed = request
                .changed_modules
                .is_none_or(|modules| modules.contains(&node.file_path));
            let reused = if changed {
                None
            } else {
                request
                    .previous
                    .and_then(|artifact| artifact.element(&node.id))
                    .map(|element| Prebuilt {
                        element_type: element.element_type,
                        payload: element.prebuild.clone(),
                    })
            };
            match reused {
                Some(p) => {
                    prebuilt.insert(node.id.clone(), p);
                }
                None => pending.push(PrebuildRequest::from(node)),
            }
        }

        tracing::debug!(
            "Prebuilding {} elements via {} ({} reused)",
            pending.len(),
            self.source.name(),
            prebuilt.len()
        );
        if !pending.is_empty() {
            prebuilt.extend(self.source.prebuild(&pending).await?);
        }

        let intermediate = intermediate_modules(request.snapshots);
        build_artifact(ArtifactInput {
            graph: request.graph,
            snapshots: request.snapshots,
            prebuilt: &prebuilt,
            intermediate_module_paths: &intermediate,
            stats: request.stats,
            started: request.started,
            meta: Some((request.generation, request.metadata)),
        })
    }
}
