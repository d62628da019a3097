//! Chunk planning: grouping graph nodes into emission units
//!
//! One chunk per owning module. A chunk's content hash covers the module's
//! content hash, its member ids with their dependency lists and the keys of
//! the chunks it imports, so a chunk is re-emitted exactly when something it
//! would render changed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::hash::ContentHash;
use crate::model::{normalize_path, CanonicalId};

/// Suffix that replaces a module's extension in its chunk output path.
pub const CHUNK_OUTPUT_EXTENSION: &str = "weft.js";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub content_hash: ContentHash,
    pub canonical_ids: Vec<CanonicalId>,
    /// Keys of the chunks this one imports.
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub version: u64,
    pub chunks: BTreeMap<String, Chunk>,
}

impl ChunkManifest {
    pub fn get(&self, key: &str) -> Option<&Chunk> {
        self.chunks.get(key)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk keys ordered so that imported chunks come before their
    /// importers. Import cycles have no such order; key order is used then.
    pub fn emission_order(&self) -> Vec<String> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices = HashMap::new();
        for key in self.chunks.keys() {
            indices.insert(key.as_str(), graph.add_node(key.as_str()));
        }
        for (key, chunk) in &self.chunks {
            for import in &chunk.imports {
                if let (Some(&from), Some(&to)) = (indices.get(import.as_str()), indices.get(key.as_str())) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|idx| graph[idx].to_string()).collect(),
            Err(cycle) => {
                tracing::debug!(
                    "Chunk import cycle through {}, emitting in key order",
                    graph[cycle.node_id()]
                );
                self.chunks.keys().cloned().collect()
            }
        }
    }
}

/// Chunk key for a module.
pub fn chunk_key(module: &Path) -> String {
    normalize_path(module)
}

/// Output path for a module's chunk: the source extension is swapped for
/// [`CHUNK_OUTPUT_EXTENSION`].
pub fn chunk_output_path(module: &Path) -> PathBuf {
    module.with_extension(CHUNK_OUTPUT_EXTENSION)
}

/// Group every node of `graph` into exactly one chunk. The same graph always
/// yields the same manifest.
pub fn plan_chunks(graph: &DependencyGraph, version: u64) -> ChunkManifest {
    let mut members: BTreeMap<&Path, Vec<&CanonicalId>> = BTreeMap::new();
    for node in graph.nodes() {
        members.entry(node.file_path.as_path()).or_default().push(&node.id);
    }

    let owners: BTreeSet<&Path> = members.keys().copied().collect();
    let mut chunks = BTreeMap::new();

    for (module, ids) in &members {
        let imports: Vec<String> = graph
            .module(module)
            .map(|summary| {
                summary
                    .imports
                    .iter()
                    .filter(|target| owners.contains(target.as_path()))
                    .map(|target| chunk_key(target))
                    .collect()
            })
            .unwrap_or_default();

        let mut parts: Vec<Vec<u8>> = Vec::new();
        let module_hash = graph
            .module(module)
            .map(|summary| summary.content_hash)
            .unwrap_or_default();
        parts.push(module_hash.to_hex().into_bytes());
        for id in ids {
            parts.push(id.as_str().as_bytes().to_vec());
            if let Some(node) = graph.node(id) {
                for dep in &node.dependencies {
                    parts.push(dep.as_str().as_bytes().to_vec());
                }
            }
            parts.push(Vec::new());
        }
        // Imports follow the members behind their own separator.
        parts.push(Vec::new());
        for import in &imports {
            parts.push(import.as_bytes().to_vec());
        }

        let key = chunk_key(module);
        chunks.insert(
            key.clone(),
            Chunk {
                id: key,
                source_path: module.to_path_buf(),
                output_path: chunk_output_path(module),
                content_hash: ContentHash::from_parts(&parts),
                canonical_ids: ids.iter().map(|id| (*id).clone()).collect(),
                imports,
            },
        );
    }

    ChunkManifest { version, chunks }
}

/// Chunks to (re-)emit and chunks to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDiff {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ChunkDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Keys the writer must emit.
    pub fn to_emit(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(&self.updated)
    }
}

pub fn diff_chunk_manifests(old: &ChunkManifest, new: &ChunkManifest) -> ChunkDiff {
    let mut diff = ChunkDiff::default();
    for (key, chunk) in &new.chunks {
        match old.chunks.get(key) {
            None => diff.added.push(key.clone()),
            Some(previous) => {
                if previous.content_hash != chunk.content_hash
                    || previous.canonical_ids != chunk.canonical_ids
                {
                    diff.updated.push(key.clone());
                }
            }
        }
    }
    for key in old.chunks.keys() {
        if !new.chunks.contains_key(key) {
            diff.removed.push(key.clone());
        }
    }
    diff
}
