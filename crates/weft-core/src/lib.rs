//! Canonical ids, dependency graph, graph patching and chunk planning

pub mod adjacency;
pub mod chunks;
pub mod diff;
pub mod graph;
pub mod hash;
pub mod model;
pub mod resolve;
pub mod state;


#[cfg(test)]
pub mod test_utils;

pub use adjacency::{
    build_definition_adjacency, build_module_adjacency, collect_affected_definitions,
    collect_affected_modules, DefinitionAdjacency, ModuleAdjacency,
};
pub use chunks::{diff_chunk_manifests, plan_chunks, Chunk, ChunkDiff, ChunkManifest};
pub use diff::{apply_graph_patch, diff_dependency_graphs, GraphDiff};
pub use graph::{
    build_dependency_graph, build_dependency_graph_for, build_graph_index, DependencyGraph,
    DependencyGraphNode, GraphIndex, ModuleSummary,
};
pub use hash::ContentHash;
pub use model::{
    normalize_path, AnalysisMetadata, CanonicalId, DefinitionRecord, Diagnostic,
    DiscoverySnapshot, ElementType, Fingerprint, ImportKind, ModuleExport, ModuleImport,
    Severity,
};
pub use resolve::{normalize_lexically, resolve_specifier, specifier_bases, Resolution};
pub use state::{drop_removed_files, reachable_modules, BuildState, GraphState, SnapshotMap};
