//! Committed build state: snapshots, graph and the derived indexes

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adjacency::{
    build_definition_adjacency, build_module_adjacency, DefinitionAdjacency, ModuleAdjacency,
};
use crate::graph::{build_dependency_graph, build_graph_index, DependencyGraph, GraphIndex};
use crate::model::DiscoverySnapshot;
use crate::resolve::resolve_specifier;

/// Discovery snapshots keyed by module path. Values are shared so that a
/// scratch copy of the state costs one pointer per module.
pub type SnapshotMap = BTreeMap<PathBuf, Arc<DiscoverySnapshot>>;

/// A graph together with the indexes derived from it. The indexes are
/// always consistent with `graph`.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    pub graph: DependencyGraph,
    pub index: GraphIndex,
    pub module_adjacency: ModuleAdjacency,
    pub definition_adjacency: DefinitionAdjacency,
}

impl GraphState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: DependencyGraph) -> Self {
        GraphState {
            index: build_graph_index(&graph),
            module_adjacency: build_module_adjacency(&graph),
            definition_adjacency: build_definition_adjacency(&graph),
            graph,
        }
    }

    pub fn from_snapshots(snapshots: &SnapshotMap) -> Self {
        Self::from_graph(build_dependency_graph(snapshots))
    }
}

/// Everything a session commits after a successful build.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    pub snapshots: SnapshotMap,
    pub graph: GraphState,
}

impl BuildState {
    pub fn new(snapshots: SnapshotMap) -> Self {
        let graph = GraphState::from_snapshots(&snapshots);
        BuildState { snapshots, graph }
    }
}

/// Remove every trace of `removed` from the state and return the modules
/// that imported them (excluding the removed files themselves).
pub fn drop_removed_files(removed: &BTreeSet<PathBuf>, state: &mut BuildState) -> BTreeSet<PathBuf> {
    let mut importers = BTreeSet::new();
    for path in removed {
        if let Some(set) = state.graph.module_adjacency.get(path) {
            importers.extend(set.iter().cloned());
        }
    }

    let graph_state = &mut state.graph;
    for path in removed {
        state.snapshots.remove(path);

        if let Some(ids) = graph_state.index.remove(path) {
            for id in &ids {
                graph_state.graph.remove_node(id);
                graph_state.definition_adjacency.remove(id);
            }
            for dependents in graph_state.definition_adjacency.values_mut() {
                dependents.retain(|d| !ids.contains(d));
            }
        }

        graph_state.module_adjacency.remove(path);
        for importers_of in graph_state.module_adjacency.values_mut() {
            importers_of.remove(path);
        }
        graph_state.graph.remove_module(path);
    }

    importers.retain(|p| !removed.contains(p));
    importers
}

/// Modules reachable from `entries` over runtime imports, resolved against
/// the snapshot set. Entries without a snapshot are ignored.
pub fn reachable_modules<'a, I>(snapshots: &SnapshotMap, entries: I) -> BTreeSet<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut reachable = BTreeSet::new();
    let mut queue: VecDeque<&Path> = VecDeque::new();

    for entry in entries {
        if snapshots.contains_key(entry) && reachable.insert(entry.clone()) {
            queue.push_back(entry);
        }
    }

    while let Some(current) = queue.pop_front() {
        let Some(snapshot) = snapshots.get(current) else {
            continue;
        };
        for specifier in snapshot.runtime_specifiers() {
            let resolved = resolve_specifier(current, specifier, |c| snapshots.contains_key(c));
            let Some(target) = resolved.resolved() else {
                continue;
            };
            if let Some((key, _)) = snapshots.get_key_value(&target) {
                if reachable.insert(key.clone()) {
                    queue.push_back(key);
                }
            }
        }
    }

    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{snapshot_map, SnapshotSpec};

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn chain() -> BuildState {
        BuildState::new(snapshot_map(vec![
            SnapshotSpec::new("/src/a.ts")
                .import("./b", "userModel", "userModel")
                .definition("userQuery", &["userModel"]),
            SnapshotSpec::new("/src/b.ts").definition("userModel", &[]),
            SnapshotSpec::new("/src/orphan.ts").definition("unused", &[]),
        ]))
    }

    #[test]
    fn dropping_a_file_clears_every_index() {
        let mut state = chain();
        let removed = BTreeSet::from([p("/src/b.ts")]);
        let importers = drop_removed_files(&removed, &mut state);

        assert_eq!(importers, BTreeSet::from([p("/src/a.ts")]));
        assert!(!state.snapshots.contains_key(Path::new("/src/b.ts")));
        assert!(state.graph.graph.module(Path::new("/src/b.ts")).is_none());
        assert!(!state.graph.index.contains_key(Path::new("/src/b.ts")));
        assert!(!state.graph.module_adjacency.contains_key(Path::new("/src/b.ts")));

        let b_id = crate::model::CanonicalId::new(Path::new("/src/b.ts"), "userModel");
        assert!(!state.graph.graph.contains(&b_id));
        assert!(!state.graph.definition_adjacency.contains_key(&b_id));
    }

    #[test]
    fn reachability_follows_runtime_imports() {
        let state = chain();
        let reachable = reachable_modules(&state.snapshots, [&p("/src/a.ts")]);
        assert_eq!(reachable, BTreeSet::from([p("/src/a.ts"), p("/src/b.ts")]));
    }

    #[test]
    fn type_only_imports_do_not_reach() {
        let snapshots = snapshot_map(vec![
            SnapshotSpec::new("/src/a.ts").type_import("./types", "User", "User"),
            SnapshotSpec::new("/src/types.ts"),
        ]);
        let reachable = reachable_modules(&snapshots, [&p("/src/a.ts")]);
        assert_eq!(reachable, BTreeSet::from([p("/src/a.ts")]));
    }
}
