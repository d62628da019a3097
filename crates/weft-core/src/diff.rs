//! Graph diff computation and in-place patching for incremental updates

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::graph::{DependencyGraph, DependencyGraphNode, ModuleSummary};
use crate::model::CanonicalId;
use crate::state::GraphState;

/// Difference between two graphs (or two restrictions of a graph to the
/// same set of modules).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDiff {
    /// Nodes present only in the new graph.
    pub added: Vec<DependencyGraphNode>,
    /// Nodes present in both whose dependencies or module summary changed.
    pub updated: Vec<DependencyGraphNode>,
    /// Ids present only in the old graph.
    pub removed: Vec<CanonicalId>,
    pub modules_upserted: Vec<ModuleSummary>,
    pub modules_removed: Vec<PathBuf>,
}

impl GraphDiff {
    /// Check if this diff is empty (no changes).
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.modules_upserted.is_empty()
            && self.modules_removed.is_empty()
    }
}

pub fn diff_dependency_graphs(old: &DependencyGraph, new: &DependencyGraph) -> GraphDiff {
    let mut diff = GraphDiff::default();

    for node in new.nodes() {
        match old.node(&node.id) {
            None => diff.added.push(node.clone()),
            Some(previous) => {
                let summary_changed = old.module(&node.file_path) != new.module(&node.file_path);
                if previous != node || summary_changed {
                    diff.updated.push(node.clone());
                }
            }
        }
    }

    for id in old.node_ids() {
        if !new.contains(id) {
            diff.removed.push(id.clone());
        }
    }

    for summary in new.modules() {
        if old.module(&summary.file_path) != Some(summary) {
            diff.modules_upserted.push(summary.clone());
        }
    }

    for summary in old.modules() {
        if new.module(&summary.file_path).is_none() {
            diff.modules_removed.push(summary.file_path.clone());
        }
    }

    diff
}

/// Apply `diff` to the graph and keep the index and both adjacencies in
/// step. Removals are applied before updates and additions.
pub fn apply_graph_patch(state: &mut GraphState, diff: &GraphDiff) {
    for id in &diff.removed {
        let Some(node) = state.graph.remove_node(id) else {
            continue;
        };
        if let Some(ids) = state.index.get_mut(&node.file_path) {
            ids.remove(id);
            if ids.is_empty() {
                state.index.remove(&node.file_path);
            }
        }
        state.definition_adjacency.remove(id);
        for dep in &node.dependencies {
            if let Some(dependents) = state.definition_adjacency.get_mut(dep) {
                dependents.remove(id);
            }
        }
    }

    for node in &diff.updated {
        if let Some(previous) = state.graph.insert_node(node.clone()) {
            for dep in &previous.dependencies {
                if let Some(dependents) = state.definition_adjacency.get_mut(dep) {
                    dependents.remove(&node.id);
                }
            }
        }
        link_node(state, node);
    }

    for node in &diff.added {
        state.graph.insert_node(node.clone());
        link_node(state, node);
    }

    for summary in &diff.modules_upserted {
        let path = &summary.file_path;
        if let Some(previous) = state.graph.insert_module(summary.clone()) {
            for target in &previous.imports {
                if let Some(importers) = state.module_adjacency.get_mut(target) {
                    importers.remove(path);
                }
            }
        }
        for target in summary.imports.iter().filter(|t| *t != path) {
            state
                .module_adjacency
                .entry(target.clone())
                .or_default()
                .insert(path.clone());
        }
        state.module_adjacency.entry(path.clone()).or_default();
    }

    for path in &diff.modules_removed {
        state.graph.remove_module(path);
        state.index.remove(path);
        state.module_adjacency.remove(path);
        for importers in state.module_adjacency.values_mut() {
            importers.remove(path);
        }
    }

    tracing::debug!(
        added = diff.added.len(),
        updated = diff.updated.len(),
        removed = diff.removed.len(),
        "Applied graph patch"
    );
}

fn link_node(state: &mut GraphState, node: &DependencyGraphNode) {
    state
        .index
        .entry(node.file_path.clone())
        .or_default()
        .insert(node.id.clone());
    state.definition_adjacency.entry(node.id.clone()).or_default();
    for dep in &node.dependencies {
        state
            .definition_adjacency
            .entry(dep.clone())
            .or_default()
            .insert(node.id.clone());
    }
}
