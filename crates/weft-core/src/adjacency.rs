//! Reverse-dependency indexes and transitive invalidation

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;

use crate::graph::DependencyGraph;
use crate::model::CanonicalId;

/// `module -> modules that import it`.
pub type ModuleAdjacency = BTreeMap<PathBuf, BTreeSet<PathBuf>>;

/// `definition -> definitions that depend on it`.
pub type DefinitionAdjacency = BTreeMap<CanonicalId, BTreeSet<CanonicalId>>;

/// Every module gets an entry, even when nothing imports it.
pub fn build_module_adjacency(graph: &DependencyGraph) -> ModuleAdjacency {
    let mut adjacency = ModuleAdjacency::new();
    for summary in graph.modules() {
        adjacency.entry(summary.file_path.clone()).or_default();
        for target in &summary.imports {
            if *target == summary.file_path {
                continue;
            }
            adjacency
                .entry(target.clone())
                .or_default()
                .insert(summary.file_path.clone());
        }
    }
    adjacency
}

pub fn build_definition_adjacency(graph: &DependencyGraph) -> DefinitionAdjacency {
    let mut adjacency = DefinitionAdjacency::new();
    for node in graph.nodes() {
        adjacency.entry(node.id.clone()).or_default();
        for dep in &node.dependencies {
            adjacency
                .entry(dep.clone())
                .or_default()
                .insert(node.id.clone());
        }
    }
    adjacency
}

/// Transitive closure over "imported by" edges, starting from (and
/// including) `changed`.
pub fn collect_affected_modules<'a, I>(changed: I, adjacency: &ModuleAdjacency) -> BTreeSet<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut affected = BTreeSet::new();
    let mut queue = VecDeque::new();

    for file in changed {
        if affected.insert(file.clone()) {
            queue.push_back(file.clone());
        }
    }

    while let Some(current) = queue.pop_front() {
        let Some(importers) = adjacency.get(&current) else {
            continue;
        };
        for importer in importers {
            if affected.insert(importer.clone()) {
                queue.push_back(importer.clone());
            }
        }
    }

    affected
}

/// Transitive closure over "depended on by" edges, inclusive.
pub fn collect_affected_definitions<'a, I>(
    changed: I,
    adjacency: &DefinitionAdjacency,
) -> BTreeSet<CanonicalId>
where
    I: IntoIterator<Item = &'a CanonicalId>,
{
    let mut affected = BTreeSet::new();
    let mut queue: VecDeque<CanonicalId> = VecDeque::new();

    for id in changed {
        if affected.insert(id.clone()) {
            queue.push_back(id.clone());
        }
    }

    while let Some(current) = queue.pop_front() {
        for dependent in adjacency.get(&current).into_iter().flatten() {
            if affected.insert(dependent.clone()) {
                queue.push_back(dependent.clone());
            }
        }
    }

    affected
}
