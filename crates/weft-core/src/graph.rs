//! Definition-level dependency graph built from discovery snapshots

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::model::*;
use crate::resolve::{resolve_specifier, Resolution};
use crate::state::SnapshotMap;

/// One definition in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraphNode {
    pub id: CanonicalId,
    pub file_path: PathBuf,
    pub ast_path: String,
    pub element_type: Option<ElementType>,
    /// Sorted, de-duplicated ids this definition references.
    pub dependencies: Vec<CanonicalId>,
}

/// Module-level facts needed for adjacency and chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    pub file_path: PathBuf,
    pub content_hash: ContentHash,
    /// Tracked modules this one loads at runtime (self excluded).
    pub imports: BTreeSet<PathBuf>,
    /// Joined base paths of relative specifiers that matched no module.
    pub unresolved: BTreeSet<PathBuf>,
    /// Resolved export table, wildcard re-exports included.
    pub exports: BTreeMap<String, CanonicalId>,
}

/// The dependency graph: definition nodes plus one summary per module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: BTreeMap<CanonicalId, DependencyGraphNode>,
    modules: BTreeMap<PathBuf, ModuleSummary>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &CanonicalId) -> Option<&DependencyGraphNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &CanonicalId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyGraphNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &CanonicalId> {
        self.nodes.keys()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn module(&self, path: &Path) -> Option<&ModuleSummary> {
        self.modules.get(path)
    }

    /// Iterate over all module summaries in path order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleSummary> {
        self.modules.values()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Insert or replace a node. Returns the previous node with the same id.
    pub fn insert_node(&mut self, node: DependencyGraphNode) -> Option<DependencyGraphNode> {
        self.nodes.insert(node.id.clone(), node)
    }

    pub fn remove_node(&mut self, id: &CanonicalId) -> Option<DependencyGraphNode> {
        self.nodes.remove(id)
    }

    /// Insert or replace a module summary.
    pub fn insert_module(&mut self, summary: ModuleSummary) -> Option<ModuleSummary> {
        self.modules.insert(summary.file_path.clone(), summary)
    }

    pub fn remove_module(&mut self, path: &Path) -> Option<ModuleSummary> {
        self.modules.remove(path)
    }

    /// Copy of the part of the graph owned by `modules`.
    pub fn restrict_to(&self, modules: &BTreeSet<PathBuf>) -> DependencyGraph {
        DependencyGraph {
            nodes: self
                .nodes
                .iter()
                .filter(|(_, n)| modules.contains(&n.file_path))
                .map(|(id, n)| (id.clone(), n.clone()))
                .collect(),
            modules: self
                .modules
                .iter()
                .filter(|(p, _)| modules.contains(*p))
                .map(|(p, s)| (p.clone(), s.clone()))
                .collect(),
        }
    }
}

/// Node ids grouped by owning module.
pub type GraphIndex = BTreeMap<PathBuf, BTreeSet<CanonicalId>>;

pub fn build_graph_index(graph: &DependencyGraph) -> GraphIndex {
    let mut index = GraphIndex::new();
    for node in graph.nodes() {
        index
            .entry(node.file_path.clone())
            .or_default()
            .insert(node.id.clone());
    }
    index
}

/// Build the graph for every snapshot.
pub fn build_dependency_graph(snapshots: &SnapshotMap) -> DependencyGraph {
    build_dependency_graph_for(snapshots, snapshots.keys())
}

/// Build nodes and summaries only for `modules`, resolving imports and
/// export tables against the whole snapshot set.
pub fn build_dependency_graph_for<'a, I>(snapshots: &SnapshotMap, modules: I) -> DependencyGraph
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut resolver = ExportResolver::new(snapshots);
    let mut graph = DependencyGraph::new();

    for path in modules {
        let Some(snapshot) = snapshots.get(path) else {
            continue;
        };

        for definition in &snapshot.definitions {
            let dependencies = resolver.resolve_references(snapshot, definition);
            graph.insert_node(DependencyGraphNode {
                id: definition.canonical_id.clone(),
                file_path: snapshot.file_path.clone(),
                ast_path: definition.ast_path.clone(),
                element_type: definition.element_type,
                dependencies,
            });
        }

        let summary = resolver.summarize(snapshot);
        graph.insert_module(summary);
    }

    tracing::debug!(
        "Built dependency graph: {} nodes, {} modules",
        graph.node_count(),
        graph.module_count()
    );
    graph
}

type ExportTable = BTreeMap<String, CanonicalId>;

/// Resolves specifiers and export tables against a snapshot set, memoizing
/// tables across the modules of one build.
struct ExportResolver<'a> {
    snapshots: &'a SnapshotMap,
    tables: HashMap<PathBuf, ExportTable>,
}

impl<'a> ExportResolver<'a> {
    fn new(snapshots: &'a SnapshotMap) -> Self {
        ExportResolver {
            snapshots,
            tables: HashMap::new(),
        }
    }

    fn resolve(&self, importer: &Path, specifier: &str) -> Resolution {
        resolve_specifier(importer, specifier, |candidate| {
            self.snapshots.contains_key(candidate)
        })
    }

    fn summarize(&mut self, snapshot: &DiscoverySnapshot) -> ModuleSummary {
        let mut imports = BTreeSet::new();
        let mut unresolved = BTreeSet::new();
        for specifier in snapshot.runtime_specifiers() {
            match self.resolve(&snapshot.file_path, specifier) {
                Resolution::Resolved(target) if target != snapshot.file_path => {
                    imports.insert(target);
                }
                Resolution::Missing(base) => {
                    unresolved.insert(base);
                }
                _ => {}
            }
        }

        ModuleSummary {
            file_path: snapshot.file_path.clone(),
            content_hash: snapshot.signature,
            imports,
            unresolved,
            exports: self.export_table(&snapshot.file_path),
        }
    }

    fn resolve_references(
        &mut self,
        snapshot: &DiscoverySnapshot,
        definition: &DefinitionRecord,
    ) -> Vec<CanonicalId> {
        let mut deps = BTreeSet::new();
        for reference in &definition.references {
            if let Some(id) = self.resolve_reference(snapshot, reference) {
                if id != definition.canonical_id {
                    deps.insert(id);
                }
            }
        }
        deps.into_iter().collect()
    }

    fn resolve_reference(
        &mut self,
        snapshot: &DiscoverySnapshot,
        reference: &str,
    ) -> Option<CanonicalId> {
        let (head, member) = match reference.split_once('.') {
            Some((head, rest)) => (head, Some(rest.split('.').next().unwrap_or(rest))),
            None => (reference, None),
        };

        if let Some(local) = snapshot.definition_by_local(head) {
            return Some(local.canonical_id.clone());
        }

        let import = snapshot
            .imports
            .iter()
            .find(|i| !i.is_type_only && i.local == head && i.kind != ImportKind::SideEffect)?;
        let target = self.resolve(&snapshot.file_path, &import.source).resolved()?;
        let table = self.export_table(&target);

        match import.kind {
            ImportKind::Namespace => table.get(member?).cloned(),
            ImportKind::Default => table.get("default").cloned(),
            _ => table.get(&import.imported).cloned(),
        }
    }

    /// Export table of `root`, computed as a fixed point over every module
    /// reachable through re-export edges.
    fn export_table(&mut self, root: &Path) -> ExportTable {
        if let Some(table) = self.tables.get(root) {
            return table.clone();
        }

        let snapshots = self.snapshots;

        // Collect the re-export closure with an explicit visited set.
        let mut closure: Vec<PathBuf> = Vec::new();
        let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(path) = stack.pop() {
            if !visited.insert(path.clone()) || self.tables.contains_key(&path) {
                continue;
            }
            let Some(snapshot) = snapshots.get(&path) else {
                continue;
            };
            closure.push(path.clone());
            for source in export_sources(snapshot) {
                if let Some(target) = self.resolve(&path, source).resolved() {
                    stack.push(target);
                }
            }
        }

        let mut tables: HashMap<PathBuf, ExportTable> = HashMap::new();
        let mut explicit: HashMap<PathBuf, BTreeSet<String>> = HashMap::new();
        for path in &closure {
            let snapshot = &snapshots[path];
            let mut table = ExportTable::new();
            let mut names = BTreeSet::new();
            for export in &snapshot.exports {
                match export {
                    ModuleExport::Named { exported, local } => {
                        names.insert(exported.clone());
                        if let Some(def) = snapshot.definition_by_local(local) {
                            table.insert(exported.clone(), def.canonical_id.clone());
                        }
                    }
                    ModuleExport::Reexport { exported, .. } => {
                        names.insert(exported.clone());
                    }
                    ModuleExport::ReexportAll { .. } => {}
                }
            }
            tables.insert(path.clone(), table);
            explicit.insert(path.clone(), names);
        }

        // Tables only grow and names are finite, so this terminates even
        // when re-exports form a cycle.
        let mut changed = true;
        while changed {
            changed = false;
            for path in &closure {
                let snapshot = &snapshots[path];
                let mut additions: Vec<(String, CanonicalId)> = Vec::new();

                for export in &snapshot.exports {
                    match export {
                        ModuleExport::Named { exported, local } => {
                            if snapshot.definition_by_local(local).is_some() {
                                continue;
                            }
                            let Some(import) = snapshot.imports.iter().find(|i| {
                                i.local == *local
                                    && matches!(i.kind, ImportKind::Named | ImportKind::Default)
                            }) else {
                                continue;
                            };
                            let imported = if import.kind == ImportKind::Default {
                                "default"
                            } else {
                                import.imported.as_str()
                            };
                            if let Some(id) =
                                self.lookup(&tables, path, &import.source, imported)
                            {
                                additions.push((exported.clone(), id));
                            }
                        }
                        ModuleExport::Reexport {
                            exported,
                            source,
                            imported,
                        } => {
                            if let Some(id) = self.lookup(&tables, path, source, imported) {
                                additions.push((exported.clone(), id));
                            }
                        }
                        ModuleExport::ReexportAll { source } => {
                            let Some(target) = self.resolve(path, source).resolved() else {
                                continue;
                            };
                            let names = &explicit[path];
                            if let Some(target_table) = self.table_ref(&tables, &target) {
                                for (name, id) in target_table {
                                    if name != "default" && !names.contains(name) {
                                        additions.push((name.clone(), id.clone()));
                                    }
                                }
                            }
                        }
                    }
                }

                let Some(table) = tables.get_mut(path) else {
                    continue;
                };
                for (name, id) in additions {
                    if !table.contains_key(&name) {
                        table.insert(name, id);
                        changed = true;
                    }
                }
            }
        }

        self.tables.extend(tables);
        self.tables.get(root).cloned().unwrap_or_default()
    }

    fn table_ref<'t>(
        &'t self,
        local: &'t HashMap<PathBuf, ExportTable>,
        path: &Path,
    ) -> Option<&'t ExportTable> {
        local.get(path).or_else(|| self.tables.get(path))
    }

    fn lookup(
        &self,
        local: &HashMap<PathBuf, ExportTable>,
        from: &Path,
        source: &str,
        name: &str,
    ) -> Option<CanonicalId> {
        let target = self.resolve(from, source).resolved()?;
        self.table_ref(local, &target)?.get(name).cloned()
    }
}

/// Specifiers a module's export table depends on.
fn export_sources(snapshot: &DiscoverySnapshot) -> Vec<&str> {
    let mut sources: Vec<&str> = snapshot.exports.iter().filter_map(|e| e.source()).collect();
    for export in &snapshot.exports {
        if let ModuleExport::Named { local, .. } = export {
            if snapshot.definition_by_local(local).is_none() {
                if let Some(import) = snapshot.imports.iter().find(|i| i.local == *local) {
                    sources.push(&import.source);
                }
            }
        }
    }
    sources
}
