//! Test utilities for weft-core

use std::path::PathBuf;
use std::sync::Arc;

use crate::hash::ContentHash;
use crate::model::*;
use crate::state::SnapshotMap;

/// Builder for a hand-written discovery snapshot.
pub struct SnapshotSpec {
    path: PathBuf,
    content: String,
    definitions: Vec<DefinitionRecord>,
    imports: Vec<ModuleImport>,
    exports: Vec<ModuleExport>,
}

impl SnapshotSpec {
    pub fn new(path: &str) -> Self {
        SnapshotSpec {
            path: PathBuf::from(path),
            content: path.to_string(),
            definitions: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Override the source text the fingerprint is computed from.
    pub fn content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    /// Exported top-level definition bound to `local`.
    pub fn definition(mut self, local: &str, references: &[&str]) -> Self {
        self.push_definition(local, references, true);
        self.exports.push(ModuleExport::Named {
            exported: local.to_string(),
            local: local.to_string(),
        });
        self
    }

    pub fn local_definition(mut self, local: &str, references: &[&str]) -> Self {
        self.push_definition(local, references, false);
        self
    }

    pub fn import(self, source: &str, imported: &str, local: &str) -> Self {
        self.push_import(source, imported, local, ImportKind::Named, false)
    }

    pub fn default_import(self, source: &str, local: &str) -> Self {
        self.push_import(source, "default", local, ImportKind::Default, false)
    }

    pub fn namespace_import(self, source: &str, local: &str) -> Self {
        self.push_import(source, "*", local, ImportKind::Namespace, false)
    }

    pub fn type_import(self, source: &str, imported: &str, local: &str) -> Self {
        self.push_import(source, imported, local, ImportKind::Named, true)
    }

    pub fn side_effect(self, source: &str) -> Self {
        self.push_import(source, "", "", ImportKind::SideEffect, false)
    }

    pub fn export_as(mut self, local: &str, exported: &str) -> Self {
        self.exports.push(ModuleExport::Named {
            exported: exported.to_string(),
            local: local.to_string(),
        });
        self
    }

    pub fn reexport(mut self, source: &str, imported: &str, exported: &str) -> Self {
        self.exports.push(ModuleExport::Reexport {
            exported: exported.to_string(),
            source: source.to_string(),
            imported: imported.to_string(),
        });
        self
    }

    pub fn reexport_all(mut self, source: &str) -> Self {
        self.exports.push(ModuleExport::ReexportAll {
            source: source.to_string(),
        });
        self
    }

    pub fn build(self) -> DiscoverySnapshot {
        DiscoverySnapshot {
            normalized_path: normalize_path(&self.path),
            fingerprint: Fingerprint::from_content(self.content.as_bytes(), 0),
            signature: ContentHash::from_bytes(self.content.as_bytes()),
            metadata: AnalysisMetadata::new("schema", "test"),
            definitions: self.definitions,
            imports: self.imports,
            exports: self.exports,
            diagnostics: Vec::new(),
            analyzed_at_ms: 0,
            file_path: self.path,
        }
    }

    fn push_definition(&mut self, local: &str, references: &[&str], exported: bool) {
        self.definitions.push(DefinitionRecord {
            canonical_id: CanonicalId::new(&self.path, local),
            ast_path: local.to_string(),
            is_top_level: true,
            is_exported: exported,
            export_binding: exported.then(|| local.to_string()),
            local_name: Some(local.to_string()),
            element_type: Some(ElementType::Model),
            references: references.iter().map(|r| r.to_string()).collect(),
        });
    }

    fn push_import(
        mut self,
        source: &str,
        imported: &str,
        local: &str,
        kind: ImportKind,
        is_type_only: bool,
    ) -> Self {
        self.imports.push(ModuleImport {
            source: source.to_string(),
            imported: imported.to_string(),
            local: local.to_string(),
            kind,
            is_type_only,
        });
        self
    }
}

pub fn snapshot_map(specs: Vec<SnapshotSpec>) -> SnapshotMap {
    specs
        .into_iter()
        .map(|spec| {
            let snapshot = spec.build();
            (snapshot.file_path.clone(), Arc::new(snapshot))
        })
        .collect()
}
