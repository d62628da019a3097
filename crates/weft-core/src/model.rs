//! Core data structures shared by discovery, graph building and the session

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Separator between the module path and the structural path of an id.
pub const ID_SEPARATOR: &str = "::";

/// Stable key identifying one definition across builds.
///
/// Formed as `<normalized module path>::<ast path>`, optionally prefixed with
/// a namespace label (`<label>:`). Pure function of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    pub fn new(module_path: &Path, ast_path: &str) -> Self {
        CanonicalId(format!("{}{}{}", normalize_path(module_path), ID_SEPARATOR, ast_path))
    }

    /// Same as [`CanonicalId::new`] but namespaced, for trees that host more
    /// than one schema.
    pub fn scoped(label: &str, module_path: &Path, ast_path: &str) -> Self {
        CanonicalId(format!(
            "{}:{}{}{}",
            label,
            normalize_path(module_path),
            ID_SEPARATOR,
            ast_path
        ))
    }

    /// Wrap an already formatted id (e.g. read back from an artifact).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        CanonicalId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Structural path part (after the last `::`).
    pub fn ast_path(&self) -> &str {
        self.0
            .rsplit_once(ID_SEPARATOR)
            .map_or("", |(_, ast)| ast)
    }

    /// Module part (before the last `::`), including any namespace label.
    pub fn module_path(&self) -> &str {
        self.0
            .rsplit_once(ID_SEPARATOR)
            .map_or(self.0.as_str(), |(module, _)| module)
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CanonicalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Render a path with forward slashes regardless of platform.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Content fingerprint of one module on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub hash: ContentHash,
    pub size_bytes: u64,
    pub mtime_ms: u64,
}

impl Fingerprint {
    pub fn from_content(content: &[u8], mtime_ms: u64) -> Self {
        Fingerprint {
            hash: ContentHash::from_bytes(content),
            size_bytes: content.len() as u64,
            mtime_ms,
        }
    }

    /// Content equality. The modification time is ignored: touching a file
    /// without editing it must not invalidate its cache entry.
    pub fn same_content(&self, other: &Fingerprint) -> bool {
        self.hash == other.hash && self.size_bytes == other.size_bytes
    }
}

/// Everything besides file content that a cached analysis depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub schema_hash: String,
    pub analyzer_version: String,
}

impl AnalysisMetadata {
    pub fn new(schema_hash: impl Into<String>, analyzer_version: impl Into<String>) -> Self {
        AnalysisMetadata {
            schema_hash: schema_hash.into(),
            analyzer_version: analyzer_version.into(),
        }
    }
}

/// Builder kind of a definition, as reported by the analyzer or the
/// prebuild source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    Model,
    Slice,
    Operation,
    InlineOperation,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Model => "model",
            ElementType::Slice => "slice",
            ElementType::Operation => "operation",
            ElementType::InlineOperation => "inlineOperation",
        }
    }
}

/// One definition found inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord {
    pub canonical_id: CanonicalId,
    pub ast_path: String,
    pub is_top_level: bool,
    pub is_exported: bool,
    pub export_binding: Option<String>,
    /// Name of the local binding the definition is assigned to, if any.
    pub local_name: Option<String>,
    pub element_type: Option<ElementType>,
    /// Identifiers mentioned by the definition body. Namespace member access
    /// is recorded as `ns.member`.
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportKind {
    Named,
    Default,
    Namespace,
    /// `import "./polyfill"`: a runtime edge with no bindings.
    SideEffect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleImport {
    pub source: String,
    /// Imported name: `default`, `*` for namespaces, or the exported name.
    pub imported: String,
    pub local: String,
    pub kind: ImportKind,
    pub is_type_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleExport {
    /// `export const a = ...` / `export { a as b }`
    Named { exported: String, local: String },
    /// `export { a as b } from "./m"`
    Reexport {
        exported: String,
        source: String,
        imported: String,
    },
    /// `export * from "./m"`
    ReexportAll { source: String },
}

impl ModuleExport {
    pub fn source(&self) -> Option<&str> {
        match self {
            ModuleExport::Named { .. } => None,
            ModuleExport::Reexport { source, .. } | ModuleExport::ReexportAll { source } => {
                Some(source)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Non-fatal finding attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            code: code.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            code: code.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Per-module discovery record, cached by fingerprint and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySnapshot {
    pub file_path: PathBuf,
    pub normalized_path: String,
    pub fingerprint: Fingerprint,
    /// Hash of the analyzed source; together with the metadata it keys the
    /// cache entry.
    pub signature: ContentHash,
    pub metadata: AnalysisMetadata,
    pub definitions: Vec<DefinitionRecord>,
    pub imports: Vec<ModuleImport>,
    pub exports: Vec<ModuleExport>,
    pub diagnostics: Vec<Diagnostic>,
    pub analyzed_at_ms: u64,
}

impl DiscoverySnapshot {
    /// Specifiers whose modules this one loads at runtime: value imports,
    /// side-effect imports and re-export sources. Type-only imports are
    /// erased and excluded.
    pub fn runtime_specifiers(&self) -> impl Iterator<Item = &str> {
        let imports = self
            .imports
            .iter()
            .filter(|i| !i.is_type_only)
            .map(|i| i.source.as_str());
        let reexports = self.exports.iter().filter_map(|e| e.source());
        imports.chain(reexports)
    }

    /// Find the definition bound to a top-level local name.
    pub fn definition_by_local(&self, local: &str) -> Option<&DefinitionRecord> {
        self.definitions
            .iter()
            .find(|d| d.is_top_level && d.local_name.as_deref() == Some(local))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}
