//! Module analyzer trait definition

use std::path::{Path, PathBuf};

use weft_core::{CanonicalId, DefinitionRecord, Diagnostic, ModuleExport, ModuleImport};

/// Source of one module handed to an analyzer.
#[derive(Debug, Clone)]
pub struct ModuleInput {
    pub file_path: PathBuf,
    pub source: String,
}

/// Context shared by every analysis in one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerHelper {
    namespace: Option<String>,
}

impl AnalyzerHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace every id minted by this helper with `label`.
    pub fn with_namespace(label: impl Into<String>) -> Self {
        AnalyzerHelper {
            namespace: Some(label.into()),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Canonical id for a definition of `module` at `ast_path`.
    pub fn canonical_id(&self, module: &Path, ast_path: &str) -> CanonicalId {
        match &self.namespace {
            Some(label) => CanonicalId::scoped(label, module, ast_path),
            None => CanonicalId::new(module, ast_path),
        }
    }
}

/// What an analyzer reports for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAnalysis {
    pub definitions: Vec<DefinitionRecord>,
    pub imports: Vec<ModuleImport>,
    pub exports: Vec<ModuleExport>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A language analyzer. Must be pure with respect to its input: the same
/// source always yields the same analysis, which is what makes caching the
/// result by fingerprint valid.
pub trait ModuleAnalyzer: Send + Sync {
    /// Part of the cache key. Bump whenever the output for a given input
    /// changes.
    fn version(&self) -> &str;

    /// Analyze one module. `None` means the source could not be analyzed
    /// at all.
    fn analyze(&self, input: &ModuleInput, helper: &AnalyzerHelper) -> Option<ModuleAnalysis>;
}
