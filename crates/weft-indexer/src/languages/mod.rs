//! Language analyzers

pub mod typescript;

use std::path::Path;

pub use typescript::TypeScriptAnalyzer;

/// Whether some analyzer in this crate understands `path`.
pub fn is_supported(path: &Path) -> bool {
    TypeScriptAnalyzer::handles(path)
}
