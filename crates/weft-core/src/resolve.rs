//! Module specifier resolution
//!
//! Relative specifiers are joined onto the importing module's directory and
//! normalized lexically, then tried with the usual extension and `index`
//! candidates. Bare and scoped package specifiers are external.

use std::path::{Component, Path, PathBuf};

/// Extensions tried when a specifier has no file on disk as written.
pub const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(PathBuf),
    /// Bare or scoped package specifier; not tracked.
    External,
    /// Relative specifier with no matching module. Carries the joined base
    /// path so a later addition can be matched against it.
    Missing(PathBuf),
}

impl Resolution {
    pub fn resolved(self) -> Option<PathBuf> {
        match self {
            Resolution::Resolved(path) => Some(path),
            _ => None,
        }
    }
}

pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Join a relative specifier onto the importer's directory.
pub fn join_specifier(importer: &Path, specifier: &str) -> Option<PathBuf> {
    if !is_relative_specifier(specifier) {
        return None;
    }
    let base = importer.parent().unwrap_or_else(|| Path::new(""));
    Some(normalize_lexically(&base.join(specifier)))
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Candidate module paths for a joined base path, in lookup order.
pub fn candidates(base: &Path) -> Vec<PathBuf> {
    let mut out = vec![base.to_path_buf()];

    // TypeScript ESM convention: `./a.js` refers to `./a.ts`.
    if let Some(ext) = base.extension().and_then(|e| e.to_str()) {
        let swapped: &[&str] = match ext {
            "js" => &["ts", "tsx"],
            "mjs" => &["mts"],
            "cjs" => &["cts"],
            "jsx" => &["tsx"],
            _ => &[],
        };
        for ext in swapped {
            out.push(base.with_extension(ext));
        }
    }

    let raw = base.as_os_str().to_string_lossy();
    for ext in RESOLVE_EXTENSIONS {
        out.push(PathBuf::from(format!("{raw}.{ext}")));
    }
    for ext in RESOLVE_EXTENSIONS {
        out.push(base.join(format!("index.{ext}")));
    }
    out
}

/// Resolve `specifier` as imported from `importer`. `exists` decides whether
/// a candidate is a module (a filesystem check during discovery, membership
/// in the snapshot set during graph building).
pub fn resolve_specifier<F>(importer: &Path, specifier: &str, exists: F) -> Resolution
where
    F: Fn(&Path) -> bool,
{
    let Some(base) = join_specifier(importer, specifier) else {
        return Resolution::External;
    };
    candidates(&base)
        .into_iter()
        .find(|candidate| exists(candidate))
        .map(Resolution::Resolved)
        .unwrap_or(Resolution::Missing(base))
}

/// Base paths a specifier could have been joined to in order to reach
/// `path`. The inverse of [`candidates`], used to match newly added files
/// against previously missing imports.
pub fn specifier_bases(path: &Path) -> Vec<PathBuf> {
    let mut out = vec![path.to_path_buf()];
    let has_known_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| RESOLVE_EXTENSIONS.contains(&e));
    if has_known_ext {
        let stem = path.with_extension("");
        if path.file_stem().and_then(|s| s.to_str()) == Some("index") {
            if let Some(dir) = path.parent() {
                out.push(dir.to_path_buf());
            }
        }
        for ext in ["js", "jsx", "mjs", "cjs"] {
            out.push(stem.with_extension(ext));
        }
        out.push(stem);
    }
    out
}
