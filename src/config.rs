//! Project configuration (`weft.toml`)

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use weft_core::AnalysisMetadata;

pub const CONFIG_FILE: &str = "weft.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeftConfig {
    /// Globs, relative to the project root, selecting entry modules.
    pub entries: Vec<String>,
    pub exclude: Vec<String>,
    pub cache_dir: PathBuf,
    pub output: PathBuf,
    /// Hash of the schema definitions are analyzed against. A change
    /// invalidates every cached analysis.
    pub schema_hash: String,
    /// Label prefixed to every canonical id.
    pub namespace: Option<String>,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            entries: vec!["src/**/*.ts".to_string(), "src/**/*.tsx".to_string()],
            exclude: vec!["**/*.d.ts".to_string(), "**/node_modules/**".to_string()],
            cache_dir: PathBuf::from(".weft"),
            output: PathBuf::from(".weft/artifact.json"),
            schema_hash: String::new(),
            namespace: None,
        }
    }
}

impl WeftConfig {
    /// Read `weft.toml` under `root`, or the defaults when there is none.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, root.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.cache_dir)
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(&self.output)
    }

    pub fn metadata(&self, analyzer_version: &str) -> AnalysisMetadata {
        AnalysisMetadata::new(self.schema_hash.clone(), analyzer_version)
    }

    /// Entry modules under `root`, sorted. Files ignored by git are skipped.
    pub fn resolve_entries(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let include = compile_globset(&self.entries)?;
        let exclude = compile_globset(&self.exclude)?;

        let mut builder = WalkBuilder::new(root);
        builder.hidden(true).git_ignore(true).parents(true).follow_links(false);

        let mut entries = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Skipping unreadable path: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            if include.is_match(rel)
                && !exclude.is_match(rel)
                && weft_indexer::languages::is_supported(path)
            {
                entries.push(path.to_path_buf());
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn compile_globset(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for g in globs {
        builder.add(Glob::new(g).with_context(|| format!("invalid glob: {g:?}"))?);
    }
    Ok(builder.build()?)
}
