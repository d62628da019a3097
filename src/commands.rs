//! CLI command implementations

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use weft_builder::{BuildInput, BuilderSession, DescriptorPrebuildSource};
use weft_indexer::{AnalyzerHelper, DiscoveryCache, ModuleAnalyzer, TypeScriptAnalyzer};
use weft_watcher::WatcherService;

use crate::config::WeftConfig;

/// Everything a command needs to run builds for one project.
struct Project {
    root: PathBuf,
    config: WeftConfig,
    input: BuildInput,
    session: BuilderSession,
}

fn open_project(root: PathBuf, use_cache: bool) -> anyhow::Result<Project> {
    let root = root
        .canonicalize()
        .with_context(|| format!("project root {} not found", root.display()))?;
    let config = WeftConfig::load(&root)?;

    let analyzer = TypeScriptAnalyzer::new();
    let metadata = config.metadata(analyzer.version());
    let entries = config.resolve_entries(&root)?;
    if entries.is_empty() {
        anyhow::bail!("no entry modules match {:?} under {}", config.entries, root.display());
    }
    tracing::info!("{} entry modules", entries.len());

    let cache = if use_cache {
        DiscoveryCache::open(&config.cache_dir(&root))
    } else {
        DiscoveryCache::in_memory()
    };
    let helper = match &config.namespace {
        Some(label) => AnalyzerHelper::with_namespace(label.clone()),
        None => AnalyzerHelper::new(),
    };
    let session = BuilderSession::new(
        Arc::new(analyzer),
        Arc::new(cache),
        Arc::new(DescriptorPrebuildSource),
    )
    .with_helper(helper);

    Ok(Project {
        root,
        input: BuildInput { entries, metadata },
        config,
        session,
    })
}

pub async fn build(root: PathBuf, output: Option<PathBuf>, no_cache: bool) -> anyhow::Result<()> {
    let mut project = open_project(root, !no_cache)?;
    let artifact = project.session.build_initial(project.input.clone()).await?;

    for warning in &artifact.report.warnings {
        tracing::warn!("{}", warning);
    }
    let output = output.unwrap_or_else(|| project.config.output_path(&project.root));
    artifact.write_json(&output).await?;

    let stats = artifact.report.stats;
    tracing::info!(
        "Built {} elements in {}ms ({} hits, {} misses) -> {}",
        artifact.elements.len(),
        artifact.report.duration_ms,
        stats.hits,
        stats.misses,
        output.display()
    );
    Ok(())
}

pub async fn watch(root: PathBuf, debounce_ms: u64) -> anyhow::Result<()> {
    let mut project = open_project(root, true)?;
    let output = project.config.output_path(&project.root);

    let artifact = project.session.build_initial(project.input.clone()).await?;
    artifact.write_json(&output).await?;
    tracing::info!("Initial build: {} elements", artifact.elements.len());

    let session = Arc::new(Mutex::new(project.session));
    let (config, root) = (project.config.clone(), project.root.clone());
    let watcher = WatcherService::new(&project.root, session, project.input.metadata.clone())?
        .with_output(output)
        .with_debounce(Duration::from_millis(debounce_ms))
        .with_entry_resolver(move || config.resolve_entries(&root));

    watcher.start_watching().await?;
    watcher.process_events().await?;

    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    let config = WeftConfig::load(&root)?;
    let cache_dir = config.cache_dir(&root);
    tracing::info!("Clearing cache at: {}", cache_dir.display());

    clear_cache_dir(&cache_dir);

    tracing::info!("Cache cleared");
    Ok(())
}

fn clear_cache_dir(cache_dir: &Path) {
    if !cache_dir.exists() {
        return;
    }
    DiscoveryCache::open(cache_dir).clear();
}
