//! Filesystem watcher and the service that turns events into builds

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use weft_builder::{BuildInput, BuilderSession, Changeset};
use weft_core::{AnalysisMetadata, ChunkDiff};

use crate::batch::ChangeBatcher;

/// Quiet period after the last event before a batch is built.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

/// File system watcher for module sources
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    watched_paths: HashSet<PathBuf>,
    root_path: PathBuf,
}

impl FileWatcher {
    pub fn new(root_path: impl AsRef<Path>) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    debug!("File system event: {:?}", event);
                    Self::handle_notify_event(event, &event_tx);
                }
                Err(e) => {
                    error!("File system watch error: {}", e);
                }
            }
        })?;

        Ok(Self {
            watcher,
            event_rx,
            watched_paths: HashSet::new(),
            root_path,
        })
    }

    fn handle_notify_event(event: notify::Event, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        use notify::event::ModifyKind;
        use notify::EventKind;

        for path in event.paths {
            if should_ignore_path(&path) || !weft_indexer::languages::is_supported(&path) {
                continue;
            }
            let watch_event = match event.kind {
                EventKind::Create(_) => WatchEvent::Created(path),
                // Renames report both ends; existence tells them apart.
                EventKind::Modify(ModifyKind::Name(_)) if path.exists() => WatchEvent::Created(path),
                EventKind::Modify(ModifyKind::Name(_)) => WatchEvent::Removed(path),
                EventKind::Modify(_) => WatchEvent::Modified(path),
                EventKind::Remove(_) => WatchEvent::Removed(path),
                _ => continue,
            };
            if let Err(e) = event_tx.send(watch_event) {
                warn!("Failed to forward watch event: {}", e);
            }
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Watch a directory recursively
    pub fn watch_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Watching directory: {:?}", path);

        self.watcher.watch(path, RecursiveMode::Recursive)?;
        self.watched_paths.insert(path.to_path_buf());
        Ok(())
    }

    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.contains(path)
    }
}

/// Summary of one committed incremental build, sent to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildNotice {
    pub generation: u64,
    pub elements: usize,
    pub warnings: usize,
    pub chunks: ChunkDiff,
}

/// Lists the current entry modules. Called when files appear or disappear,
/// so new entries join the build without a restart.
pub type EntryResolver = Arc<dyn Fn() -> Result<Vec<PathBuf>> + Send + Sync>;

/// Watches a project root and feeds debounced changesets into a shared
/// builder session.
pub struct WatcherService {
    watcher: Arc<RwLock<FileWatcher>>,
    session: Arc<Mutex<BuilderSession>>,
    metadata: AnalysisMetadata,
    output: Option<PathBuf>,
    debounce: Duration,
    notice_tx: Option<broadcast::Sender<BuildNotice>>,
    entry_resolver: Option<EntryResolver>,
}

impl WatcherService {
    pub fn new(
        root_path: impl AsRef<Path>,
        session: Arc<Mutex<BuilderSession>>,
        metadata: AnalysisMetadata,
    ) -> Result<Self> {
        let watcher = Arc::new(RwLock::new(FileWatcher::new(root_path)?));
        Ok(Self {
            watcher,
            session,
            metadata,
            output: None,
            debounce: DEFAULT_DEBOUNCE,
            notice_tx: None,
            entry_resolver: None,
        })
    }

    /// Write the artifact to `path` after every committed build.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_broadcast(mut self, notice_tx: broadcast::Sender<BuildNotice>) -> Self {
        self.notice_tx = Some(notice_tx);
        self
    }

    pub fn with_entry_resolver(
        mut self,
        resolver: impl Fn() -> Result<Vec<PathBuf>> + Send + Sync + 'static,
    ) -> Self {
        self.entry_resolver = Some(Arc::new(resolver));
        self
    }

    /// Entries to build from when the changeset altered the entry set,
    /// `None` when the committed entries still hold.
    fn changed_entries(
        &self,
        changeset: &Changeset,
        current: Option<&[PathBuf]>,
    ) -> Result<Option<BuildInput>> {
        let Some(resolver) = &self.entry_resolver else {
            return Ok(None);
        };
        if changeset.added.is_empty() && changeset.removed.is_empty() {
            return Ok(None);
        }
        let input = BuildInput {
            entries: resolver()?,
            metadata: changeset.metadata.clone(),
        }
        .normalized();
        if input.entries.is_empty() || current == Some(input.entries.as_slice()) {
            return Ok(None);
        }
        Ok(Some(input))
    }

    pub async fn start_watching(&self) -> Result<()> {
        let mut watcher = self.watcher.write().await;
        let root_path = watcher.root_path.clone();
        watcher.watch_directory(&root_path)?;

        info!("Started watching project directory: {:?}", root_path);
        Ok(())
    }

    /// Receive events until the watcher shuts down. Events arriving within
    /// the debounce window of each other are built as one changeset. A
    /// failed build is logged and the loop keeps going.
    pub async fn process_events(&self) -> Result<()> {
        let mut watcher = self.watcher.write().await;
        let mut batcher = ChangeBatcher::new();

        while let Some(event) = watcher.event_receiver().recv().await {
            batcher.record(event);
            let mut closed = false;
            loop {
                match tokio::time::timeout(self.debounce, watcher.event_receiver().recv()).await {
                    Ok(Some(event)) => batcher.record(event),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            debug!("Flushing {} pending changes", batcher.len());
            let changeset = batcher.take(self.metadata.clone());
            if let Err(e) = self.apply_changeset(changeset).await {
                error!("Incremental build failed: {:#}", e);
            }
            if closed {
                break;
            }
        }

        Ok(())
    }

    /// Run one incremental build. Returns a notice when the session
    /// committed a new generation.
    pub async fn apply_changeset(&self, changeset: Changeset) -> Result<Option<BuildNotice>> {
        if changeset.is_empty() {
            return Ok(None);
        }

        let (artifact, notice) = {
            let mut session = self.session.lock().await;
            let before = session.generation();
            let rebuild = self.changed_entries(&changeset, session.entries())?;
            let artifact = match rebuild {
                Some(input) => {
                    info!("Entry modules changed, rebuilding from {} entries", input.entries.len());
                    session.build(input).await?
                }
                None => session.update(changeset).await?,
            };
            if session.generation() == before {
                debug!("Changeset left the build unchanged, generation stays {}", before);
                return Ok(None);
            }
            let notice = BuildNotice {
                generation: session.generation(),
                elements: artifact.elements.len(),
                warnings: artifact.report.warnings.len(),
                chunks: session.last_chunk_diff().cloned().unwrap_or_default(),
            };
            (artifact, notice)
        };

        if let Some(output) = &self.output {
            artifact.write_json(output).await?;
        }
        info!(
            "Generation {}: {} elements, {} chunks to emit, {} removed",
            notice.generation,
            notice.elements,
            notice.chunks.to_emit().count(),
            notice.chunks.removed.len()
        );
        if let Some(ref notice_tx) = self.notice_tx {
            // No subscribers is fine.
            let _ = notice_tx.send(notice.clone());
        }
        Ok(Some(notice))
    }
}

/// Directories whose contents never belong to a build.
fn should_ignore_path(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(
            component.as_os_str().to_str(),
            Some("node_modules" | ".git" | "target" | ".weft")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use weft_builder::{BuildInput, DescriptorPrebuildSource};
    use weft_indexer::{DiscoveryCache, TypeScriptAnalyzer};

    const USER: &str = "export const userModel = gql.default(({ model }) => model.User({}, () => ({})));\n";
    const POST: &str = "export const postModel = gql.default(({ model }) => model.Post({}, () => ({})));\n";

    async fn built_session(dir: &TempDir) -> Arc<Mutex<BuilderSession>> {
        let entry = dir.path().join("src/user.ts");
        std::fs::create_dir_all(entry.parent().unwrap()).unwrap();
        std::fs::write(&entry, USER).unwrap();

        let mut session = BuilderSession::new(
            Arc::new(TypeScriptAnalyzer::new()),
            Arc::new(DiscoveryCache::in_memory()),
            Arc::new(DescriptorPrebuildSource),
        );
        session
            .build_initial(BuildInput {
                entries: vec![entry],
                metadata: AnalysisMetadata::new("s", "t"),
            })
            .await
            .unwrap();
        Arc::new(Mutex::new(session))
    }

    #[tokio::test]
    async fn test_file_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = FileWatcher::new(temp_dir.path()).unwrap();
        watcher.watch_directory(temp_dir.path()).unwrap();
        assert!(watcher.is_watching(temp_dir.path()));
    }

    #[test]
    fn test_ignored_paths() {
        assert!(should_ignore_path(Path::new("/repo/node_modules/x/index.ts")));
        assert!(should_ignore_path(Path::new("/repo/.weft/snapshots/a.snap")));
        assert!(!should_ignore_path(Path::new("/repo/src/app.ts")));
    }

    #[tokio::test]
    async fn test_apply_changeset_writes_artifact_and_notifies() {
        let dir = TempDir::new().unwrap();
        let session = built_session(&dir).await;
        let output = dir.path().join(".weft/artifact.json");
        let (tx, mut rx) = broadcast::channel(4);
        let service = WatcherService::new(dir.path(), Arc::clone(&session), AnalysisMetadata::new("s", "t"))
            .unwrap()
            .with_output(&output)
            .with_broadcast(tx);

        let user = dir.path().join("src/user.ts");
        std::fs::write(&user, format!("{USER}// edited\n")).unwrap();
        let mut changeset = Changeset::new(AnalysisMetadata::new("s", "t"));
        changeset.updated.push(user);

        let notice = service.apply_changeset(changeset).await.unwrap().unwrap();
        assert_eq!(notice.generation, 2);
        assert_eq!(notice.chunks.updated.len(), 1);
        assert_eq!(rx.recv().await.unwrap(), notice);

        let written = weft_builder::BuilderArtifact::read_json(&output).await.unwrap();
        assert_eq!(written.meta.unwrap().generation, 2);
    }

    #[tokio::test]
    async fn test_unrelated_changes_do_not_advance_generation() {
        let dir = TempDir::new().unwrap();
        let session = built_session(&dir).await;
        let service =
            WatcherService::new(dir.path(), Arc::clone(&session), AnalysisMetadata::new("s", "t")).unwrap();

        let mut changeset = Changeset::new(AnalysisMetadata::new("s", "t"));
        changeset.removed.push(dir.path().join("src/never-tracked.ts"));
        assert!(service.apply_changeset(changeset).await.unwrap().is_none());
        assert_eq!(session.lock().await.generation(), 1);
    }

    #[tokio::test]
    async fn test_created_entry_joins_the_build() {
        let dir = TempDir::new().unwrap();
        let session = built_session(&dir).await;
        let src = dir.path().join("src");
        let service = WatcherService::new(dir.path(), Arc::clone(&session), AnalysisMetadata::new("s", "t"))
            .unwrap()
            .with_entry_resolver(move || {
                let mut entries: Vec<PathBuf> = std::fs::read_dir(&src)?
                    .map(|entry| entry.map(|e| e.path()))
                    .collect::<std::io::Result<_>>()?;
                entries.sort();
                Ok(entries)
            });

        let post = dir.path().join("src/post.ts");
        std::fs::write(&post, POST).unwrap();
        let mut changeset = Changeset::new(AnalysisMetadata::new("s", "t"));
        changeset.added.push(post.clone());

        let notice = service.apply_changeset(changeset).await.unwrap().unwrap();
        assert_eq!(notice.generation, 2);
        assert_eq!(notice.elements, 2);
        assert_eq!(notice.chunks.added, vec![weft_core::chunks::chunk_key(&post)]);

        let session = session.lock().await;
        assert_eq!(session.entries().unwrap().len(), 2);
        assert_eq!(session.current_artifact().unwrap().report.stats.hits, 1);
    }

    #[tokio::test]
    async fn test_edit_to_untracked_file_does_not_advance_generation() {
        let dir = TempDir::new().unwrap();
        let session = built_session(&dir).await;
        let before = session.lock().await.current_artifact().unwrap();
        let service =
            WatcherService::new(dir.path(), Arc::clone(&session), AnalysisMetadata::new("s", "t")).unwrap();

        let scratch = dir.path().join("src/scratch.ts");
        std::fs::write(&scratch, "export const scratch = 1;\n").unwrap();
        let mut changeset = Changeset::new(AnalysisMetadata::new("s", "t"));
        changeset.updated.push(scratch);
        assert!(service.apply_changeset(changeset).await.unwrap().is_none());

        let session = session.lock().await;
        assert_eq!(session.generation(), 1);
        assert!(Arc::ptr_eq(&before, &session.current_artifact().unwrap()));
    }
}
