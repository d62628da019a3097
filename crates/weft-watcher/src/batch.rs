//! Folding raw watch events into a changeset

use std::collections::BTreeMap;
use std::path::PathBuf;

use weft_builder::Changeset;
use weft_core::AnalysisMetadata;

use crate::watcher::WatchEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Added,
    Updated,
    Removed,
}

/// Accumulates events between flushes. Later events for a path refine
/// earlier ones: a file created and deleted within one batch disappears,
/// a file deleted and re-created counts as updated.
#[derive(Debug, Default)]
pub struct ChangeBatcher {
    pending: BTreeMap<PathBuf, Pending>,
}

impl ChangeBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: WatchEvent) {
        let (path, next) = match event {
            WatchEvent::Created(path) => (path, Pending::Added),
            WatchEvent::Modified(path) => (path, Pending::Updated),
            WatchEvent::Removed(path) => (path, Pending::Removed),
        };

        let merged = match (self.pending.get(&path).copied(), next) {
            (None, next) => Some(next),
            (Some(Pending::Added), Pending::Removed) => None,
            (Some(Pending::Added), _) => Some(Pending::Added),
            (Some(Pending::Removed), Pending::Added | Pending::Updated) => Some(Pending::Updated),
            (Some(_), next) => Some(next),
        };

        match merged {
            Some(state) => {
                self.pending.insert(path, state);
            }
            None => {
                self.pending.remove(&path);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drain the batch into a changeset.
    pub fn take(&mut self, metadata: AnalysisMetadata) -> Changeset {
        let mut changeset = Changeset::new(metadata);
        for (path, state) in std::mem::take(&mut self.pending) {
            match state {
                Pending::Added => changeset.added.push(path),
                Pending::Updated => changeset.updated.push(path),
                Pending::Removed => changeset.removed.push(path),
            }
        }
        changeset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/src/{name}.ts"))
    }

    #[test]
    fn events_for_one_path_are_folded() {
        let mut batcher = ChangeBatcher::new();
        batcher.record(WatchEvent::Created(p("new")));
        batcher.record(WatchEvent::Modified(p("new")));
        batcher.record(WatchEvent::Created(p("tmp")));
        batcher.record(WatchEvent::Removed(p("tmp")));
        batcher.record(WatchEvent::Removed(p("swap")));
        batcher.record(WatchEvent::Created(p("swap")));
        batcher.record(WatchEvent::Modified(p("old")));
        batcher.record(WatchEvent::Removed(p("old")));

        let changeset = batcher.take(AnalysisMetadata::default());
        assert_eq!(changeset.added, vec![p("new")]);
        assert_eq!(changeset.updated, vec![p("swap")]);
        assert_eq!(changeset.removed, vec![p("old")]);
        assert!(batcher.is_empty());
    }
}
