//! Filesystem events batched into incremental builds

pub mod batch;
pub mod watcher;

pub use batch::ChangeBatcher;
pub use watcher::{BuildNotice, EntryResolver, FileWatcher, WatchEvent, WatcherService};
