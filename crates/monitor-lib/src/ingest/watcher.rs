//! Filesystem-event trigger for the watch directory
//!
//! Emits the path of every created or modified flow file. Consumers must
//! still route each path through the regular per-file processing (stability
//! gate, per-path lock, ledger); the watcher only says "look at this now".

use super::has_extension;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Watches a directory for created/modified files with a given extension
pub struct DirectoryWatcher {
    watch_dir: PathBuf,
    extension: String,
    event_tx: mpsc::Sender<PathBuf>,
}

/// Keeps the underlying OS watcher alive; dropping it stops notifications
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        event_tx: mpsc::Sender<PathBuf>,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            extension: extension.into(),
            event_tx,
        }
    }

    /// Start watching. Events are delivered until the handle is dropped.
    pub fn start(self) -> Result<WatcherHandle> {
        let extension = self.extension.clone();
        let event_tx = self.event_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for path in relevant_paths(&event, &extension) {
                        // Runs on the notify thread, outside the runtime.
                        if event_tx.blocking_send(path).is_err() {
                            debug!("Watcher channel closed");
                            return;
                        }
                    }
                }
                Err(e) => debug!(error = %e, "Filesystem watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(&self.watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.watch_dir.display()))?;
        info!(path = %self.watch_dir.display(), "Watching flow directory for events");

        Ok(WatcherHandle { _watcher: watcher })
    }
}

/// Paths from an event that should trigger processing
fn relevant_paths(event: &Event, extension: &str) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| has_extension(p, extension))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}
