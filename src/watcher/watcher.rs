//! Working tree watcher using notify-rs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use parking_lot::Mutex;

use super::events::EventBatch;
use crate::error::WatcherError;
use crate::refresh::RefreshQueue;
use crate::vcs::RepositoryRegistry;
use crate::Result;

/// Recursive watcher over registered working trees.
///
/// Debounced events are routed and handed straight to the refresh queue
/// from the debouncer's own thread.
pub struct RepositoryWatcher {
    debouncer: Mutex<Debouncer<RecommendedWatcher>>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
}

impl RepositoryWatcher {
    /// Create a watcher that feeds `queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created.
    pub fn new(
        debounce: Duration,
        registry: Arc<RepositoryRegistry>,
        queue: RefreshQueue,
    ) -> Result<Self> {
        let watched = Arc::new(Mutex::new(Vec::<PathBuf>::new()));
        let watched_in_callback = Arc::clone(&watched);

        let debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let mut batch = EventBatch::new();
                    {
                        let roots = watched_in_callback.lock();
                        for event in events {
                            if is_under_watched(&roots, &event.path) {
                                batch.add(event.path);
                            }
                        }
                    }
                    if !batch.is_empty() {
                        tracing::trace!(paths = batch.len(), "Watcher batch");
                        batch.dispatch(&registry, &queue);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Watch error");
                }
            }
        })
        .map_err(|e| WatcherError::WatchFailed {
            path: "init".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            debouncer: Mutex::new(debouncer),
            watched,
        })
    }

    /// Start watching the working tree at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or cannot be watched.
    pub fn watch(&self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }
        if self.watched.lock().contains(&root) {
            return Ok(());
        }

        self.debouncer
            .lock()
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(root = %root.display(), "Watching working tree");
        self.watched.lock().push(root);
        Ok(())
    }

    /// Stop watching `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher refuses.
    pub fn unwatch(&self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        if !self.watched.lock().iter().any(|p| p == root) {
            return Ok(());
        }

        self.debouncer
            .lock()
            .watcher()
            .unwatch(root)
            .map_err(|e| WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;

        self.watched.lock().retain(|p| p != root);
        tracing::info!(root = %root.display(), "Stopped watching working tree");
        Ok(())
    }

    #[must_use]
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.watched.lock().clone()
    }
}

impl std::fmt::Debug for RepositoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryWatcher")
            .field("watched", &self.watched_roots())
            .finish_non_exhaustive()
    }
}

fn is_under_watched(watched: &[PathBuf], path: &Path) -> bool {
    watched.iter().any(|dir| path.starts_with(dir))
}
