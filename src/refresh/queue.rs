//! Request channel into the refresh scheduler.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Outcome of one repository scan, reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Scan applied; `changed` events were published.
    Completed { changed: usize },
    /// The repository was locked by another process.
    Locked,
    /// The scan failed or was cancelled.
    Failed { reason: String, retryable: bool },
}

/// Message understood by the scheduler thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshCommand {
    /// Refresh `paths` after the debounce window.
    Schedule(Vec<PathBuf>),
    /// Refresh `paths` without waiting.
    RefreshNow(Vec<PathBuf>),
    /// Repository metadata under `root` may have moved.
    MetadataChanged(PathBuf),
    /// A worker finished scanning `seeds` of `root`.
    Finished {
        root: PathBuf,
        seeds: Vec<PathBuf>,
        outcome: ScanOutcome,
        elapsed: Duration,
    },
    /// Stop the scheduler thread.
    Shutdown,
}

/// Cloneable handle for submitting refresh requests.
///
/// A detached queue drops every request, for caches used without a
/// scheduler.
#[derive(Debug, Clone)]
pub struct RefreshQueue {
    tx: Option<Sender<RefreshCommand>>,
}

impl RefreshQueue {
    /// Create a queue and the receiver the scheduler drains.
    #[must_use]
    pub fn channel() -> (Self, Receiver<RefreshCommand>) {
        let (tx, rx) = unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    #[must_use]
    pub const fn detached() -> Self {
        Self { tx: None }
    }

    /// Request a debounced refresh of `paths`.
    pub fn schedule(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        if !paths.is_empty() {
            self.send(RefreshCommand::Schedule(paths));
        }
    }

    /// Request an immediate refresh of `paths`.
    pub fn refresh_now(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        if !paths.is_empty() {
            self.send(RefreshCommand::RefreshNow(paths));
        }
    }

    /// Report that metadata under `root` may have changed.
    pub fn metadata_changed(&self, root: impl Into<PathBuf>) {
        self.send(RefreshCommand::MetadataChanged(root.into()));
    }

    pub(crate) fn send(&self, command: RefreshCommand) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(command).is_err() {
            tracing::trace!("Refresh scheduler gone, dropping request");
        }
    }
}
