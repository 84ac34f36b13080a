//! Typed change events and their delivery.
//!
//! Cache mutations and scheduler state changes are published as
//! [`StatusEvent`]s through a [`ChangeNotifier`]. Listeners hold explicit
//! [`Subscription`] handles.

mod notifier;

use std::path::{Path, PathBuf};

use crate::status::StatusEntry;

pub use notifier::{ChangeNotifier, StatusListener, Subscription};

/// Event emitted by the cache and the refresh scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The status of a path changed in a way visible to consumers.
    FileStatusChanged {
        path: PathBuf,
        old: Option<StatusEntry>,
        new: StatusEntry,
    },
    /// A refresh was parked because the repository is locked.
    RepositoryLocked { root: PathBuf },
    /// A repository refresh completed.
    RefreshFinished { root: PathBuf, changed: usize },
    /// A repository refresh failed; cached entries were left as they were.
    RefreshFailed { root: PathBuf, reason: String },
}

impl StatusEvent {
    /// Path the event is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::FileStatusChanged { path, .. } => path,
            Self::RepositoryLocked { root }
            | Self::RefreshFinished { root, .. }
            | Self::RefreshFailed { root, .. } => root,
        }
    }
}
