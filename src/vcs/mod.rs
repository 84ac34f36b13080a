//! Version control collaborators.
//!
//! This module provides:
//! - The [`StatusProvider`], [`VcsCommands`] and [`LockProbe`] seams
//! - Repository registration and discovery ([`RepositoryRegistry`])
//! - A `git2` implementation of all three seams ([`GitBackend`])

mod git;
mod repository;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::VcsError;
use crate::refresh::ProgressToken;
use crate::status::RawStatus;

pub use git::GitBackend;
pub use repository::{normalize_path, RepositoryInfo, RepositoryRegistry};

/// Result of VCS collaborator calls.
pub type VcsResult<T> = std::result::Result<T, VcsError>;

/// Computes raw statuses for paths inside one repository.
pub trait StatusProvider: Send + Sync {
    /// Query statuses for `paths` (recursively for directories) under `root`.
    ///
    /// Paths absent from the returned map are up to date, or unknown if they
    /// no longer exist. Implementations should check `token` between paths.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::MissingObject`] or [`VcsError::Locked`] for
    /// transient failures, [`VcsError::Cancelled`] when `token` fires.
    fn query_status(
        &self,
        root: &Path,
        paths: &[PathBuf],
        token: &ProgressToken,
    ) -> VcsResult<HashMap<PathBuf, RawStatus>>;
}

/// Mutating VCS commands used by the filesystem interceptor.
///
/// # Errors
///
/// Every method returns [`VcsError::Command`] on failure.
pub trait VcsCommands: Send + Sync {
    /// Whether `path`, or anything under it, is in the index.
    fn is_tracked(&self, root: &Path, path: &Path) -> VcsResult<bool>;

    /// Remove a tracked path from the index and the working tree.
    fn remove(&self, root: &Path, path: &Path) -> VcsResult<()>;

    /// Remove a path from the index, keeping it on disk.
    fn remove_from_index(&self, root: &Path, path: &Path) -> VcsResult<()>;

    /// Move a tracked path, recording the move in the index.
    fn rename(&self, root: &Path, from: &Path, to: &Path) -> VcsResult<()>;

    /// Add an already copied path to the index.
    fn copy_after(&self, root: &Path, from: &Path, to: &Path) -> VcsResult<()>;

    /// Reset index entries for `paths` to HEAD.
    fn reset(&self, root: &Path, paths: &[PathBuf]) -> VcsResult<()>;
}

/// Detects repositories locked by another process.
pub trait LockProbe: Send + Sync {
    fn is_locked(&self, root: &Path) -> bool;
}
