//! Error types and Result aliases for the status cache.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for status cache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Version control error.
    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Status classification error.
    #[error("status error: {0}")]
    Status(#[from] StatusError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors reported by the version control collaborators.
#[derive(Error, Debug)]
pub enum VcsError {
    /// An object referenced by the index or HEAD is missing.
    #[error("missing object in '{root}': {reason}")]
    MissingObject { root: PathBuf, reason: String },

    /// The repository is locked by another process.
    #[error("repository '{root}' is locked")]
    Locked { root: PathBuf },

    /// The path is not inside a repository.
    #[error("not a repository: '{0}'")]
    NotARepository(PathBuf),

    /// Status query failed.
    #[error("status query failed in '{root}': {reason}")]
    Query { root: PathBuf, reason: String },

    /// Mutation command failed.
    #[error("{command} failed for '{path}': {reason}")]
    Command {
        command: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// The operation observed a cancelled progress token.
    #[error("operation cancelled")]
    Cancelled,
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// Event delivery error.
    #[error("event delivery error: {0}")]
    Delivery(String),
}

/// Status model errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// The three-way comparison cannot be mapped to a status combination.
    #[error("inconsistent status for '{path}': {detail}")]
    Inconsistent { path: PathBuf, detail: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl VcsError {
    /// Create a query error.
    pub fn query(root: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Query {
            root: root.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a command error.
    pub fn command(command: &'static str, path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Command {
            command,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same batch later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::MissingObject { .. } | Self::Locked { .. })
    }
}

impl StatusError {
    /// Create an inconsistency error.
    pub fn inconsistent(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Inconsistent {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
