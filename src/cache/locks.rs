//! Per-repository scan locks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// One mutex per canonical repository root.
///
/// Two scans of the same repository never overlap, even when requested
/// through different spellings of its root.
#[derive(Debug, Default)]
pub struct RepositoryLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RepositoryLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock object for the repository identified by `key`.
    #[must_use]
    pub fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(key.to_path_buf()).or_default())
    }

    /// Forget the lock for `key`. Holders keep their `Arc`.
    pub fn release(&self, key: &Path) {
        self.locks.lock().remove(key);
    }
}
