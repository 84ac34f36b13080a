//! Bounded set of paths known to be up to date.

use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

fn member_key(fold_case: bool, path: &Path) -> Cow<'_, Path> {
    if fold_case {
        Cow::Owned(PathBuf::from(path.to_string_lossy().to_lowercase()))
    } else {
        Cow::Borrowed(path)
    }
}

/// Insertion-ordered, bounded set of up-to-date paths.
///
/// When the capacity is exceeded the oldest eighth is evicted. Evicted
/// paths simply become unknown to the cache again.
///
/// A case-folding set treats paths differing only in case as one member
/// and keeps the spelling it was first given.
#[derive(Debug, Clone)]
pub struct UpToDateSet {
    capacity: usize,
    fold_case: bool,
    order: VecDeque<PathBuf>,
    members: HashSet<PathBuf>,
}

impl UpToDateSet {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_case_folding(capacity, false)
    }

    #[must_use]
    pub fn with_case_folding(capacity: usize, fold_case: bool) -> Self {
        Self {
            capacity: capacity.max(1),
            fold_case,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    fn key<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        member_key(self.fold_case, path)
    }

    /// Insert `path`. Re-inserting keeps its original position.
    ///
    /// Returns `false` if the path was already present.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        let key = self.key(&path).into_owned();
        if !self.members.insert(key) {
            return false;
        }
        self.order.push_back(path);
        if self.order.len() > self.capacity {
            self.evict();
        }
        true
    }

    fn evict(&mut self) {
        let count = (self.capacity / 8).max(1);
        let evicted: Vec<PathBuf> = self.order.drain(..count.min(self.order.len())).collect();
        for path in evicted {
            let key = self.key(&path).into_owned();
            self.members.remove(&key);
        }
        tracing::trace!(evicted = count, remaining = self.order.len(), "Evicted up-to-date paths");
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let key = self.key(path).into_owned();
        if !self.members.remove(&key) {
            return false;
        }
        let position = self.order.iter().position(|p| *self.key(p) == *key);
        if let Some(pos) = position {
            self.order.remove(pos);
        }
        true
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.members.contains(&*self.key(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.order.iter().map(PathBuf::as_path)
    }

    /// Drop every member at or under `root`.
    pub fn remove_under(&mut self, root: &Path) {
        let root = self.key(root).into_owned();
        let fold_case = self.fold_case;
        self.order.retain(|p| !member_key(fold_case, p).starts_with(&root));
        self.members.retain(|p| !p.starts_with(&root));
    }
}
