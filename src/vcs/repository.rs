//! Repository registration, discovery and metadata tracking.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use parking_lot::{Mutex, RwLock};

use super::VcsResult;
use crate::error::VcsError;

const GIT_DIR: &str = ".git";
const GITDIR_PREFIX: &str = "gitdir:";

/// Lexically normalize a path: drop `.` components and fold `..`.
///
/// Does not touch the filesystem, so symlinks are not resolved.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Locate the metadata directory of the working tree at `root`.
///
/// Handles both a `.git` directory and a `gitdir:` link file as written
/// for worktrees and submodules.
pub(crate) fn resolve_git_dir(root: &Path) -> Option<PathBuf> {
    let dot_git = root.join(GIT_DIR);
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    if !dot_git.is_file() {
        return None;
    }

    let contents = std::fs::read_to_string(&dot_git).ok()?;
    let target = contents.trim().strip_prefix(GITDIR_PREFIX)?.trim();
    let target = Path::new(target);
    let git_dir = if target.is_absolute() {
        target.to_path_buf()
    } else {
        normalize_path(&root.join(target))
    };
    git_dir.is_dir().then_some(git_dir)
}

/// Whether `path` lies inside a `.git` metadata directory.
#[must_use]
pub(crate) fn is_metadata_path(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == GIT_DIR))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MetadataStamp {
    index: Option<SystemTime>,
    head: Option<SystemTime>,
}

impl MetadataStamp {
    fn read(git_dir: &Path) -> Self {
        let mtime = |name: &str| {
            std::fs::metadata(git_dir.join(name))
                .and_then(|m| m.modified())
                .ok()
        };
        Self {
            index: mtime("index"),
            head: mtime("HEAD"),
        }
    }
}

/// A registered working tree.
#[derive(Debug)]
pub struct RepositoryInfo {
    root: PathBuf,
    git_dir: PathBuf,
    lock_key: PathBuf,
    ignore: RwLock<Gitignore>,
    stamp: Mutex<MetadataStamp>,
}

impl RepositoryInfo {
    /// Open the working tree at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::NotARepository`] if `root` has no `.git`.
    pub fn open(root: impl Into<PathBuf>) -> VcsResult<Self> {
        let root = normalize_path(&root.into());
        let git_dir =
            resolve_git_dir(&root).ok_or_else(|| VcsError::NotARepository(root.clone()))?;
        let lock_key = root.canonicalize().unwrap_or_else(|_| root.clone());
        let ignore = build_ignore(&root, &git_dir);
        let stamp = MetadataStamp::read(&git_dir);

        Ok(Self {
            root,
            git_dir,
            lock_key,
            ignore: RwLock::new(ignore),
            stamp: Mutex::new(stamp),
        })
    }

    /// Working tree root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata directory.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Canonical root, identical for every spelling of the same directory.
    #[must_use]
    pub fn lock_key(&self) -> &Path {
        &self.lock_key
    }

    /// Quick ignore test against the root `.gitignore` and `info/exclude`.
    ///
    /// Nested ignore files are only honoured by a full status query.
    #[must_use]
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if path == self.root || !path.starts_with(&self.root) {
            return false;
        }
        self.ignore
            .read()
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }

    /// Re-read `index` and `HEAD` timestamps.
    ///
    /// Returns `true` if either moved since the last call; ignore rules are
    /// reloaded in that case.
    pub fn refresh_metadata(&self) -> bool {
        let current = MetadataStamp::read(&self.git_dir);
        let mut stamp = self.stamp.lock();
        if *stamp == current {
            return false;
        }
        *stamp = current;
        drop(stamp);

        self.reload_ignore();
        tracing::debug!(root = %self.root.display(), "Repository metadata changed");
        true
    }

    /// Re-read the root `.gitignore` and `info/exclude`.
    pub fn reload_ignore(&self) {
        *self.ignore.write() = build_ignore(&self.root, &self.git_dir);
    }
}

fn build_ignore(root: &Path, git_dir: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for file in [root.join(".gitignore"), git_dir.join("info").join("exclude")] {
        if file.is_file() {
            if let Some(e) = builder.add(&file) {
                tracing::warn!(file = %file.display(), error = %e, "Failed to parse ignore file");
            }
        }
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!(root = %root.display(), error = %e, "Failed to build ignore rules");
        Gitignore::empty()
    })
}

/// Registered repository roots.
///
/// Lookups resolve a path to the deepest registered root containing it.
/// With auto-discovery enabled, unregistered ancestors holding a `.git`
/// entry are registered on first lookup.
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    auto_discover: bool,
    repositories: RwLock<BTreeMap<PathBuf, Arc<RepositoryInfo>>>,
}

impl RepositoryRegistry {
    #[must_use]
    pub fn new(auto_discover: bool) -> Self {
        Self {
            auto_discover,
            repositories: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register the working tree at `root`.
    ///
    /// Registering an already known root returns the existing record.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::NotARepository`] if `root` is relative or has
    /// no `.git`.
    pub fn register(&self, root: impl AsRef<Path>) -> VcsResult<Arc<RepositoryInfo>> {
        let root = normalize_path(root.as_ref());
        if !root.is_absolute() {
            return Err(VcsError::NotARepository(root));
        }
        if let Some(info) = self.repositories.read().get(&root) {
            return Ok(Arc::clone(info));
        }

        let info = Arc::new(RepositoryInfo::open(root.clone())?);
        let info = Arc::clone(
            self.repositories
                .write()
                .entry(root.clone())
                .or_insert(info),
        );
        tracing::info!(root = %root.display(), git_dir = %info.git_dir().display(), "Registered repository");
        Ok(info)
    }

    /// Forget a root. Returns its record if it was registered.
    pub fn unregister(&self, root: &Path) -> Option<Arc<RepositoryInfo>> {
        let removed = self.repositories.write().remove(&normalize_path(root));
        if removed.is_some() {
            tracing::info!(root = %root.display(), "Unregistered repository");
        }
        removed
    }

    /// Registered roots in path order.
    #[must_use]
    pub fn roots(&self) -> Vec<PathBuf> {
        self.repositories.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, root: &Path) -> Option<Arc<RepositoryInfo>> {
        self.repositories.read().get(root).cloned()
    }

    /// Repository owning `path`, if any.
    ///
    /// Paths inside `.git` are never owned.
    #[must_use]
    pub fn owning_repository(&self, path: &Path) -> Option<Arc<RepositoryInfo>> {
        let path = normalize_path(path);
        if !path.is_absolute() || is_metadata_path(&path) {
            return None;
        }

        for ancestor in path.ancestors() {
            if let Some(info) = self.repositories.read().get(ancestor) {
                return Some(Arc::clone(info));
            }
            if self.auto_discover && resolve_git_dir(ancestor).is_some() {
                return self.register(ancestor).ok();
            }
        }
        None
    }

    /// Root of the repository owning `path`, if any.
    #[must_use]
    pub fn owning_root(&self, path: &Path) -> Option<PathBuf> {
        self.owning_repository(path).map(|info| info.root().to_path_buf())
    }

    /// Whether `path` is under version control management.
    #[must_use]
    pub fn is_managed(&self, path: &Path) -> bool {
        self.owning_repository(path).is_some()
    }
}
