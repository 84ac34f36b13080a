//! Per-directory secondary indexes over the primary status map.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::status::StatusEntry;
use crate::vcs::RepositoryRegistry;

/// Directory-keyed index of the paths in one status category.
///
/// Every flagged path is linked into its parent's child set, and so on up
/// to the filesystem root, so a traversal can start at any directory and
/// descend only into subtrees that hold flagged paths.
#[derive(Debug, Default, Clone)]
pub struct DirectoryIndex {
    children: HashMap<PathBuf, BTreeSet<PathBuf>>,
    flagged: HashSet<PathBuf>,
}

impl DirectoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `set` into the children recorded for `parent`.
    pub fn add(&mut self, parent: impl Into<PathBuf>, set: impl IntoIterator<Item = PathBuf>) {
        let parent = parent.into();
        let mut set = set.into_iter().peekable();
        if set.peek().is_some() {
            self.children.entry(parent).or_default().extend(set);
        }
    }

    /// Children recorded for `parent`.
    #[must_use]
    pub fn get(&self, parent: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.children.get(parent)
    }

    /// Flag `path` and link its ancestors. Returns `false` if already flagged.
    pub fn insert(&mut self, path: &Path) -> bool {
        if !self.flagged.insert(path.to_path_buf()) {
            return false;
        }
        let mut child = path;
        while let Some(parent) = child.parent() {
            let fresh = self
                .children
                .entry(parent.to_path_buf())
                .or_default()
                .insert(child.to_path_buf());
            if !fresh {
                break;
            }
            child = parent;
        }
        true
    }

    /// Unflag `path` and prune links that no longer lead anywhere.
    ///
    /// Returns `false` if the path was not flagged.
    pub fn remove(&mut self, path: &Path) -> bool {
        if !self.flagged.remove(path) {
            return false;
        }
        let mut current = path;
        loop {
            let still_needed = self.flagged.contains(current)
                || self.children.get(current).is_some_and(|c| !c.is_empty());
            if still_needed {
                break;
            }
            let Some(parent) = current.parent() else {
                break;
            };
            let Some(siblings) = self.children.get_mut(parent) else {
                break;
            };
            siblings.remove(current);
            if siblings.is_empty() {
                self.children.remove(parent);
            }
            current = parent;
        }
        true
    }

    /// Whether `path` itself is flagged.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.flagged.contains(path)
    }

    /// Number of flagged paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }

    /// Visit flagged paths at or under `root` until `visitor` returns `false`.
    ///
    /// Returns `false` if the walk was stopped early.
    pub fn visit(&self, root: &Path, mut visitor: impl FnMut(&Path) -> bool) -> bool {
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            if self.flagged.contains(dir) && !visitor(dir) {
                return false;
            }
            if let Some(children) = self.children.get(dir) {
                stack.extend(children.iter().map(PathBuf::as_path));
            }
        }
        true
    }

    /// Flagged paths at or under `root`.
    #[must_use]
    pub fn descendants(&self, root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.visit(root, |p| {
            out.push(p.to_path_buf());
            true
        });
        out
    }

    /// Flagged direct children of `dir`.
    #[must_use]
    pub fn flagged_children(&self, dir: &Path) -> Vec<PathBuf> {
        self.children
            .get(dir)
            .map(|c| c.iter().filter(|p| self.flagged.contains(*p)).cloned().collect())
            .unwrap_or_default()
    }
}

/// Index category a cached entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Conflicted,
    Modified,
    Ignored,
}

impl Category {
    pub const ALL: [Self; 3] = [Self::Conflicted, Self::Modified, Self::Ignored];

    /// Category of `entry`, if it belongs to any.
    #[must_use]
    pub fn of(entry: &StatusEntry) -> Option<Self> {
        if entry.is_conflict() {
            Some(Self::Conflicted)
        } else if entry.has_local_changes() {
            Some(Self::Modified)
        } else if entry.is_excluded() {
            Some(Self::Ignored)
        } else {
            None
        }
    }
}

/// The three category indexes kept beside the primary map.
#[derive(Debug, Default, Clone)]
pub struct StatusIndexes {
    conflicted: DirectoryIndex,
    modified: DirectoryIndex,
    ignored: DirectoryIndex,
}

impl StatusIndexes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn index(&self, category: Category) -> &DirectoryIndex {
        match category {
            Category::Conflicted => &self.conflicted,
            Category::Modified => &self.modified,
            Category::Ignored => &self.ignored,
        }
    }

    fn index_mut(&mut self, category: Category) -> &mut DirectoryIndex {
        match category {
            Category::Conflicted => &mut self.conflicted,
            Category::Modified => &mut self.modified,
            Category::Ignored => &mut self.ignored,
        }
    }

    /// Move `path` between categories. Untouched when membership is unchanged.
    pub fn update(&mut self, path: &Path, old: Option<&StatusEntry>, new: Option<&StatusEntry>) {
        let before = old.and_then(Category::of);
        let after = new.and_then(Category::of);
        if before == after {
            return;
        }
        if let Some(category) = before {
            self.index_mut(category).remove(path);
        }
        if let Some(category) = after {
            self.index_mut(category).insert(path);
        }
    }

    /// Drop every path at or under `root`.
    pub fn remove_under(&mut self, root: &Path) {
        for category in Category::ALL {
            let index = self.index_mut(category);
            for path in index.descendants(root) {
                index.remove(&path);
            }
        }
    }

    /// Total number of indexed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conflicted.len() + self.modified.len() + self.ignored.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keep only paths whose owning repository is one of `repo_roots`.
///
/// Drops paths that belong to a repository nested below a queried root.
#[must_use]
pub fn check_belong_to_repository(
    paths: Vec<PathBuf>,
    repo_roots: &[PathBuf],
    registry: &RepositoryRegistry,
) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|path| {
            registry
                .owning_root(path)
                .is_some_and(|root| repo_roots.contains(&root))
        })
        .collect()
}
