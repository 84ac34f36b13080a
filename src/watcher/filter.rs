//! Routing of raw filesystem events.
//!
//! Working tree paths become refresh requests. Paths inside `.git` only
//! matter when they move the index, `HEAD` or refs; object and log churn
//! is dropped.

use std::path::{Component, Path, PathBuf};

/// Metadata files whose change invalidates cached status.
const METADATA_FILES: &[&str] = &[
    "index",
    "HEAD",
    "ORIG_HEAD",
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
    "packed-refs",
];

/// What a changed path means for the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Working tree path whose status may have changed.
    Worktree(PathBuf),
    /// Repository metadata of the working tree at this root changed.
    Metadata(PathBuf),
    /// Nothing to do.
    Ignored,
}

/// Classify one event path.
#[must_use]
pub fn route(path: &Path) -> WatchAction {
    let mut components = path.components();
    let mut root = PathBuf::new();
    while let Some(component) = components.next() {
        if matches!(component, Component::Normal(name) if name == ".git") {
            return route_metadata(root, components.as_path());
        }
        root.push(component);
    }
    WatchAction::Worktree(path.to_path_buf())
}

fn route_metadata(root: PathBuf, rest: &Path) -> WatchAction {
    let Some(Component::Normal(first)) = rest.components().next() else {
        return WatchAction::Metadata(root);
    };
    if rest.extension().is_some_and(|ext| ext == "lock") {
        return WatchAction::Ignored;
    }

    let first = first.to_string_lossy();
    if first == "refs" || METADATA_FILES.contains(&first.as_ref()) {
        WatchAction::Metadata(root)
    } else {
        WatchAction::Ignored
    }
}

/// Whether `path` names a `.gitignore` file.
#[must_use]
pub fn is_ignore_file(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == ".gitignore")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worktree_paths() {
        assert_eq!(
            route(Path::new("/repo/src/main.rs")),
            WatchAction::Worktree(PathBuf::from("/repo/src/main.rs"))
        );
        assert_eq!(
            route(Path::new("/repo/.gitignore")),
            WatchAction::Worktree(PathBuf::from("/repo/.gitignore"))
        );
    }

    #[test]
    fn test_metadata_paths() {
        for rel in [
            "index",
            "HEAD",
            "ORIG_HEAD",
            "MERGE_HEAD",
            "CHERRY_PICK_HEAD",
            "packed-refs",
            "refs/heads/main",
            "refs/tags/v1",
        ] {
            assert_eq!(
                route(&Path::new("/repo/.git").join(rel)),
                WatchAction::Metadata(PathBuf::from("/repo")),
                "{rel}"
            );
        }
    }

    #[test]
    fn test_dropped_metadata_paths() {
        for rel in [
            "objects/ab/cdef",
            "logs/HEAD",
            "index.lock",
            "refs/heads/main.lock",
            "config",
            "hooks/pre-commit",
        ] {
            assert_eq!(
                route(&Path::new("/repo/.git").join(rel)),
                WatchAction::Ignored,
                "{rel}"
            );
        }
    }

    #[test]
    fn test_git_dir_itself() {
        assert_eq!(
            route(Path::new("/repo/.git")),
            WatchAction::Metadata(PathBuf::from("/repo"))
        );
    }

    #[test]
    fn test_is_ignore_file() {
        assert!(is_ignore_file(Path::new("/repo/sub/.gitignore")));
        assert!(!is_ignore_file(Path::new("/repo/.gitattributes")));
    }
}
