//! `git2` implementation of the VCS collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{ErrorCode, IndexAddOption, Repository, StatusOptions};

use super::repository::resolve_git_dir;
use super::{LockProbe, StatusProvider, VcsCommands, VcsResult};
use crate::error::VcsError;
use crate::refresh::ProgressToken;
use crate::status::{Change, ConflictKind, RawStatus};

const INDEX_LOCK: &str = "index.lock";

/// Git backend built on libgit2.
///
/// Stateless: every call opens the repository afresh so that changes made
/// by external git processes are always observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitBackend;

impl GitBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn open(root: &Path) -> VcsResult<Repository> {
        Repository::open(root).map_err(|e| match e.code() {
            ErrorCode::NotFound => VcsError::NotARepository(root.to_path_buf()),
            _ => map_query_error(root, &e),
        })
    }
}

fn map_query_error(root: &Path, e: &git2::Error) -> VcsError {
    match e.code() {
        ErrorCode::Locked => VcsError::Locked {
            root: root.to_path_buf(),
        },
        ErrorCode::NotFound => VcsError::MissingObject {
            root: root.to_path_buf(),
            reason: e.message().to_string(),
        },
        _ => VcsError::query(root, e.message()),
    }
}

fn relative(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

fn index_change(flags: git2::Status) -> Change {
    if flags.intersects(git2::Status::INDEX_NEW | git2::Status::INDEX_RENAMED) {
        Change::Added
    } else if flags.intersects(git2::Status::INDEX_MODIFIED | git2::Status::INDEX_TYPECHANGE) {
        Change::Modified
    } else if flags.contains(git2::Status::INDEX_DELETED) {
        Change::Deleted
    } else {
        Change::Unmodified
    }
}

fn worktree_change(flags: git2::Status) -> Change {
    if flags.contains(git2::Status::WT_NEW) {
        Change::Added
    } else if flags.intersects(
        git2::Status::WT_MODIFIED | git2::Status::WT_TYPECHANGE | git2::Status::WT_RENAMED,
    ) {
        Change::Modified
    } else if flags.contains(git2::Status::WT_DELETED) {
        Change::Deleted
    } else {
        Change::Unmodified
    }
}

// one path may be reported twice, e.g. a rename source that reappears
// untracked on disk
fn merge_into(result: &mut HashMap<PathBuf, RawStatus>, path: PathBuf, raw: RawStatus) {
    let slot = result.entry(path).or_default();
    if raw.head_index != Change::Unmodified {
        slot.head_index = raw.head_index;
    }
    if raw.index_worktree != Change::Unmodified {
        slot.index_worktree = raw.index_worktree;
    }
    slot.ignored |= raw.ignored;
    if raw.renamed_from.is_some() {
        slot.renamed_from = raw.renamed_from;
    }
    if raw.conflict.is_some() {
        slot.conflict = raw.conflict;
    }
}

fn in_scope(seeds: Option<&[PathBuf]>, path: &Path) -> bool {
    seeds.map_or(true, |seeds| {
        seeds
            .iter()
            .any(|seed| path.starts_with(seed) || seed.starts_with(path))
    })
}

impl StatusProvider for GitBackend {
    fn query_status(
        &self,
        root: &Path,
        paths: &[PathBuf],
        token: &ProgressToken,
    ) -> VcsResult<HashMap<PathBuf, RawStatus>> {
        token.check()?;
        let repo = Self::open(root)?;
        if repo.is_bare() {
            return Err(VcsError::NotARepository(root.to_path_buf()));
        }

        let whole_root = paths.is_empty() || paths.iter().any(|p| p == root);
        let seeds = (!whole_root).then_some(paths);

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(true)
            .recurse_untracked_dirs(true)
            .recurse_ignored_dirs(false)
            .renames_head_to_index(true);
        if let Some(seeds) = seeds {
            for rel in seeds.iter().filter_map(|p| relative(root, p)) {
                if !rel.as_os_str().is_empty() {
                    opts.pathspec(rel);
                }
            }
        }

        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| map_query_error(root, &e))?;

        let mut result = HashMap::new();
        for entry in statuses.iter() {
            token.check()?;
            let flags = entry.status();
            if flags.contains(git2::Status::CONFLICTED) {
                continue;
            }

            let Some(rel) = entry.path() else {
                tracing::warn!(root = %root.display(), "Skipping non UTF-8 path");
                continue;
            };
            let path = root.join(rel.trim_end_matches('/'));

            if flags.is_ignored() {
                merge_into(&mut result, path, RawStatus::ignored());
                continue;
            }

            let head_index = index_change(flags);
            let index_worktree = worktree_change(flags);

            if flags.contains(git2::Status::INDEX_RENAMED) {
                let delta = entry.head_to_index();
                let old = delta.as_ref().and_then(|d| d.old_file().path()).map(|p| root.join(p));
                let new = delta.as_ref().and_then(|d| d.new_file().path()).map(|p| root.join(p));
                if let (Some(old), Some(new)) = (old, new) {
                    merge_into(
                        &mut result,
                        old.clone(),
                        RawStatus::new(Change::Deleted, Change::Unmodified),
                    );
                    merge_into(
                        &mut result,
                        new,
                        RawStatus::new(head_index, index_worktree).renamed_from(old),
                    );
                    continue;
                }
            }

            merge_into(&mut result, path, RawStatus::new(head_index, index_worktree));
        }

        let index = repo.index().map_err(|e| map_query_error(root, &e))?;
        if index.has_conflicts() {
            let conflicts = index.conflicts().map_err(|e| map_query_error(root, &e))?;
            for conflict in conflicts {
                token.check()?;
                let conflict = conflict.map_err(|e| map_query_error(root, &e))?;
                let Some(kind) = ConflictKind::from_stages(
                    conflict.ancestor.is_some(),
                    conflict.our.is_some(),
                    conflict.their.is_some(),
                ) else {
                    continue;
                };
                let Some(stage) = conflict
                    .our
                    .as_ref()
                    .or(conflict.their.as_ref())
                    .or(conflict.ancestor.as_ref())
                else {
                    continue;
                };
                let path = root.join(String::from_utf8_lossy(&stage.path).as_ref());
                if in_scope(seeds, &path) {
                    merge_into(&mut result, path, RawStatus::conflicted(kind));
                }
            }
        }

        tracing::debug!(
            root = %root.display(),
            seeds = paths.len(),
            reported = result.len(),
            "Status query finished"
        );
        Ok(result)
    }
}

impl VcsCommands for GitBackend {
    fn is_tracked(&self, root: &Path, path: &Path) -> VcsResult<bool> {
        let repo = Self::open(root)?;
        let index = repo
            .index()
            .map_err(|e| VcsError::command("ls-files", path, e))?;
        let Some(rel) = relative(root, path) else {
            return Ok(false);
        };
        if rel.as_os_str().is_empty() {
            return Ok(!index.is_empty());
        }
        if index.get_path(&rel, 0).is_some() {
            return Ok(true);
        }

        let prefix = format!("{}/", rel.to_string_lossy());
        Ok(index
            .iter()
            .any(|entry| entry.path.starts_with(prefix.as_bytes())))
    }

    fn remove(&self, root: &Path, path: &Path) -> VcsResult<()> {
        self.remove_from_index(root, path)?;
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else if path.exists() {
            std::fs::remove_file(path)
        } else {
            Ok(())
        };
        removed.map_err(|e| VcsError::command("rm", path, e))?;
        tracing::debug!(path = %path.display(), "Removed tracked path");
        Ok(())
    }

    fn remove_from_index(&self, root: &Path, path: &Path) -> VcsResult<()> {
        let repo = Self::open(root)?;
        let rel = relative(root, path)
            .ok_or_else(|| VcsError::command("rm --cached", path, "path outside repository"))?;
        let mut index = repo
            .index()
            .map_err(|e| VcsError::command("rm --cached", path, e))?;
        index
            .remove_all([rel.as_path()], None)
            .and_then(|()| index.write())
            .map_err(|e| VcsError::command("rm --cached", path, e))
    }

    fn rename(&self, root: &Path, from: &Path, to: &Path) -> VcsResult<()> {
        let repo = Self::open(root)?;
        let (Some(rel_from), Some(rel_to)) = (relative(root, from), relative(root, to)) else {
            return Err(VcsError::command("mv", from, "path outside repository"));
        };

        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VcsError::command("mv", to, e))?;
        }
        std::fs::rename(from, to).map_err(|e| VcsError::command("mv", from, e))?;

        let mut index = repo.index().map_err(|e| VcsError::command("mv", from, e))?;
        index
            .remove_all([rel_from.as_path()], None)
            .and_then(|()| index.add_all([rel_to.as_path()], IndexAddOption::FORCE, None))
            .and_then(|()| index.write())
            .map_err(|e| VcsError::command("mv", from, e))?;
        tracing::debug!(from = %from.display(), to = %to.display(), "Renamed tracked path");
        Ok(())
    }

    fn copy_after(&self, root: &Path, from: &Path, to: &Path) -> VcsResult<()> {
        let repo = Self::open(root)?;
        let rel_to = relative(root, to)
            .ok_or_else(|| VcsError::command("add", to, "path outside repository"))?;
        let mut index = repo.index().map_err(|e| VcsError::command("add", to, e))?;
        index
            .add_all([rel_to.as_path()], IndexAddOption::DEFAULT, None)
            .and_then(|()| index.write())
            .map_err(|e| VcsError::command("add", to, e))?;
        tracing::debug!(from = %from.display(), to = %to.display(), "Added copy to index");
        Ok(())
    }

    fn reset(&self, root: &Path, paths: &[PathBuf]) -> VcsResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let repo = Self::open(root)?;
        let rels: Vec<PathBuf> = paths.iter().filter_map(|p| relative(root, p)).collect();

        let head = repo.head().and_then(|head| head.peel_to_commit());
        match head {
            Ok(commit) => repo
                .reset_default(Some(commit.as_object()), rels.iter().map(PathBuf::as_path))
                .map_err(|e| VcsError::command("reset", root, e)),
            // unborn branch: nothing to reset to, unstage instead
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                let mut index = repo.index().map_err(|e| VcsError::command("reset", root, e))?;
                index
                    .remove_all(rels.iter().map(PathBuf::as_path), None)
                    .and_then(|()| index.write())
                    .map_err(|e| VcsError::command("reset", root, e))
            }
            Err(e) => Err(VcsError::command("reset", root, e)),
        }
    }
}

impl LockProbe for GitBackend {
    fn is_locked(&self, root: &Path) -> bool {
        resolve_git_dir(root).is_some_and(|git_dir| git_dir.join(INDEX_LOCK).exists())
    }
}
