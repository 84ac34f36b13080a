//! Filesystem operations routed through version control.
//!
//! Deleting, renaming and copying files inside a working tree should also
//! update the index so the change shows up as a removal, move or addition
//! rather than as a missing or untracked file. [`FileInterceptor`] performs
//! the operation and then schedules a refresh of every affected path; it
//! never edits the cache directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::config::Config;
use crate::refresh::RefreshQueue;
use crate::vcs::{normalize_path, RepositoryInfo, RepositoryRegistry, VcsCommands};
use crate::{Error, Result};

/// Performs filesystem mutations with matching index updates.
pub struct FileInterceptor {
    registry: Arc<RepositoryRegistry>,
    commands: Arc<dyn VcsCommands>,
    queue: RefreshQueue,
    exclude_new_files: bool,
    case_insensitive: bool,
}

impl FileInterceptor {
    #[must_use]
    pub fn new(
        config: &Config,
        registry: Arc<RepositoryRegistry>,
        commands: Arc<dyn VcsCommands>,
        queue: RefreshQueue,
    ) -> Self {
        Self {
            registry,
            commands,
            queue,
            exclude_new_files: config.exclude_new_files,
            case_insensitive: config.case_insensitive,
        }
    }

    /// A file or directory was created outside the interceptor.
    pub fn after_create(&self, path: &Path) {
        self.queue.schedule([normalize_path(path)]);
    }

    /// File content changed outside the interceptor.
    pub fn after_change(&self, path: &Path) {
        self.queue.schedule([normalize_path(path)]);
    }

    /// Delete `path`, removing it from the index when tracked.
    ///
    /// # Errors
    ///
    /// Returns the VCS or I/O error; nothing is scheduled in that case.
    pub fn delete(&self, path: &Path) -> Result<()> {
        let path = normalize_path(path);
        match self.tracked_in(&path)? {
            Some(repo) => self.commands.remove(repo.root(), &path)?,
            None => remove_path(&path)?,
        }

        tracing::debug!(path = %path.display(), "Deleted");
        self.queue.schedule(with_parent(&path));
        Ok(())
    }

    /// Rename `from` to `to`.
    ///
    /// Tracked paths moved within one repository are recorded as a move.
    /// Tracked paths leaving their repository are removed from its index;
    /// if that fails the move is undone.
    ///
    /// # Errors
    ///
    /// Returns the VCS or I/O error. Nothing is scheduled unless a failed
    /// step could not be undone.
    pub fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = normalize_path(from);
        let to = normalize_path(to);
        if from == to {
            return Ok(());
        }

        if self.case_insensitive && is_case_only_change(&from, &to) {
            let temp = temp_sibling(&from)?;
            self.move_path(&from, &temp)?;
            if let Err(e) = self.move_path(&temp, &to) {
                if let Err(undo) = self.move_path(&temp, &from) {
                    tracing::error!(
                        path = %from.display(),
                        error = %undo,
                        "Failed to restore path after case-only rename"
                    );
                    self.queue.schedule(with_parent(&temp));
                }
                return Err(e);
            }
        } else {
            self.move_path(&from, &to)?;
        }

        tracing::debug!(from = %from.display(), to = %to.display(), "Renamed");
        let mut affected = with_parent(&from);
        affected.extend(with_parent(&to));
        self.queue.schedule(affected);
        Ok(())
    }

    /// Copy `from` to `to`, recursively for directories.
    ///
    /// The copy is added to the index when the source is tracked and the
    /// target lands in a working tree, unless new files are excluded by
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns the VCS or I/O error. Whatever was copied before the failure
    /// stays on disk and is still scheduled for refresh.
    pub fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let from = normalize_path(from);
        let to = normalize_path(to);
        if to.starts_with(&from) && from.is_dir() {
            return Err(invalid_input(format!(
                "cannot copy '{}' into itself",
                from.display()
            )));
        }

        let source_tracked = self.tracked_in(&from)?.is_some();
        let result = copy_path(&from, &to).and_then(|()| {
            if !source_tracked || self.exclude_new_files {
                return Ok(());
            }
            match self.registry.owning_repository(&to) {
                Some(target) => self
                    .commands
                    .copy_after(target.root(), &from, &to)
                    .map_err(Error::from),
                None => Ok(()),
            }
        });
        self.queue.schedule(with_parent(&to));

        match &result {
            Ok(()) => tracing::debug!(from = %from.display(), to = %to.display(), "Copied"),
            Err(e) => tracing::warn!(
                from = %from.display(),
                to = %to.display(),
                error = %e,
                "Copy failed"
            ),
        }
        result
    }

    fn move_path(&self, from: &Path, to: &Path) -> Result<()> {
        let source = self.tracked_in(from)?;
        let same_repo = source.as_ref().is_some_and(|repo| {
            self.registry
                .owning_root(to)
                .is_some_and(|root| root == repo.root())
        });

        match source {
            Some(repo) if same_repo => self.commands.rename(repo.root(), from, to)?,
            Some(repo) => {
                std::fs::rename(from, to)?;
                if let Err(e) = self.commands.remove_from_index(repo.root(), from) {
                    if let Err(undo) = std::fs::rename(to, from) {
                        tracing::error!(
                            path = %from.display(),
                            error = %undo,
                            "Failed to move path back after index update failed"
                        );
                        self.queue
                            .schedule(with_parent(from).into_iter().chain(with_parent(to)));
                    }
                    return Err(e.into());
                }
            }
            None => std::fs::rename(from, to)?,
        }
        Ok(())
    }

    /// Repository tracking `path`, if any.
    fn tracked_in(&self, path: &Path) -> Result<Option<Arc<RepositoryInfo>>> {
        let Some(repo) = self.registry.owning_repository(path) else {
            return Ok(None);
        };
        if self.commands.is_tracked(repo.root(), path)? {
            Ok(Some(repo))
        } else {
            Ok(None)
        }
    }
}

impl std::fmt::Debug for FileInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInterceptor")
            .field("exclude_new_files", &self.exclude_new_files)
            .field("case_insensitive", &self.case_insensitive)
            .finish_non_exhaustive()
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn copy_path(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        std::fs::copy(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn invalid_input(msg: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))
}

fn with_parent(path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![path.to_path_buf()];
    if let Some(parent) = path.parent() {
        paths.push(parent.to_path_buf());
    }
    paths
}

fn is_case_only_change(from: &Path, to: &Path) -> bool {
    from != to
        && from.to_string_lossy().to_lowercase() == to.to_string_lossy().to_lowercase()
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| invalid_input(format!("cannot rename '{}'", path.display())))?;
    let parent = path.parent().unwrap_or_else(|| Path::new("/"));
    for attempt in 0..100_u32 {
        let candidate = parent.join(format!(
            ".{}.rename-{attempt}",
            name.to_string_lossy()
        ));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(Error::internal(format!(
        "no free temporary name next to '{}'",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VcsError;
    use crate::refresh::RefreshCommand;
    use crate::vcs::VcsResult;
    use crossbeam_channel::Receiver;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Records commands and performs the filesystem side of each one.
    #[derive(Default)]
    struct RecordingCommands {
        tracked: Mutex<HashSet<PathBuf>>,
        log: Mutex<Vec<String>>,
        fail_rename: bool,
        fail_unstage: bool,
        fail_add: bool,
    }

    impl RecordingCommands {
        fn track(&self, path: PathBuf) {
            self.tracked.lock().insert(path);
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl VcsCommands for RecordingCommands {
        fn is_tracked(&self, _root: &Path, path: &Path) -> VcsResult<bool> {
            Ok(self.tracked.lock().iter().any(|p| p.starts_with(path)))
        }

        fn remove(&self, _root: &Path, path: &Path) -> VcsResult<()> {
            self.log.lock().push(format!("rm {}", path.display()));
            remove_path(path).map_err(|e| VcsError::command("rm", path, e))
        }

        fn remove_from_index(&self, _root: &Path, path: &Path) -> VcsResult<()> {
            if self.fail_unstage {
                return Err(VcsError::command("rm", path, "scripted"));
            }
            self.log.lock().push(format!("rm --cached {}", path.display()));
            self.tracked.lock().remove(path);
            Ok(())
        }

        fn rename(&self, _root: &Path, from: &Path, to: &Path) -> VcsResult<()> {
            if self.fail_rename {
                return Err(VcsError::command("mv", from, "scripted"));
            }
            self.log
                .lock()
                .push(format!("mv {} {}", from.display(), to.display()));
            std::fs::rename(from, to).map_err(|e| VcsError::command("mv", from, e))?;
            let mut tracked = self.tracked.lock();
            tracked.remove(from);
            tracked.insert(to.to_path_buf());
            Ok(())
        }

        fn copy_after(&self, _root: &Path, _from: &Path, to: &Path) -> VcsResult<()> {
            if self.fail_add {
                return Err(VcsError::command("add", to, "scripted"));
            }
            self.log.lock().push(format!("add {}", to.display()));
            Ok(())
        }

        fn reset(&self, _root: &Path, _paths: &[PathBuf]) -> VcsResult<()> {
            Ok(())
        }
    }

    struct Fixture {
        tmp: TempDir,
        root: PathBuf,
        commands: Arc<RecordingCommands>,
        interceptor: FileInterceptor,
        requests: Receiver<RefreshCommand>,
    }

    impl Fixture {
        fn with(config: &Config, commands: RecordingCommands) -> Self {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path().join("repo");
            std::fs::create_dir_all(root.join(".git")).unwrap();
            let registry = Arc::new(RepositoryRegistry::new(false));
            registry.register(&root).unwrap();
            let commands = Arc::new(commands);
            let (queue, requests) = RefreshQueue::channel();
            let interceptor = FileInterceptor::new(
                config,
                registry,
                Arc::clone(&commands) as Arc<dyn VcsCommands>,
                queue,
            );
            Self {
                tmp,
                root,
                commands,
                interceptor,
                requests,
            }
        }

        fn new() -> Self {
            Self::with(&Config::default(), RecordingCommands::default())
        }

        fn file(&self, rel: &str, tracked: bool) -> PathBuf {
            let path = self.root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, rel).unwrap();
            if tracked {
                self.commands.track(path.clone());
            }
            path
        }

        fn scheduled(&self) -> Vec<PathBuf> {
            self.requests
                .try_iter()
                .flat_map(|command| match command {
                    RefreshCommand::Schedule(paths) => paths,
                    _ => Vec::new(),
                })
                .collect()
        }
    }

    #[test]
    fn test_after_create_schedules() {
        let fx = Fixture::new();
        fx.interceptor.after_create(&fx.root.join("new.txt"));
        fx.interceptor.after_change(&fx.root.join("old.txt"));
        assert_eq!(
            fx.scheduled(),
            vec![fx.root.join("new.txt"), fx.root.join("old.txt")]
        );
    }

    #[test]
    fn test_delete_tracked_goes_through_vcs() {
        let fx = Fixture::new();
        let path = fx.file("a.txt", true);

        fx.interceptor.delete(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(fx.commands.log(), vec![format!("rm {}", path.display())]);
        assert!(fx.scheduled().contains(&path));
    }

    #[test]
    fn test_delete_untracked_directory() {
        let fx = Fixture::new();
        let path = fx.file("build/out.o", false);
        let dir = path.parent().unwrap().to_path_buf();

        fx.interceptor.delete(&dir).unwrap();
        assert!(!dir.exists());
        assert!(fx.commands.log().is_empty());
    }

    #[test]
    fn test_delete_missing_path_fails_without_scheduling() {
        let fx = Fixture::new();
        assert!(fx.interceptor.delete(&fx.root.join("ghost.txt")).is_err());
        assert!(fx.scheduled().is_empty());
    }

    #[test]
    fn test_rename_tracked_within_repository() {
        let fx = Fixture::new();
        let from = fx.file("a.txt", true);
        let to = fx.root.join("b.txt");

        fx.interceptor.rename(&from, &to).unwrap();
        assert!(to.exists());
        assert_eq!(
            fx.commands.log(),
            vec![format!("mv {} {}", from.display(), to.display())]
        );
        let scheduled = fx.scheduled();
        assert!(scheduled.contains(&from));
        assert!(scheduled.contains(&to));
    }

    #[test]
    fn test_rename_out_of_repository_unstages_source() {
        let fx = Fixture::new();
        let from = fx.file("a.txt", true);
        let to = fx.tmp.path().join("outside.txt");

        fx.interceptor.rename(&from, &to).unwrap();
        assert!(to.exists());
        assert_eq!(
            fx.commands.log(),
            vec![format!("rm --cached {}", from.display())]
        );
    }

    #[test]
    fn test_failed_unstage_moves_path_back() {
        let commands = RecordingCommands {
            fail_unstage: true,
            ..Default::default()
        };
        let fx = Fixture::with(&Config::default(), commands);
        let from = fx.file("a.txt", true);
        let to = fx.tmp.path().join("outside.txt");

        let err = fx.interceptor.rename(&from, &to).unwrap_err();
        assert!(matches!(err, Error::Vcs(VcsError::Command { .. })));
        assert!(from.is_file());
        assert!(!to.exists());
        assert!(fx.scheduled().is_empty());
    }

    #[test]
    fn test_rename_untracked_is_plain_move() {
        let fx = Fixture::new();
        let from = fx.file("scratch.txt", false);
        let to = fx.root.join("scratch2.txt");

        fx.interceptor.rename(&from, &to).unwrap();
        assert!(to.exists() && !from.exists());
        assert!(fx.commands.log().is_empty());
    }

    #[test]
    fn test_case_only_rename_uses_temporary_name() {
        let config = Config {
            case_insensitive: true,
            ..Default::default()
        };
        let fx = Fixture::with(&config, RecordingCommands::default());
        let from = fx.file("readme.md", true);
        let to = fx.root.join("README.md");

        fx.interceptor.rename(&from, &to).unwrap();
        let log = fx.commands.log();
        assert_eq!(log.len(), 2);
        assert!(log[0].contains(".readme.md.rename-0"));
        assert!(log[1].ends_with("README.md"));
    }

    #[test]
    fn test_failed_rename_leaves_nothing_scheduled() {
        let commands = RecordingCommands {
            fail_rename: true,
            ..Default::default()
        };
        let fx = Fixture::with(&Config::default(), commands);
        let from = fx.file("a.txt", true);

        let err = fx
            .interceptor
            .rename(&from, &fx.root.join("b.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::Vcs(VcsError::Command { .. })));
        assert!(from.exists());
        assert!(fx.scheduled().is_empty());
    }

    #[test]
    fn test_copy_tracked_directory_adds_target() {
        let fx = Fixture::new();
        fx.file("src/a.rs", true);
        fx.file("src/nested/b.rs", true);
        let to = fx.root.join("copy");

        fx.interceptor.copy(&fx.root.join("src"), &to).unwrap();
        assert!(to.join("nested/b.rs").is_file());
        assert_eq!(fx.commands.log(), vec![format!("add {}", to.display())]);
        assert!(fx.scheduled().contains(&to));
    }

    #[test]
    fn test_copy_respects_exclude_new_files() {
        let config = Config {
            exclude_new_files: true,
            ..Default::default()
        };
        let fx = Fixture::with(&config, RecordingCommands::default());
        let from = fx.file("a.txt", true);

        fx.interceptor.copy(&from, &fx.root.join("b.txt")).unwrap();
        assert!(fx.root.join("b.txt").is_file());
        assert!(fx.commands.log().is_empty());
    }

    #[test]
    fn test_failed_add_still_schedules_copy() {
        let commands = RecordingCommands {
            fail_add: true,
            ..Default::default()
        };
        let fx = Fixture::with(&Config::default(), commands);
        let from = fx.file("a.txt", true);
        let to = fx.root.join("b.txt");

        let err = fx.interceptor.copy(&from, &to).unwrap_err();
        assert!(matches!(err, Error::Vcs(VcsError::Command { .. })));
        assert!(to.is_file());
        assert!(fx.scheduled().contains(&to));
    }

    #[test]
    fn test_copy_into_itself_is_rejected() {
        let fx = Fixture::new();
        fx.file("src/a.rs", false);
        let src = fx.root.join("src");
        assert!(fx.interceptor.copy(&src, &src.join("inner")).is_err());
    }
}
