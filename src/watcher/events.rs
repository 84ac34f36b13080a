//! Batches of routed filesystem events.

use std::collections::BTreeSet;
use std::path::PathBuf;

use super::filter::{is_ignore_file, route, WatchAction};
use crate::refresh::RefreshQueue;
use crate::vcs::RepositoryRegistry;

/// Events collected from one debouncer callback.
#[derive(Debug, Default)]
pub struct EventBatch {
    /// Working tree paths to refresh.
    pub changed: BTreeSet<PathBuf>,
    /// Roots whose metadata may have moved.
    pub metadata: BTreeSet<PathBuf>,
    /// Changed `.gitignore` files.
    pub ignore_files: BTreeSet<PathBuf>,
}

impl EventBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `path` and add it to the batch.
    pub fn add(&mut self, path: PathBuf) {
        match route(&path) {
            WatchAction::Worktree(path) => {
                if is_ignore_file(&path) {
                    self.ignore_files.insert(path.clone());
                }
                self.changed.insert(path);
            }
            WatchAction::Metadata(root) => {
                self.metadata.insert(root);
            }
            WatchAction::Ignored => {}
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.metadata.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len() + self.metadata.len()
    }

    /// Forward the batch to the scheduler.
    ///
    /// A changed `.gitignore` reloads its repository's ignore rules and
    /// widens the refresh to the whole working tree.
    pub fn dispatch(mut self, registry: &RepositoryRegistry, queue: &RefreshQueue) {
        for file in std::mem::take(&mut self.ignore_files) {
            if let Some(info) = registry.owning_repository(&file) {
                info.reload_ignore();
                self.changed.insert(info.root().to_path_buf());
            }
        }
        for root in self.metadata {
            queue.metadata_changed(root);
        }
        queue.schedule(self.changed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshCommand;
    use std::path::Path;

    #[test]
    fn test_batch_routes_paths() {
        let mut batch = EventBatch::new();
        batch.add(PathBuf::from("/repo/a.rs"));
        batch.add(PathBuf::from("/repo/a.rs"));
        batch.add(PathBuf::from("/repo/.git/index"));
        batch.add(PathBuf::from("/repo/.git/refs/heads/main"));
        batch.add(PathBuf::from("/repo/.git/objects/12/3456"));

        assert_eq!(batch.changed.len(), 1);
        assert_eq!(batch.metadata.len(), 1);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_batch_of_object_churn_is_empty() {
        let mut batch = EventBatch::new();
        batch.add(PathBuf::from("/repo/.git/objects/12/3456"));
        batch.add(PathBuf::from("/repo/.git/index.lock"));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_dispatch_sends_metadata_then_paths() {
        let registry = RepositoryRegistry::new(false);
        let (queue, rx) = RefreshQueue::channel();

        let mut batch = EventBatch::new();
        batch.add(PathBuf::from("/repo/.git/HEAD"));
        batch.add(PathBuf::from("/repo/b.rs"));
        batch.dispatch(&registry, &queue);

        assert_eq!(
            rx.try_recv().unwrap(),
            RefreshCommand::MetadataChanged(PathBuf::from("/repo"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RefreshCommand::Schedule(vec![PathBuf::from("/repo/b.rs")])
        );
    }

    #[test]
    fn test_dispatch_widens_on_ignore_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        std::fs::create_dir_all(root.join(".git")).unwrap();
        let registry = RepositoryRegistry::new(false);
        let info = registry.register(&root).unwrap();
        let (queue, rx) = RefreshQueue::channel();

        std::fs::write(root.join(".gitignore"), "*.log\n").unwrap();
        let mut batch = EventBatch::new();
        batch.add(root.join(".gitignore"));
        batch.dispatch(&registry, &queue);

        assert!(info.is_ignored(&root.join("debug.log"), false));
        let RefreshCommand::Schedule(paths) = rx.try_recv().unwrap() else {
            panic!("expected a schedule request");
        };
        assert!(paths.iter().any(|p| p == Path::new(info.root())));
    }
}
