//! Top-level wiring of the status cache.
//!
//! [`GitStatusService`] owns one registry, notifier, cache, scheduler and
//! (optionally) watcher. Nothing here is global: several services can run
//! side by side in one process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::cache::{RefreshSummary, StatusCache};
use crate::config::Config;
use crate::events::{ChangeNotifier, StatusEvent, Subscription};
use crate::interceptor::FileInterceptor;
use crate::metrics::StatusMetrics;
use crate::refresh::{
    ProgressToken, RefreshCommand, RefreshQueue, RefreshScheduler, SchedulerConfig,
};
use crate::status::{StatusEntry, StatusSet};
use crate::vcs::{LockProbe, RepositoryRegistry, StatusProvider, VcsCommands};
use crate::watcher::RepositoryWatcher;
use crate::{Error, Result};

/// A running status cache over a set of repositories.
pub struct GitStatusService {
    config: Config,
    registry: Arc<RepositoryRegistry>,
    notifier: ChangeNotifier,
    cache: Arc<StatusCache>,
    interceptor: FileInterceptor,
    probe: Arc<dyn LockProbe>,
    metrics: StatusMetrics,
    metrics_subscription: Subscription,
    commands: Mutex<Option<Receiver<RefreshCommand>>>,
    scheduler: Mutex<Option<RefreshScheduler>>,
    watcher: Mutex<Option<RepositoryWatcher>>,
}

impl GitStatusService {
    /// Build a service over `backend`. Nothing runs until [`start`].
    ///
    /// [`start`]: Self::start
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a configured
    /// repository cannot be registered.
    pub fn new<B>(config: Config, backend: B) -> Result<Self>
    where
        B: StatusProvider + VcsCommands + LockProbe + 'static,
    {
        config.validate()?;

        let backend = Arc::new(backend);
        let registry = Arc::new(RepositoryRegistry::new(config.auto_discover));
        for root in &config.repositories {
            registry.register(root)?;
        }

        let notifier = ChangeNotifier::new();
        let metrics = StatusMetrics::new()?;
        let recorder = metrics.clone();
        let metrics_subscription =
            notifier.subscribe(move |event: &StatusEvent| recorder.record_event(event));

        let (queue, commands) = RefreshQueue::channel();
        let cache = Arc::new(StatusCache::new(
            &config,
            Arc::clone(&registry),
            Arc::clone(&backend) as Arc<dyn StatusProvider>,
            notifier.clone(),
            queue.clone(),
        )?);
        let interceptor = FileInterceptor::new(
            &config,
            Arc::clone(&registry),
            Arc::clone(&backend) as Arc<dyn VcsCommands>,
            queue,
        );

        Ok(Self {
            config,
            registry,
            notifier,
            cache,
            interceptor,
            probe: backend,
            metrics,
            metrics_subscription,
            commands: Mutex::new(Some(commands)),
            scheduler: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }

    /// Spawn the scheduler, its workers and, if configured, the watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the service was already started or a thread or
    /// watch cannot be set up.
    pub fn start(&self) -> Result<()> {
        let commands = self
            .commands
            .lock()
            .take()
            .ok_or_else(|| Error::internal("service already started"))?;

        let scheduler = RefreshScheduler::start(
            &SchedulerConfig::from(&self.config),
            Arc::clone(&self.cache),
            Arc::clone(&self.probe),
            commands,
            Some(self.metrics.clone()),
        )?;
        *self.scheduler.lock() = Some(scheduler);

        if self.config.watch {
            let watcher = RepositoryWatcher::new(
                self.config.debounce / 2,
                Arc::clone(&self.registry),
                self.cache.queue().clone(),
            )?;
            for root in self.registry.roots() {
                watcher.watch(&root)?;
            }
            *self.watcher.lock() = Some(watcher);
        }

        tracing::info!(
            repositories = self.registry.roots().len(),
            watch = self.config.watch,
            "Status service started"
        );
        Ok(())
    }

    /// Stop the watcher and the scheduler.
    ///
    /// Returns `false` if scans were still running when the shutdown
    /// timeout elapsed.
    pub fn shutdown(&self) -> bool {
        drop(self.watcher.lock().take());
        let drained = self
            .scheduler
            .lock()
            .take()
            .map_or(true, |scheduler| scheduler.shutdown());
        self.notifier.unsubscribe(self.metrics_subscription);
        tracing::info!(drained, "Status service stopped");
        drained
    }

    /// Register a working tree and schedule a full refresh of it.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a repository or cannot be watched.
    pub fn add_repository(&self, root: &Path) -> Result<()> {
        let info = self.registry.register(root)?;
        if let Some(watcher) = self.watcher.lock().as_ref() {
            watcher.watch(info.root())?;
        }
        self.cache.queue().refresh_now([info.root().to_path_buf()]);
        Ok(())
    }

    /// Forget a working tree: its cached statuses, its repository-scoped
    /// subscriptions and its watch.
    ///
    /// Returns `false` if `root` was not registered.
    pub fn close_repository(&self, root: &Path) -> bool {
        let Some(info) = self.registry.get(root) else {
            return false;
        };
        if let Some(watcher) = self.watcher.lock().as_ref() {
            if let Err(e) = watcher.unwatch(info.root()) {
                tracing::warn!(root = %info.root().display(), error = %e, "Failed to unwatch");
            }
        }
        let removed = self.notifier.close_repository(info.root());
        self.cache.evict_repository(info.root());
        self.registry.unregister(info.root());
        tracing::info!(
            root = %info.root().display(),
            subscriptions = removed,
            "Repository closed"
        );
        true
    }

    /// Status for display. See [`StatusCache::get_status`].
    #[must_use]
    pub fn get_status(&self, path: &Path) -> StatusEntry {
        self.cache.get_status(path)
    }

    /// Paths under `roots` whose status matches `filter`.
    #[must_use]
    pub fn list_files(&self, roots: &[PathBuf], filter: StatusSet) -> Vec<PathBuf> {
        self.cache.list_files(roots, filter)
    }

    /// Request an immediate background refresh of `paths`.
    pub fn refresh(&self, paths: impl IntoIterator<Item = PathBuf>) {
        self.cache.queue().refresh_now(paths);
    }

    /// Refresh `paths` on the calling thread.
    #[must_use]
    pub fn refresh_blocking(&self, paths: &[PathBuf], token: &ProgressToken) -> RefreshSummary {
        self.cache.refresh_roots(paths, token)
    }

    /// Render metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn export_metrics(&self) -> Result<String> {
        self.metrics
            .set_cache_size(self.cache.len(), self.cache.up_to_date_len());
        self.metrics.export()
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    #[must_use]
    pub const fn interceptor(&self) -> &FileInterceptor {
        &self.interceptor
    }

    #[must_use]
    pub const fn metrics(&self) -> &StatusMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(RefreshScheduler::is_running)
    }
}

impl Drop for GitStatusService {
    fn drop(&mut self) {
        if self.scheduler.get_mut().is_some() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for GitStatusService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStatusService")
            .field("repositories", &self.registry.roots())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use crate::vcs::GitBackend;
    use std::time::Duration;
    use tempfile::TempDir;

    fn init_repo() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        git2::Repository::init(&root).unwrap();
        (tmp, root)
    }

    fn config(root: &Path) -> Config {
        Config {
            repositories: vec![root.to_path_buf()],
            auto_discover: false,
            debounce: Duration::from_millis(20),
            lock_retry: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            worker_threads: 0,
            ..Default::default()
        };
        assert!(GitStatusService::new(config, GitBackend::new()).is_err());
    }

    #[test]
    fn test_start_twice_fails() {
        let (_tmp, root) = init_repo();
        let service = GitStatusService::new(config(&root), GitBackend::new()).unwrap();
        service.start().unwrap();
        assert!(service.is_running());
        assert!(service.start().is_err());
        assert!(service.shutdown());
        assert!(!service.is_running());
    }

    #[test]
    fn test_refresh_publishes_untracked_file() {
        let (_tmp, root) = init_repo();
        std::fs::write(root.join("new.txt"), "hello").unwrap();
        let service = GitStatusService::new(config(&root), GitBackend::new()).unwrap();
        let (_sub, events) = service.notifier().subscribe_channel();
        service.start().unwrap();

        service.refresh([root.clone()]);
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let mut finished = false;
        while let Ok(event) = events.recv_deadline(deadline) {
            if matches!(event, StatusEvent::RefreshFinished { .. }) {
                finished = true;
                break;
            }
        }
        assert!(finished);
        assert!(service
            .get_status(&root.join("new.txt"))
            .contains(Status::NewIndexWorkingTree));
        assert!(service.metrics().change_event_count() >= 1);
        assert!(service
            .export_metrics()
            .unwrap()
            .contains("git_status_cache_change_events_total"));
        assert!(service.shutdown());
    }

    #[test]
    fn test_close_repository_evicts() {
        let (_tmp, root) = init_repo();
        std::fs::write(root.join("new.txt"), "hello").unwrap();
        let service = GitStatusService::new(config(&root), GitBackend::new()).unwrap();

        let summary = service.refresh_blocking(&[root.clone()], &ProgressToken::new());
        assert!(summary.is_success());
        assert_eq!(service.cache().len(), 1);

        assert!(service.close_repository(&root));
        assert!(service.cache().is_empty());
        assert!(service.registry().roots().is_empty());
        assert!(!service.close_repository(&root));
    }
}
