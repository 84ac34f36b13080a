//! Debounced, per-repository refresh scheduling.
//!
//! One scheduler thread owns the per-root state machine
//! (`Idle -> Scanning -> Idle | Locked`) and hands scan jobs to a bounded
//! pool of worker threads. Workers report back over the same command
//! channel the scheduler reads requests from.

use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::progress::ProgressToken;
use super::queue::{RefreshCommand, RefreshQueue, ScanOutcome};
use crate::cache::StatusCache;
use crate::config::Config;
use crate::error::VcsError;
use crate::events::StatusEvent;
use crate::metrics::{StatusMetrics, OUTCOME_COMPLETED, OUTCOME_FAILED, OUTCOME_LOCKED};
use crate::observability::spans;
use crate::vcs::{normalize_path, LockProbe};
use crate::{Error, Result};

/// Retries of a batch that failed with a transient error.
const MAX_RETRIES: u32 = 3;

/// Scheduler timing and pool size.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub lock_retry: Duration,
    pub shutdown_timeout: Duration,
    pub worker_threads: usize,
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            debounce: config.debounce,
            lock_retry: config.lock_retry,
            shutdown_timeout: config.shutdown_timeout,
            worker_threads: config.worker_threads.max(1),
        }
    }
}

/// Scheduling phase of one repository root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Locked { retry_at: Instant },
}

#[derive(Debug)]
struct RootState {
    phase: Phase,
    pending: BTreeSet<PathBuf>,
    whole_root: bool,
    due: Option<Instant>,
    retries: u32,
}

impl Default for RootState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            pending: BTreeSet::new(),
            whole_root: false,
            due: None,
            retries: 0,
        }
    }
}

impl RootState {
    fn has_work(&self) -> bool {
        self.whole_root || !self.pending.is_empty()
    }

    fn add(&mut self, root: &Path, path: PathBuf) {
        if path == root {
            self.whole_root = true;
            self.pending.clear();
        } else if !self.whole_root {
            self.pending.insert(path);
        }
    }

    fn due_by(&mut self, due: Instant) {
        self.due = Some(self.due.map_or(due, |d| d.min(due)));
    }

    /// Seeds for the next scan; empty means the whole working tree.
    fn take_seeds(&mut self) -> Vec<PathBuf> {
        let seeds = if self.whole_root {
            Vec::new()
        } else {
            std::mem::take(&mut self.pending).into_iter().collect()
        };
        self.whole_root = false;
        self.pending.clear();
        self.due = None;
        seeds
    }

    fn requeue(&mut self, root: &Path, seeds: Vec<PathBuf>, due: Instant) {
        if seeds.is_empty() {
            self.add(root, root.to_path_buf());
        } else {
            for seed in seeds {
                self.add(root, seed);
            }
        }
        self.due_by(due);
    }
}

struct ScanJob {
    root: PathBuf,
    seeds: Vec<PathBuf>,
    token: ProgressToken,
}

fn run_job(cache: &StatusCache, queue: &RefreshQueue, job: ScanJob) {
    let ScanJob { root, seeds, token } = job;
    let _span = spans::scan_span(&root, seeds.len()).entered();
    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| {
        cache.refresh_root(&root, &seeds, &token)
    }));

    let outcome = match result {
        Ok(Ok(changed)) => ScanOutcome::Completed { changed },
        Ok(Err(VcsError::Locked { .. })) => ScanOutcome::Locked,
        Ok(Err(e)) => {
            tracing::warn!(root = %root.display(), error = %e, "Scan failed");
            ScanOutcome::Failed {
                reason: e.to_string(),
                retryable: e.is_retryable(),
            }
        }
        Err(_) => {
            tracing::error!(root = %root.display(), "Scan worker panicked");
            ScanOutcome::Failed {
                reason: "scan panicked".to_string(),
                retryable: false,
            }
        }
    };

    queue.send(RefreshCommand::Finished {
        root,
        seeds,
        outcome,
        elapsed: started.elapsed(),
    });
}

struct SchedulerLoop {
    cache: Arc<StatusCache>,
    probe: Arc<dyn LockProbe>,
    config: SchedulerConfig,
    metrics: Option<StatusMetrics>,
    token: ProgressToken,
    jobs: Sender<ScanJob>,
    roots: HashMap<PathBuf, RootState>,
}

impl SchedulerLoop {
    fn run(mut self, commands: &Receiver<RefreshCommand>) {
        loop {
            let received = match self.next_deadline() {
                Some(deadline) => commands.recv_deadline(deadline),
                None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(RefreshCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
            if self.token.is_cancelled() {
                break;
            }
            self.dispatch_due(Instant::now());
        }
        tracing::debug!(pending_roots = self.roots.len(), "Scheduler loop exiting");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.roots
            .values()
            .filter_map(|state| match state.phase {
                Phase::Scanning => None,
                Phase::Locked { retry_at } => Some(retry_at),
                Phase::Idle => state.due,
            })
            .min()
    }

    fn handle(&mut self, command: RefreshCommand) {
        let now = Instant::now();
        match command {
            RefreshCommand::Schedule(paths) => self.enqueue(paths, now + self.config.debounce),
            RefreshCommand::RefreshNow(paths) => self.enqueue(paths, now),
            RefreshCommand::MetadataChanged(root) => self.metadata_changed(&root, now),
            RefreshCommand::Finished {
                root,
                seeds,
                outcome,
                elapsed,
            } => self.finish(root, seeds, outcome, elapsed, now),
            RefreshCommand::Shutdown => {}
        }
    }

    fn enqueue(&mut self, paths: Vec<PathBuf>, due: Instant) {
        for path in paths {
            let path = normalize_path(&path);
            let Some(root) = self.cache.registry().owning_root(&path) else {
                tracing::trace!(path = %path.display(), "Ignoring refresh of unmanaged path");
                continue;
            };
            let state = self.roots.entry(root.clone()).or_default();
            state.add(&root, path);
            state.due_by(due);
        }
    }

    fn metadata_changed(&mut self, root: &Path, now: Instant) {
        let Some(info) = self.cache.registry().owning_repository(root) else {
            return;
        };
        if info.refresh_metadata() {
            tracing::debug!(root = %info.root().display(), "Scheduling full refresh after metadata change");
            self.enqueue(vec![info.root().to_path_buf()], now + self.config.debounce);
        }
    }

    fn dispatch_due(&mut self, now: Instant) {
        let mut newly_locked = Vec::new();
        for (root, state) in &mut self.roots {
            let ready = match state.phase {
                Phase::Scanning => false,
                Phase::Locked { retry_at } => retry_at <= now,
                Phase::Idle => state.due.is_some_and(|due| due <= now),
            };
            if !ready {
                continue;
            }
            if !state.has_work() {
                state.phase = Phase::Idle;
                state.due = None;
                continue;
            }

            if self.probe.is_locked(root) {
                if !matches!(state.phase, Phase::Locked { .. }) {
                    newly_locked.push(root.clone());
                }
                state.phase = Phase::Locked {
                    retry_at: now + self.config.lock_retry,
                };
                continue;
            }

            let job = ScanJob {
                root: root.clone(),
                seeds: state.take_seeds(),
                token: self.token.child(),
            };
            tracing::debug!(root = %root.display(), seeds = job.seeds.len(), "Dispatching scan");
            state.phase = Phase::Scanning;
            if self.jobs.send(job).is_err() {
                tracing::warn!(root = %root.display(), "Scan workers gone, dropping batch");
                state.phase = Phase::Idle;
            }
        }

        for root in newly_locked {
            tracing::info!(
                root = %root.display(),
                retry = ?self.config.lock_retry,
                "Repository locked, refresh deferred"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_refresh(OUTCOME_LOCKED, Duration::ZERO);
            }
            self.cache
                .notifier()
                .publish(&StatusEvent::RepositoryLocked { root });
        }

        self.roots
            .retain(|_, state| state.phase != Phase::Idle || state.has_work());
    }

    fn finish(
        &mut self,
        root: PathBuf,
        seeds: Vec<PathBuf>,
        outcome: ScanOutcome,
        elapsed: Duration,
        now: Instant,
    ) {
        let state = self.roots.entry(root.clone()).or_default();
        state.phase = Phase::Idle;

        let event = match outcome {
            ScanOutcome::Completed { changed } => {
                state.retries = 0;
                if let Some(metrics) = &self.metrics {
                    metrics.record_refresh(OUTCOME_COMPLETED, elapsed);
                    metrics.set_cache_size(self.cache.len(), self.cache.up_to_date_len());
                }
                tracing::debug!(root = %root.display(), changed, ?elapsed, "Scan finished");
                StatusEvent::RefreshFinished { root, changed }
            }
            ScanOutcome::Locked => {
                state.requeue(&root, seeds, now);
                state.phase = Phase::Locked {
                    retry_at: now + self.config.lock_retry,
                };
                if let Some(metrics) = &self.metrics {
                    metrics.record_refresh(OUTCOME_LOCKED, elapsed);
                }
                tracing::info!(root = %root.display(), "Repository locked during scan, retrying later");
                StatusEvent::RepositoryLocked { root }
            }
            ScanOutcome::Failed { reason, retryable } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_refresh(OUTCOME_FAILED, elapsed);
                }
                if retryable && state.retries < MAX_RETRIES && !self.token.is_cancelled() {
                    state.retries += 1;
                    tracing::debug!(root = %root.display(), attempt = state.retries, %reason, "Retrying scan");
                    state.requeue(&root, seeds, now + self.config.debounce);
                    return;
                }
                state.retries = 0;
                StatusEvent::RefreshFailed { root, reason }
            }
        };
        self.cache.notifier().publish(&event);
    }
}

/// Handle to the running scheduler thread and its worker pool.
pub struct RefreshScheduler {
    queue: RefreshQueue,
    token: ProgressToken,
    shutdown_timeout: Duration,
    done: Receiver<()>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Spawn the scheduler thread and `worker_threads` scan workers.
    ///
    /// `commands` must be the receiving end of the queue the cache was
    /// built with.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn start(
        config: &SchedulerConfig,
        cache: Arc<StatusCache>,
        probe: Arc<dyn LockProbe>,
        commands: Receiver<RefreshCommand>,
        metrics: Option<StatusMetrics>,
    ) -> Result<Self> {
        let queue = cache.queue().clone();
        let token = ProgressToken::new();
        // never sent on; disconnects once every thread has exited
        let (done_tx, done) = bounded::<()>(0);
        let (jobs_tx, jobs_rx) = unbounded::<ScanJob>();
        let mut threads = Vec::with_capacity(config.worker_threads + 1);

        for i in 0..config.worker_threads {
            let rx = jobs_rx.clone();
            let cache = Arc::clone(&cache);
            let queue = queue.clone();
            let alive = done_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("status-scan-{i}"))
                .spawn(move || {
                    let _alive = alive;
                    while let Ok(job) = rx.recv() {
                        run_job(&cache, &queue, job);
                    }
                    tracing::trace!(worker = i, "Scan worker exiting");
                })
                .map_err(|e| Error::internal(format!("failed to spawn scan worker: {e}")))?;
            threads.push(handle);
        }
        drop(jobs_rx);

        let scheduler = SchedulerLoop {
            cache,
            probe,
            config: config.clone(),
            metrics,
            token: token.clone(),
            jobs: jobs_tx,
            roots: HashMap::new(),
        };
        let handle = std::thread::Builder::new()
            .name("status-scheduler".to_string())
            .spawn(move || {
                let _alive = done_tx;
                scheduler.run(&commands);
            })
            .map_err(|e| Error::internal(format!("failed to spawn scheduler: {e}")))?;
        threads.push(handle);

        tracing::info!(
            workers = config.worker_threads,
            debounce = ?config.debounce,
            lock_retry = ?config.lock_retry,
            "Refresh scheduler started"
        );

        Ok(Self {
            queue,
            token,
            shutdown_timeout: config.shutdown_timeout,
            done,
            threads: Mutex::new(threads),
        })
    }

    #[must_use]
    pub const fn queue(&self) -> &RefreshQueue {
        &self.queue
    }

    /// Request a debounced refresh.
    pub fn schedule(&self, paths: impl IntoIterator<Item = PathBuf>) {
        self.queue.schedule(paths);
    }

    /// Request an immediate refresh.
    pub fn refresh_now(&self, paths: impl IntoIterator<Item = PathBuf>) {
        self.queue.refresh_now(paths);
    }

    /// Re-check `index`/`HEAD` timestamps of `root`.
    pub fn metadata_changed(&self, root: impl Into<PathBuf>) {
        self.queue.metadata_changed(root);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop with the configured shutdown timeout.
    pub fn shutdown(&self) -> bool {
        self.shutdown_with_timeout(self.shutdown_timeout)
    }

    /// Cancel in-flight scans and stop every thread.
    ///
    /// Returns `true` if all threads exited within `timeout`. Threads that
    /// did not are left detached.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> bool {
        self.token.cancel();
        self.queue.send(RefreshCommand::Shutdown);

        let drained = matches!(
            self.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        );
        if drained {
            for handle in self.threads.lock().drain(..) {
                if handle.join().is_err() {
                    tracing::warn!("Scheduler thread panicked");
                }
            }
            tracing::info!("Refresh scheduler stopped");
        } else {
            tracing::warn!(?timeout, "Scans still running at shutdown");
        }
        drained
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.token.cancel();
        self.queue.send(RefreshCommand::Shutdown);
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
