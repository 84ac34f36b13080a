//! Status cache for version-controlled working trees.
//!
//! This module provides:
//! - The primary path to [`StatusEntry`] map
//! - A bounded overflow set for up-to-date paths ([`UpToDateSet`])
//! - Per-category directory indexes for recursive listing ([`StatusIndexes`])
//! - Refresh application with change events published after unlocking
//!
//! One mutex guards the map, the overflow set and the indexes together, so
//! the three never disagree. Scans of the same repository are serialized by
//! [`RepositoryLocks`].
//!
//! Lock order is publish lock, then map lock. The map lock is never held
//! while waiting for the publish lock, so listeners may read the cache.

mod index;
mod locks;
mod overflow;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use parking_lot::{Mutex, ReentrantMutex};

use crate::config::Config;
use crate::error::VcsError;
use crate::events::{ChangeNotifier, StatusEvent};
use crate::refresh::{ProgressToken, RefreshQueue};
use crate::status::{to_entry, Change, RawStatus, Status, StatusEntry, StatusSet};
use crate::vcs::{normalize_path, RepositoryRegistry, StatusProvider, VcsResult};
use crate::{Error, Result};

pub use index::{check_belong_to_repository, Category, DirectoryIndex, StatusIndexes};
pub use locks::RepositoryLocks;
pub use overflow::UpToDateSet;

/// Aggregate result of [`StatusCache::refresh_roots`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Repositories attempted.
    pub roots: usize,
    /// Change events published.
    pub changed: usize,
    /// Repositories whose query failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl RefreshSummary {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

fn fold_case(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Reported by the provider or decided by a lookup.
    Reported,
    /// Inferred from a path missing from the provider's answer.
    Absent,
}

struct Update {
    path: PathBuf,
    entry: StatusEntry,
    origin: Origin,
}

impl Update {
    const fn reported(path: PathBuf, entry: StatusEntry) -> Self {
        Self {
            path,
            entry,
            origin: Origin::Reported,
        }
    }

    const fn absent(path: PathBuf, entry: StatusEntry) -> Self {
        Self {
            path,
            entry,
            origin: Origin::Absent,
        }
    }
}

struct CacheState {
    entries: HashMap<PathBuf, StatusEntry>,
    folded: Option<HashMap<String, PathBuf>>,
    uptodate: UpToDateSet,
    indexes: StatusIndexes,
}

impl CacheState {
    fn new(capacity: usize, case_insensitive: bool) -> Self {
        Self {
            entries: HashMap::new(),
            folded: case_insensitive.then(HashMap::new),
            uptodate: UpToDateSet::with_case_folding(capacity, case_insensitive),
            indexes: StatusIndexes::new(),
        }
    }

    fn find_key(&self, path: &Path) -> Option<PathBuf> {
        if self.entries.contains_key(path) {
            return Some(path.to_path_buf());
        }
        self.folded.as_ref()?.get(&fold_case(path)).cloned()
    }

    fn lookup(&self, path: &Path) -> Option<&StatusEntry> {
        self.find_key(path).and_then(|key| self.entries.get(&key))
    }

    fn insert_entry(&mut self, path: PathBuf, entry: StatusEntry) {
        if let Some(folded) = &mut self.folded {
            folded.insert(fold_case(&path), path.clone());
        }
        self.entries.insert(path, entry);
    }

    fn remove_entry(&mut self, path: &Path) -> Option<StatusEntry> {
        if let Some(folded) = &mut self.folded {
            folded.remove(&fold_case(path));
        }
        self.entries.remove(path)
    }

    /// Apply one update, returning the event to publish if any.
    ///
    /// Up-to-date entries move to the overflow set, unknown entries are
    /// dropped, everything else is stored in the map and indexed. Only a
    /// reported update may re-key an entry to a new spelling; an absent
    /// one applies to the stored spelling.
    fn apply(&mut self, update: Update) -> Option<StatusEvent> {
        let Update { path, entry: new, origin } = update;
        let key = self.find_key(&path);
        let path = match &key {
            Some(k) if origin == Origin::Absent => k.clone(),
            _ => path,
        };
        let old = key.as_ref().and_then(|k| self.entries.get(k)).cloned();
        let old_view = old.clone().or_else(|| {
            self.uptodate
                .contains(&path)
                .then(|| StatusEntry::up_to_date(new.is_directory()))
        });
        let new = if old.as_ref().is_some_and(StatusEntry::seen_in_ui) {
            new.with_seen_in_ui(true)
        } else {
            new
        };
        let rekey = key.as_ref().is_some_and(|k| *k != path);

        match &old_view {
            Some(previous) if !rekey && previous.is_equivalent(&new) => {
                if old.is_some() {
                    self.entries.insert(path, new);
                }
                return None;
            }
            None if new.is_up_to_date() => {
                self.uptodate.insert(path);
                return None;
            }
            None if new.is_unknown() => return None,
            _ => {}
        }

        let stored = !(new.is_up_to_date() || new.is_unknown());
        match &key {
            Some(k) if rekey => {
                let removed = self.remove_entry(k);
                self.indexes.update(k, removed.as_ref(), None);
                self.indexes.update(&path, None, stored.then_some(&new));
            }
            Some(_) => {
                self.indexes.update(&path, old.as_ref(), stored.then_some(&new));
                if !stored {
                    self.remove_entry(&path);
                }
            }
            None => self.indexes.update(&path, None, stored.then_some(&new)),
        }

        self.uptodate.remove(&path);
        if stored {
            self.insert_entry(path.clone(), new.clone());
        } else if new.is_up_to_date() {
            self.uptodate.insert(path.clone());
        }

        Some(StatusEvent::FileStatusChanged {
            path,
            old: old_view,
            new,
        })
    }

    fn remove_under(&mut self, root: &Path) {
        let doomed: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect();
        for path in doomed {
            self.remove_entry(&path);
        }
        self.indexes.remove_under(root);
        self.uptodate.remove_under(root);
    }
}

fn build_excluded(patterns: &[String]) -> Result<Option<Gitignore>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GitignoreBuilder::new("/");
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|e| Error::config(format!("invalid excluded pattern '{pattern}': {e}")))?;
    }
    let gitignore = builder
        .build()
        .map_err(|e| Error::config(format!("failed to build excluded patterns: {e}")))?;
    Ok(Some(gitignore))
}

fn is_untracked(raw: &RawStatus) -> bool {
    raw.ignored || (raw.head_index == Change::Unmodified && raw.index_worktree == Change::Added)
}

/// Cache of per-path VCS status.
pub struct StatusCache {
    registry: Arc<RepositoryRegistry>,
    provider: Arc<dyn StatusProvider>,
    notifier: ChangeNotifier,
    queue: RefreshQueue,
    excluded: Option<Gitignore>,
    size_warning_threshold: usize,
    size_warned: AtomicBool,
    state: Mutex<CacheState>,
    publish_lock: ReentrantMutex<()>,
    repo_locks: RepositoryLocks,
}

impl StatusCache {
    /// Create a cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured excluded patterns do not parse.
    pub fn new(
        config: &Config,
        registry: Arc<RepositoryRegistry>,
        provider: Arc<dyn StatusProvider>,
        notifier: ChangeNotifier,
        queue: RefreshQueue,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            provider,
            notifier,
            queue,
            excluded: build_excluded(&config.excluded_patterns)?,
            size_warning_threshold: config.size_warning_threshold,
            size_warned: AtomicBool::new(false),
            state: Mutex::new(CacheState::new(
                config.uptodate_capacity,
                config.case_insensitive,
            )),
            publish_lock: ReentrantMutex::new(()),
            repo_locks: RepositoryLocks::new(),
        })
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
    pub const fn queue(&self) -> &RefreshQueue {
        &self.queue
    }

    /// Status for display. Never blocks on VCS I/O.
    ///
    /// Unknown managed paths get a provisional answer and a background
    /// scan is scheduled for them.
    pub fn get_status(&self, path: &Path) -> StatusEntry {
        let path = normalize_path(path);
        {
            let mut state = self.state.lock();
            if let Some(key) = state.find_key(&path) {
                if let Some(entry) = state.entries.get_mut(&key) {
                    entry.mark_seen_in_ui();
                    return entry.clone();
                }
            }
            if state.uptodate.contains(&path) {
                drop(state);
                return StatusEntry::up_to_date(path.is_dir());
            }
        }

        let Some(repo) = self.registry.owning_repository(&path) else {
            return StatusEntry::not_managed(path.is_dir());
        };
        let is_dir = path.is_dir();

        if self.is_excluded(&path, is_dir) || self.parent_excluded(&path) {
            let entry = StatusEntry::excluded(is_dir).with_seen_in_ui(true);
            self.apply_updates(vec![Update::reported(path, entry.clone())]);
            return entry;
        }

        if is_dir && repo.is_ignored(&path, true) {
            let entry = StatusEntry::excluded(true).with_seen_in_ui(true);
            self.apply_updates(vec![Update::reported(path.clone(), entry.clone())]);
            self.queue.schedule([path]);
            return entry;
        }

        let provisional = StatusEntry::up_to_date(is_dir);
        {
            let mut state = self.state.lock();
            if let Some(entry) = state.lookup(&path) {
                return entry.clone();
            }
            if !state.uptodate.insert(path.clone()) {
                return provisional;
            }
        }
        tracing::trace!(path = %path.display(), "Scheduling scan of unseen path");
        self.queue.schedule([path]);
        provisional
    }

    /// Status without side effects.
    ///
    /// Returns `None` for paths the cache knows nothing about.
    #[must_use]
    pub fn get_cached_status(&self, path: &Path) -> Option<StatusEntry> {
        let path = normalize_path(path);
        let state = self.state.lock();
        if let Some(entry) = state.lookup(&path) {
            return Some(entry.clone());
        }
        let up_to_date = state.uptodate.contains(&path);
        drop(state);
        up_to_date.then(|| StatusEntry::up_to_date(path.is_dir()))
    }

    fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        self.excluded.as_ref().is_some_and(|gitignore| {
            path.has_root() && gitignore.matched_path_or_any_parents(path, is_dir).is_ignore()
        })
    }

    fn parent_excluded(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        self.state
            .lock()
            .lookup(parent)
            .is_some_and(StatusEntry::is_excluded)
    }

    /// Refresh every path in `paths`, batched per owning repository.
    ///
    /// A failing repository is logged and reported in the summary; the
    /// others proceed. Unmanaged paths are skipped.
    pub fn refresh_roots(&self, paths: &[PathBuf], token: &ProgressToken) -> RefreshSummary {
        let mut batches: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        for path in paths {
            let path = normalize_path(path);
            match self.registry.owning_root(&path) {
                Some(root) => batches.entry(root).or_default().push(path),
                None => {
                    tracing::debug!(path = %path.display(), "Skipping refresh of unmanaged path");
                }
            }
        }

        let mut summary = RefreshSummary::default();
        for (root, seeds) in batches {
            if token.is_cancelled() {
                tracing::debug!("Refresh cancelled");
                break;
            }
            summary.roots += 1;
            match self.refresh_root(&root, &seeds, token) {
                Ok(changed) => summary.changed += changed,
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "Repository refresh failed");
                    summary.failed.push((root, e.to_string()));
                }
            }
        }
        summary
    }

    /// Refresh `seeds` (the whole working tree when empty) of the
    /// registered repository at `root`.
    ///
    /// Holds the repository's scan lock for the duration. Returns the
    /// number of change events published.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, or [`VcsError::Cancelled`]. Cached
    /// entries are left untouched on failure.
    pub fn refresh_root(
        &self,
        root: &Path,
        seeds: &[PathBuf],
        token: &ProgressToken,
    ) -> VcsResult<usize> {
        let info = self
            .registry
            .get(&normalize_path(root))
            .ok_or_else(|| VcsError::NotARepository(root.to_path_buf()))?;
        let root = info.root();
        let seeds: Vec<PathBuf> = if seeds.is_empty() {
            vec![root.to_path_buf()]
        } else {
            seeds.iter().map(|s| normalize_path(s)).collect()
        };

        let lock = self.repo_locks.lock_for(info.lock_key());
        let _scan = lock.lock();
        token.check()?;
        let started = Instant::now();
        let statuses = self.provider.query_status(root, &seeds, token)?;
        token.check()?;

        let nested: Vec<PathBuf> = self
            .registry
            .roots()
            .into_iter()
            .filter(|r| r != root && r.starts_with(root))
            .collect();
        let foreign = |p: &Path| nested.iter().any(|n| p.starts_with(n));

        let mut updates = Vec::with_capacity(statuses.len());
        let mut reported = HashSet::with_capacity(statuses.len());
        for (path, raw) in statuses {
            let path = normalize_path(&path);
            if foreign(&path) {
                continue;
            }
            let is_dir = path.is_dir();
            reported.insert(path.clone());
            if is_untracked(&raw) && self.is_excluded(&path, is_dir) {
                updates.push(Update::reported(path, StatusEntry::excluded(is_dir)));
                continue;
            }
            match to_entry(&path, &raw, is_dir) {
                Ok(entry) => updates.push(Update::reported(path, entry)),
                Err(e) => tracing::error!(error = %e, "Skipping path with inconsistent status"),
            }
        }

        let absent: BTreeSet<PathBuf> = {
            let state = self.state.lock();
            // a spelling differing only in case from a reported path is that path
            let reported_folded: Option<HashSet<String>> = state
                .folded
                .as_ref()
                .map(|_| reported.iter().map(|p| fold_case(p)).collect());
            let is_reported = |p: &Path| {
                reported.contains(p)
                    || reported_folded
                        .as_ref()
                        .is_some_and(|folded| folded.contains(&fold_case(p)))
            };

            let mut absent = BTreeSet::new();
            for seed in &seeds {
                if !is_reported(seed.as_path()) {
                    absent.insert(seed.clone());
                }
                for category in Category::ALL {
                    state.indexes.index(category).visit(seed, |p| {
                        if !is_reported(p) && !foreign(p) {
                            absent.insert(p.to_path_buf());
                        }
                        true
                    });
                }
                absent.extend(
                    state
                        .uptodate
                        .iter()
                        .filter(|p| p.starts_with(seed) && !is_reported(*p) && !foreign(*p))
                        .map(Path::to_path_buf),
                );
            }
            absent
        };
        for path in absent {
            let entry = if path.exists() {
                StatusEntry::up_to_date(path.is_dir())
            } else {
                StatusEntry::unknown()
            };
            updates.push(Update::absent(path, entry));
        }

        let changed = self.apply_updates(updates);
        tracing::debug!(
            root = %root.display(),
            seeds = seeds.len(),
            changed,
            elapsed = ?started.elapsed(),
            "Refreshed repository"
        );
        Ok(changed)
    }

    /// Apply updates under the map lock and publish the resulting events
    /// in mutation order once it is released.
    fn apply_updates(&self, updates: Vec<Update>) -> usize {
        if updates.is_empty() {
            return 0;
        }
        let _publishing = self.publish_lock.lock();
        let (events, size) = {
            let mut state = self.state.lock();
            let events: Vec<StatusEvent> =
                updates.into_iter().filter_map(|u| state.apply(u)).collect();
            (events, state.entries.len())
        };

        self.check_size(size);
        let changed = events.len();
        self.notifier.publish_all(events);
        changed
    }

    /// Warn once each time the map grows past the threshold.
    fn check_size(&self, size: usize) {
        if size <= self.size_warning_threshold {
            self.size_warned.store(false, Ordering::Relaxed);
        } else if !self.size_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                entries = size,
                threshold = self.size_warning_threshold,
                "Status cache is unusually large"
            );
        }
    }

    /// Paths at or under `roots` whose status intersects `filter`.
    ///
    /// Paths owned by a repository nested below the queried roots are
    /// dropped unless that repository is queried too.
    #[must_use]
    pub fn list_files(&self, roots: &[PathBuf], filter: StatusSet) -> Vec<PathBuf> {
        let roots: Vec<PathBuf> = roots.iter().map(|r| normalize_path(r)).collect();
        let mut found = BTreeSet::new();
        {
            let state = self.state.lock();
            for root in &roots {
                for category in Category::ALL {
                    state.indexes.index(category).visit(root, |p| {
                        if state.entries.get(p).is_some_and(|e| e.contains_any(filter)) {
                            found.insert(p.to_path_buf());
                        }
                        true
                    });
                }
                if filter.contains(Status::UpToDate) {
                    found.extend(
                        state
                            .uptodate
                            .iter()
                            .filter(|p| p.starts_with(root))
                            .map(Path::to_path_buf),
                    );
                }
            }
        }

        let repo_roots: Vec<PathBuf> = roots
            .iter()
            .filter_map(|r| self.registry.owning_root(r))
            .collect();
        check_belong_to_repository(found.into_iter().collect(), &repo_roots, &self.registry)
    }

    /// Whether [`StatusCache::list_files`] would return anything.
    #[must_use]
    pub fn contains_files(&self, roots: &[PathBuf], filter: StatusSet) -> bool {
        let roots: Vec<PathBuf> = roots.iter().map(|r| normalize_path(r)).collect();
        let repo_roots: Vec<PathBuf> = roots
            .iter()
            .filter_map(|r| self.registry.owning_root(r))
            .collect();
        let foreign: Vec<PathBuf> = self
            .registry
            .roots()
            .into_iter()
            .filter(|r| !repo_roots.contains(r) && roots.iter().any(|q| r.starts_with(q)))
            .collect();
        let owned = |p: &Path| {
            repo_roots.iter().any(|r| p.starts_with(r)) && !foreign.iter().any(|f| p.starts_with(f))
        };

        let state = self.state.lock();
        let hit = |p: &Path| owned(p) && state.entries.get(p).is_some_and(|e| e.contains_any(filter));
        for root in &roots {
            for category in Category::ALL {
                if !state.indexes.index(category).visit(root, |p| !hit(p)) {
                    return true;
                }
            }
            if filter.contains(Status::UpToDate)
                && state.uptodate.iter().any(|p| p.starts_with(root) && owned(p))
            {
                return true;
            }
        }
        false
    }

    /// Interesting paths cached directly inside `dir`, sorted.
    #[must_use]
    pub fn list_files_in(&self, dir: &Path) -> Vec<PathBuf> {
        let dir = normalize_path(dir);
        let state = self.state.lock();
        let mut children: Vec<PathBuf> = Category::ALL
            .iter()
            .flat_map(|c| state.indexes.index(*c).flagged_children(&dir))
            .collect();
        children.sort();
        children
    }

    /// Number of entries in the primary map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of paths in the up-to-date overflow set.
    #[must_use]
    pub fn up_to_date_len(&self) -> usize {
        self.state.lock().uptodate.len()
    }

    /// Forget everything cached under `root` without publishing events.
    pub fn evict_repository(&self, root: &Path) {
        let root = normalize_path(root);
        self.state.lock().remove_under(&root);
        if let Some(info) = self.registry.get(&root) {
            self.repo_locks.release(info.lock_key());
        }
        tracing::debug!(root = %root.display(), "Evicted cached statuses");
    }
}

impl std::fmt::Debug for StatusCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StatusCache")
            .field("entries", &state.entries.len())
            .field("up_to_date", &state.uptodate.len())
            .field("indexed", &state.indexes.len())
            .finish_non_exhaustive()
    }
}
