//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use git2::{Commit, IndexAddOption, Repository, Signature};
use git_status_cache::events::StatusEvent;
use tempfile::TempDir;

/// A throwaway repository under a temp directory.
pub struct TestRepo {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap().join("repo");
        let repo = Repository::init(&root).unwrap();
        Self { tmp, root, repo }
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn stage(&self, rel: &str) {
        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(rel)).unwrap();
        index.write().unwrap();
    }

    pub fn commit_all(&self, message: &str) {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    pub fn lock_index(&self) -> PathBuf {
        let lock = self.root.join(".git").join("index.lock");
        std::fs::write(&lock, "").unwrap();
        lock
    }
}

/// Wait for the first event matching `pred`.
pub fn wait_for(
    events: &Receiver<StatusEvent>,
    timeout: Duration,
    pred: impl Fn(&StatusEvent) -> bool,
) -> Option<StatusEvent> {
    let deadline = Instant::now() + timeout;
    while let Ok(event) = events.recv_deadline(deadline) {
        if pred(&event) {
            return Some(event);
        }
    }
    None
}
