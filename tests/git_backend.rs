//! Integration tests against real repositories.

mod common;

use std::time::Duration;

use common::TestRepo;
use git_status_cache::events::StatusEvent;
use git_status_cache::refresh::ProgressToken;
use git_status_cache::status::{Mode, Status, StatusSet, Summary};
use git_status_cache::vcs::{GitBackend, LockProbe, VcsCommands};
use git_status_cache::{Config, GitStatusService};

fn service(repo: &TestRepo) -> GitStatusService {
    let config = Config {
        repositories: vec![repo.root.clone()],
        auto_discover: false,
        debounce: Duration::from_millis(20),
        case_insensitive: false,
        ..Default::default()
    };
    GitStatusService::new(config, GitBackend::new()).unwrap()
}

fn refresh(service: &GitStatusService, repo: &TestRepo) -> usize {
    let summary = service.refresh_blocking(&[repo.root.clone()], &ProgressToken::new());
    assert!(summary.is_success(), "{:?}", summary.failed);
    summary.changed
}

#[test]
fn test_modified_file_renders_m() {
    let repo = TestRepo::new();
    repo.write("a.txt", "one\n");
    repo.commit_all("initial");
    let path = repo.write("a.txt", "two\n");

    let service = service(&repo);
    refresh(&service, &repo);

    let entry = service.cache().get_cached_status(&path).unwrap();
    assert!(entry.contains(Status::ModifiedIndexWorkingTree));
    assert!(entry.contains(Status::ModifiedHeadWorkingTree));
    assert_eq!(entry.short_status_text(Mode::HeadVsWorkingTree), "M");
    assert_eq!(entry.short_status_text(Mode::IndexVsWorkingTree), "-/M");
}

#[test]
fn test_added_then_removed() {
    let repo = TestRepo::new();
    repo.write("keep.txt", "keep\n");
    repo.commit_all("initial");
    let path = repo.write("gone.txt", "gone\n");
    repo.stage("gone.txt");
    std::fs::remove_file(&path).unwrap();

    let service = service(&repo);
    refresh(&service, &repo);

    let entry = service.cache().get_cached_status(&path).unwrap();
    assert_eq!(entry.summary(), Summary::AddedThenRemoved);
    assert_eq!(entry.short_status_text(Mode::HeadVsIndex), "A/D");
}

#[test]
fn test_ignored_and_untracked() {
    let repo = TestRepo::new();
    repo.write(".gitignore", "*.log\n");
    repo.commit_all("initial");
    let log = repo.write("debug.log", "noise");
    let new = repo.write("new.rs", "fn main() {}");

    let service = service(&repo);
    refresh(&service, &repo);

    assert!(service.cache().get_cached_status(&log).unwrap().is_excluded());
    let entry = service.cache().get_cached_status(&new).unwrap();
    assert!(entry.contains(Status::NewIndexWorkingTree));
    assert!(entry.has_local_changes());
}

#[test]
fn test_second_refresh_is_silent() {
    let repo = TestRepo::new();
    repo.write("a.txt", "one\n");
    repo.commit_all("initial");
    repo.write("a.txt", "two\n");
    repo.write("b.txt", "new\n");

    let service = service(&repo);
    let (_sub, events) = service.notifier().subscribe_channel();

    assert!(refresh(&service, &repo) >= 2);
    let first: Vec<StatusEvent> = events.try_iter().collect();
    assert!(first
        .iter()
        .all(|e| matches!(e, StatusEvent::FileStatusChanged { .. })));

    assert_eq!(refresh(&service, &repo), 0);
    assert_eq!(events.try_iter().count(), 0);
}

#[test]
fn test_commit_clears_local_changes() {
    let repo = TestRepo::new();
    repo.write("a.txt", "one\n");
    repo.commit_all("initial");
    let path = repo.write("a.txt", "two\n");

    let service = service(&repo);
    refresh(&service, &repo);
    assert!(service
        .cache()
        .contains_files(&[repo.root.clone()], StatusSet::LOCAL_CHANGES));

    repo.commit_all("second");
    refresh(&service, &repo);
    assert!(service.get_status(&path).is_up_to_date());
    assert!(!service
        .cache()
        .contains_files(&[repo.root.clone()], StatusSet::LOCAL_CHANGES));
}

#[test]
fn test_interceptor_rename_is_staged() {
    let repo = TestRepo::new();
    let from = repo.write("old_name.txt", "same content for rename detection\n");
    repo.commit_all("initial");
    let to = repo.root.join("new_name.txt");

    let service = service(&repo);
    service.interceptor().rename(&from, &to).unwrap();
    assert!(to.is_file() && !from.exists());
    refresh(&service, &repo);

    let entry = service.cache().get_cached_status(&to).unwrap();
    assert!(entry.is_renamed());
    assert_eq!(entry.old_path(), Some(from.as_path()));
    assert_eq!(entry.summary(), Summary::Renamed);
}

#[test]
fn test_interceptor_delete_tracked() {
    let repo = TestRepo::new();
    let path = repo.write("a.txt", "one\n");
    repo.commit_all("initial");

    let service = service(&repo);
    service.interceptor().delete(&path).unwrap();
    refresh(&service, &repo);

    let entry = service.cache().get_cached_status(&path).unwrap();
    assert!(entry.contains(Status::RemovedHeadIndex));
}

#[test]
fn test_backend_tracking_and_reset() {
    let repo = TestRepo::new();
    repo.write("src/a.txt", "one\n");
    repo.commit_all("initial");
    let staged = repo.write("src/b.txt", "two\n");
    repo.stage("src/b.txt");

    let backend = GitBackend::new();
    assert!(backend.is_tracked(&repo.root, &repo.root.join("src")).unwrap());
    assert!(backend.is_tracked(&repo.root, &staged).unwrap());

    backend.reset(&repo.root, &[staged.clone()]).unwrap();
    assert!(!backend.is_tracked(&repo.root, &staged).unwrap());
    assert!(staged.is_file());
}

#[test]
fn test_reset_before_first_commit_unstages() {
    let repo = TestRepo::new();
    let staged = repo.write("a.txt", "one\n");
    repo.stage("a.txt");

    let backend = GitBackend::new();
    assert!(backend.is_tracked(&repo.root, &staged).unwrap());
    backend.reset(&repo.root, &[staged.clone()]).unwrap();
    assert!(!backend.is_tracked(&repo.root, &staged).unwrap());
    assert!(staged.is_file());
}

#[test]
fn test_lock_probe() {
    let repo = TestRepo::new();
    let backend = GitBackend::new();
    assert!(!backend.is_locked(&repo.root));

    let lock = repo.lock_index();
    assert!(backend.is_locked(&repo.root));
    std::fs::remove_file(lock).unwrap();
    assert!(!backend.is_locked(&repo.root));
}
