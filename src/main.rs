//! Git status cache - command line front end
//!
//! Refreshes the given repositories, prints every path with local changes
//! and, with `--watch`, keeps printing change events until interrupted.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use git_status_cache::events::StatusEvent;
use git_status_cache::observability::init_tracing;
use git_status_cache::refresh::ProgressToken;
use git_status_cache::status::{Mode, Status, StatusSet};
use git_status_cache::vcs::{normalize_path, GitBackend};
use git_status_cache::{Config, GitStatusService, Result};

/// Git status cache - cached working tree status with change events
#[derive(Parser, Debug)]
#[command(name = "git-status-cache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Repository working trees to load
    #[arg(env = "GIT_STATUS_CACHE_REPOSITORIES", value_delimiter = ',', required = true)]
    repositories: Vec<PathBuf>,

    /// Keep watching and print change events until interrupted
    #[arg(short, long, env = "GIT_STATUS_CACHE_WATCH")]
    watch: bool,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,

    /// Show the two-column index/worktree markers
    #[arg(long)]
    two_column: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GIT_STATUS_CACHE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "GIT_STATUS_CACHE_LOG_JSON")]
    log_json: bool,

    /// Debounce window for refreshes, in milliseconds
    #[arg(long, env = "GIT_STATUS_CACHE_DEBOUNCE_MS", default_value = "800")]
    debounce_ms: u64,

    /// Retry interval for locked repositories, in milliseconds
    #[arg(long, env = "GIT_STATUS_CACHE_LOCK_RETRY_MS", default_value = "5000")]
    lock_retry_ms: u64,

    /// Number of scan worker threads
    #[arg(long, env = "GIT_STATUS_CACHE_WORKERS", default_value = "2")]
    workers: usize,

    /// Gitignore-style patterns to report as excluded
    #[arg(long, env = "GIT_STATUS_CACHE_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Treat paths differing only in case as the same file
    #[arg(long, env = "GIT_STATUS_CACHE_CASE_INSENSITIVE")]
    case_insensitive: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let cwd = std::env::current_dir().unwrap_or_default();
        Config {
            repositories: self
                .repositories
                .iter()
                .map(|p| normalize_path(&cwd.join(p)))
                .collect(),
            auto_discover: false,
            log_level: self.log_level,
            log_json: self.log_json,
            debounce: Duration::from_millis(self.debounce_ms),
            lock_retry: Duration::from_millis(self.lock_retry_ms),
            worker_threads: self.workers,
            excluded_patterns: self.exclude,
            case_insensitive: self.case_insensitive || Config::default().case_insensitive,
            watch: self.watch,
            ..Config::default()
        }
    }
}

fn mode(two_column: bool) -> Mode {
    if two_column {
        Mode::IndexVsWorkingTree
    } else {
        Mode::HeadVsWorkingTree
    }
}

fn print_status(service: &GitStatusService, json: bool, mode: Mode) {
    let roots = service.registry().roots();
    let filter = StatusSet::LOCAL_CHANGES
        .union(StatusSet::single(Status::InConflict))
        .union(StatusSet::single(Status::NotVersionedExcluded));
    for path in service.list_files(&roots, filter) {
        let Some(entry) = service.cache().get_cached_status(&path) else {
            continue;
        };
        if json {
            let line = serde_json::json!({ "path": path, "status": entry });
            println!("{line}");
        } else {
            println!("{:>4} {}", entry.short_status_text(mode), path.display());
        }
    }
}

fn print_event(event: &StatusEvent, json: bool, mode: Mode) {
    match event {
        StatusEvent::FileStatusChanged { path, new, .. } => {
            if json {
                println!("{}", serde_json::json!({ "path": path, "status": new }));
            } else {
                println!("{:>4} {}", new.short_status_text(mode), path.display());
            }
        }
        StatusEvent::RepositoryLocked { root } => {
            tracing::info!(root = %root.display(), "Repository locked");
        }
        StatusEvent::RefreshFinished { .. } => {}
        StatusEvent::RefreshFailed { root, reason } => {
            tracing::warn!(root = %root.display(), %reason, "Refresh failed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    let json = cli.json;
    let mode = mode(cli.two_column);
    let config = cli.into_config();
    tracing::debug!(?config, "Configuration loaded");

    let watch = config.watch;
    let roots = config.repositories.clone();
    let service = GitStatusService::new(config, GitBackend::new())?;

    let summary = service.refresh_blocking(&roots, &ProgressToken::new());
    for (root, reason) in &summary.failed {
        tracing::error!(root = %root.display(), %reason, "Initial refresh failed");
    }
    print_status(&service, json, mode);

    if !watch {
        return Ok(());
    }

    let _printer = service
        .notifier()
        .subscribe(move |event: &StatusEvent| print_event(event, json, mode));
    service.start()?;
    tracing::info!("Watching for changes, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    let drained = tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .map_err(|e| git_status_cache::Error::internal(format!("shutdown task failed: {e}")))?;
    if !drained {
        tracing::warn!("Exited with scans still running");
    }
    Ok(())
}
