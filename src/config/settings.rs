//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Coalescing window for filesystem-driven refresh requests.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Retry interval for repositories locked by an external process.
pub const DEFAULT_LOCK_RETRY: Duration = Duration::from_secs(5);

/// Upper bound on waiting for in-flight scans at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum number of paths kept in the up-to-date overflow set.
pub const DEFAULT_UPTODATE_CAPACITY: usize = 1024;

/// Cache size above which a one-time warning is logged.
pub const DEFAULT_SIZE_WARNING_THRESHOLD: usize = 100_000;

/// Main configuration for the status cache service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository roots registered at startup.
    pub repositories: Vec<PathBuf>,

    /// Discover repositories by walking up from queried paths.
    pub auto_discover: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Debounce window for scheduled refreshes.
    pub debounce: Duration,

    /// Backoff between retries of a locked repository.
    pub lock_retry: Duration,

    /// Bounded wait for in-flight scans at shutdown.
    pub shutdown_timeout: Duration,

    /// Number of scan worker threads.
    pub worker_threads: usize,

    /// Capacity of the up-to-date overflow set.
    pub uptodate_capacity: usize,

    /// Entry count that triggers the cache size warning.
    pub size_warning_threshold: usize,

    /// Gitignore-style patterns for administratively excluded paths.
    pub excluded_patterns: Vec<String>,

    /// Do not add copied files to the index.
    pub exclude_new_files: bool,

    /// Treat paths differing only in case as the same file.
    pub case_insensitive: bool,

    /// Watch registered working trees for changes.
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            auto_discover: true,
            log_level: "info".to_string(),
            log_json: false,
            debounce: DEFAULT_DEBOUNCE,
            lock_retry: DEFAULT_LOCK_RETRY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get().min(2))
                .unwrap_or(2),
            uptodate_capacity: DEFAULT_UPTODATE_CAPACITY,
            size_warning_threshold: DEFAULT_SIZE_WARNING_THRESHOLD,
            excluded_patterns: Vec::new(),
            exclude_new_files: false,
            case_insensitive: cfg!(any(windows, target_os = "macos")),
            watch: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.debounce.is_zero() {
            return Err(Error::config("debounce cannot be 0"));
        }

        if self.lock_retry.is_zero() {
            return Err(Error::config("lock_retry cannot be 0"));
        }

        if self.worker_threads == 0 {
            return Err(Error::config("worker_threads cannot be 0"));
        }

        if self.worker_threads > 32 {
            return Err(Error::config("worker_threads cannot exceed 32"));
        }

        // eviction drops an eighth of the set, which must be at least one path
        if self.uptodate_capacity < 8 {
            return Err(Error::config("uptodate_capacity must be at least 8"));
        }

        if self.size_warning_threshold == 0 {
            return Err(Error::config("size_warning_threshold cannot be 0"));
        }

        for repo in &self.repositories {
            if !repo.is_absolute() {
                return Err(Error::config(format!(
                    "repository path must be absolute: {}",
                    repo.display()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.debounce, Duration::from_millis(800));
        assert_eq!(config.lock_retry, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.uptodate_capacity, 1024);
        assert!(config.auto_discover);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_validate_log_level_case_insensitive() {
        let config = Config {
            log_level: "DEBUG".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_debounce() {
        let config = Config {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("debounce"));
    }

    #[test]
    fn test_validate_worker_threads() {
        let zero = Config {
            worker_threads: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let too_many = Config {
            worker_threads: 33,
            ..Default::default()
        };
        assert!(too_many.validate().is_err());

        let ok = Config {
            worker_threads: 32,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_validate_uptodate_capacity() {
        let config = Config {
            uptodate_capacity: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_relative_repository() {
        let config = Config {
            repositories: vec![PathBuf::from("relative/repo")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }
}
