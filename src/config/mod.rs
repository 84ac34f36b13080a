//! Configuration management for the status cache.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - Built-in defaults (lowest priority)

mod settings;

pub use settings::{
    Config, DEFAULT_DEBOUNCE, DEFAULT_LOCK_RETRY, DEFAULT_SHUTDOWN_TIMEOUT,
    DEFAULT_SIZE_WARNING_THRESHOLD, DEFAULT_UPTODATE_CAPACITY,
};
