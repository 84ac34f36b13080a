//! Filesystem watching of registered working trees.
//!
//! This module provides:
//! - Recursive directory watching using notify-rs
//! - Routing of `.git` metadata events apart from working tree changes
//! - Batching of debounced events into refresh requests

mod events;
mod filter;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::EventBatch;
pub use filter::{is_ignore_file, route, WatchAction};
pub use watcher::RepositoryWatcher;
