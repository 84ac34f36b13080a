//! Git file-status cache.
//!
//! Keeps the VCS status of working tree paths in memory so UI code can ask
//! for it without touching the repository. Unknown paths get a provisional
//! answer and a background refresh; refreshes are debounced per repository,
//! deferred while another process holds the index lock, and every status
//! change is published to subscribers.
//!
//! Start with [`GitStatusService`], which wires the pieces together.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod interceptor;
pub mod metrics;
pub mod observability;
pub mod refresh;
pub mod service;
pub mod status;
pub mod vcs;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use service::GitStatusService;
