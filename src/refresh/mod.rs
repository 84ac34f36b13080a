//! Refresh scheduling.
//!
//! This module provides:
//! - The request queue feeding the scheduler ([`RefreshQueue`])
//! - Cancellation tokens for long-running scans ([`ProgressToken`])
//! - The debounced per-repository scheduler and its worker pool
//!   ([`RefreshScheduler`])

mod progress;
mod queue;
mod scheduler;

pub use progress::ProgressToken;
pub use queue::{RefreshCommand, RefreshQueue, ScanOutcome};
pub use scheduler::{Phase, RefreshScheduler, SchedulerConfig};
