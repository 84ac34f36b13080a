//! Prometheus metrics for the status service.
//!
//! Each service owns its own [`Registry`], so several services can live in
//! one process without clashing registrations.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::events::StatusEvent;
use crate::{Error, Result};

/// Outcome label for a completed refresh.
pub const OUTCOME_COMPLETED: &str = "completed";
/// Outcome label for a refresh parked on a locked repository.
pub const OUTCOME_LOCKED: &str = "locked";
/// Outcome label for a failed refresh.
pub const OUTCOME_FAILED: &str = "failed";

/// Metric handles for one service instance.
#[derive(Clone)]
pub struct StatusMetrics {
    registry: Registry,
    cached_entries: IntGauge,
    up_to_date_entries: IntGauge,
    change_events: IntCounter,
    refresh_outcomes: IntCounterVec,
    refresh_duration: Histogram,
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::internal(format!("metrics: {e}"))
}

impl StatusMetrics {
    /// Create and register every metric in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric fails to register.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cached_entries = IntGauge::new(
            "git_status_cache_entries",
            "Number of paths with a cached non-trivial status",
        )
        .map_err(metric_error)?;
        let up_to_date_entries = IntGauge::new(
            "git_status_cache_up_to_date_entries",
            "Number of paths in the up-to-date overflow set",
        )
        .map_err(metric_error)?;
        let change_events = IntCounter::new(
            "git_status_cache_change_events_total",
            "Total number of file status change events published",
        )
        .map_err(metric_error)?;
        let refresh_outcomes = IntCounterVec::new(
            Opts::new(
                "git_status_cache_refreshes_total",
                "Total number of repository refreshes by outcome",
            ),
            &["outcome"],
        )
        .map_err(metric_error)?;
        let refresh_duration = Histogram::with_opts(
            HistogramOpts::new(
                "git_status_cache_refresh_duration_seconds",
                "Repository refresh latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(cached_entries.clone()))
            .and_then(|()| registry.register(Box::new(up_to_date_entries.clone())))
            .and_then(|()| registry.register(Box::new(change_events.clone())))
            .and_then(|()| registry.register(Box::new(refresh_outcomes.clone())))
            .and_then(|()| registry.register(Box::new(refresh_duration.clone())))
            .map_err(metric_error)?;

        tracing::debug!("Prometheus metrics initialized");
        Ok(Self {
            registry,
            cached_entries,
            up_to_date_entries,
            change_events,
            refresh_outcomes,
            refresh_duration,
        })
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count a published event.
    pub fn record_event(&self, event: &StatusEvent) {
        if matches!(event, StatusEvent::FileStatusChanged { .. }) {
            self.change_events.inc();
        }
    }

    /// Record the outcome of one repository refresh.
    pub fn record_refresh(&self, outcome: &str, elapsed: Duration) {
        self.refresh_outcomes.with_label_values(&[outcome]).inc();
        if outcome == OUTCOME_COMPLETED {
            self.refresh_duration.observe(elapsed.as_secs_f64());
        }
    }

    pub fn set_cache_size(&self, entries: usize, up_to_date: usize) {
        self.cached_entries
            .set(i64::try_from(entries).unwrap_or(i64::MAX));
        self.up_to_date_entries
            .set(i64::try_from(up_to_date).unwrap_or(i64::MAX));
    }

    #[must_use]
    pub fn refresh_count(&self, outcome: &str) -> u64 {
        self.refresh_outcomes.with_label_values(&[outcome]).get()
    }

    #[must_use]
    pub fn change_event_count(&self) -> u64 {
        self.change_events.get()
    }

    /// Render every metric in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn export(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| Error::internal(format!("metrics: {e}")))
    }
}

impl std::fmt::Debug for StatusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusMetrics")
            .field("entries", &self.cached_entries.get())
            .field("change_events", &self.change_events.get())
            .finish_non_exhaustive()
    }
}
