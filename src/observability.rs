//! Structured logging configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Plain text or JSON output
//! - `RUST_LOG` overriding the configured level
//! - Spans for repository scans

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

use crate::{Error, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);
        Registry::default().with(env_filter).with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);
        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };
    installed.map_err(|e| Error::internal(format!("tracing already initialized: {e}")))?;

    tracing::debug!(level, json, "Tracing initialized");
    Ok(())
}

/// Span helpers.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span covering one repository scan.
    #[must_use]
    pub fn scan_span(root: &Path, seeds: usize) -> Span {
        info_span!("scan", root = %root.display(), seeds)
    }
}
