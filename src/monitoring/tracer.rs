/*!
 * Structured Tracing
 * Subscriber setup and sync spans using the tracing crate
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Slow-sync warning threshold
const SLOW_SYNC_MILLIS: u128 = 500;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - FEDFS_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("FEDFS_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span covering one mount point's sync
pub struct SyncSpan {
    _span: tracing::Span,
    start: Instant,
    mount_point: String,
}

impl SyncSpan {
    pub fn new(mount_point: &str) -> Self {
        let span = span!(
            Level::DEBUG,
            "sync",
            mount_point = mount_point,
            duration_us = tracing::field::Empty,
            step = tracing::field::Empty,
            entries = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        let _entered = span.enter();
        debug!(mount_point, "sync started");
        drop(_entered);

        Self {
            _span: span,
            start: Instant::now(),
            mount_point: mount_point.to_string(),
        }
    }

    /// Record the protocol step currently executing
    pub fn record_step(&self, step: &str) {
        self._span.record("step", step);
    }

    /// Record a successful commit of `entries` entries
    pub fn record_committed(&self, entries: usize) {
        self._span.record("entries", entries);
        self._span.record("result", "success");
    }

    pub fn record_error(&self, error: &str) {
        self._span.record("error", error);
        self._span.record("result", "error");
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self._span.enter()
    }
}

impl Drop for SyncSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self._span.enter();
        self._span.record("duration_us", duration.as_micros());

        if duration.as_millis() > SLOW_SYNC_MILLIS {
            warn!(
                mount_point = %self.mount_point,
                duration_ms = duration.as_millis(),
                slow = true,
                "slow sync detected"
            );
        } else {
            debug!(
                mount_point = %self.mount_point,
                duration_us = duration.as_micros(),
                "sync finished"
            );
        }
    }
}

/// Helper to create a sync span
#[inline]
pub fn span_sync(mount_point: &str) -> SyncSpan {
    SyncSpan::new(mount_point)
}
