/// Observability infrastructure for the voice routing core.
///
/// This module provides structured tracing, metrics collection, and secret redaction
/// for production observability.
///
/// # Tracing
///
/// Structured spans are emitted at key points in a turn's lifecycle:
/// - The turn itself (capture through synthesis)
/// - Router classification (rule stage + semantic stage)
/// - Generator adapter requests (LOCAL, FAST, AGENT tiers)
/// - Cost ledger writes
///
/// Use the span constants and helper macros from [`spans`] for consistent naming.
///
/// # Example
///
/// ```rust,ignore
/// use atlas_core::generator_request_span;
///
/// let span = generator_request_span!("fast", "gpt-4o-mini");
/// let _enter = span.enter();
/// // ... generator adapter request logic ...
/// ```
///
/// # Metrics
///
/// Implement the [`MetricsCollector`](metrics::MetricsCollector) trait to collect performance and usage metrics.
/// A no-op default implementation is provided.
///
/// # Secret Redaction
///
/// Use [`RedactedString`](redact::RedactedString) to prevent accidental leakage of API keys, tokens, and other
/// sensitive data in logs and error messages.
pub mod metrics;
pub mod redact;
pub mod spans;

// Re-export span helpers for convenience
pub use spans::{
    FIELD_BUDGET_MODE, FIELD_CATEGORY, FIELD_ERROR_TYPE, FIELD_MODEL, FIELD_TIER, FIELD_TURN_ID,
    FIELD_UTTERANCE_ID, SPAN_GENERATOR_REQUEST, SPAN_LEDGER_WRITE, SPAN_ROUTER_CLASSIFY, SPAN_TURN,
};

// Re-export metrics types for convenience
pub use metrics::{MetricsCollector, NoopMetrics, duration_to_ms};

// Re-export redaction utilities for convenience
pub use redact::{
    RedactedString, redact_all, redact_api_key, redact_api_key_in_json, redact_auth_header,
};

use crate::config::LoggingConfig;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from [`LoggingConfig`].
///
/// `RUST_LOG` always wins if set; otherwise falls back to `config.level`.
/// When `config.log_dir` is non-empty, logs are additionally written to a
/// daily-rotating file there and the returned guard must be kept alive for
/// the life of the process (dropping it stops the background flush task).
pub fn init_tracing(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    if config.log_dir.as_os_str().is_empty() {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(
        path_or_dot(&config.log_dir),
        "atlas.log",
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .init();
    Some(guard)
}

fn path_or_dot(path: &Path) -> &Path {
    if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    }
}
