/// Metrics collection for observability.
///
/// The [`MetricsCollector`] trait allows pluggable metrics backends (Prometheus, StatsD, etc.)
/// while keeping the routing core decoupled from specific metrics systems.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use atlas_core::observability::metrics::{MetricsCollector, NoopMetrics};
///
/// let metrics: Arc<dyn MetricsCollector> = Arc::new(NoopMetrics);
/// metrics.record_tier_latency_ms("fast", 420);
/// metrics.count_event("barge_in", "speaking");
/// ```
///
/// # Thread Safety
///
/// All methods take `&self` (not `&mut self`) to allow concurrent access from multiple tasks.
/// Implementors should use interior mutability (e.g., `Arc<Mutex<>>`, `AtomicU64`) as needed.
use std::time::Duration;

/// Metrics collection interface for the voice routing core.
///
/// Implementations can send metrics to Prometheus, StatsD, CloudWatch, or any other backend.
/// The default [`NoopMetrics`] implementation does nothing (zero runtime cost).
///
/// # Methods
///
/// ## Latency Recording
/// - [`record_turn_latency_ms`](MetricsCollector::record_turn_latency_ms) - Full turn latency (capture to first audio out)
/// - [`record_tier_latency_ms`](MetricsCollector::record_tier_latency_ms) - Generator adapter latency, per tier
/// - [`record_ttft_ms`](MetricsCollector::record_ttft_ms) - Time-to-first-token, per tier
///
/// ## Event Counting
/// - [`count_event`](MetricsCollector::count_event) - Generic event counter
/// - [`count_downgrade`](MetricsCollector::count_downgrade) - Tier downgrade events
/// - [`count_budget_override`](MetricsCollector::count_budget_override) - Budget-state tier overrides
/// - [`count_barge_in`](MetricsCollector::count_barge_in) - Barge-in interruptions
///
/// ## Usage Tracking
/// - [`record_token_usage`](MetricsCollector::record_token_usage) - Input/output token counts, per tier
/// - [`record_cost`](MetricsCollector::record_cost) - Turn cost in USD, per tier
pub trait MetricsCollector: Send + Sync {
    /// Record full turn latency (speech end to first synthesized audio).
    ///
    /// # Arguments
    /// - `latency_ms` - Total latency in milliseconds
    fn record_turn_latency_ms(&self, latency_ms: u64);

    /// Record generator adapter request latency for a dispatch tier.
    ///
    /// # Arguments
    /// - `tier` - Dispatch tier ("local", "fast", or "agent")
    /// - `latency_ms` - Request latency in milliseconds
    fn record_tier_latency_ms(&self, tier: &str, latency_ms: u64);

    /// Record time-to-first-token for a generator adapter request.
    ///
    /// # Arguments
    /// - `tier` - Dispatch tier
    /// - `ttft_ms` - Milliseconds from request start to first streamed token
    fn record_ttft_ms(&self, tier: &str, ttft_ms: u64);

    /// Record a generic event count (increment by 1).
    ///
    /// # Arguments
    /// - `event_name` - Event type (e.g., "vad_speech_start", "filler_played")
    /// - `label` - Optional label for categorization
    fn count_event(&self, event_name: &str, label: &str);

    /// Record a tier downgrade (generator adapter fell back to a cheaper tier).
    ///
    /// # Arguments
    /// - `from_tier` - Tier that failed or timed out
    /// - `to_tier` - Tier the turn fell back to
    fn count_downgrade(&self, from_tier: &str, to_tier: &str);

    /// Record a budget-driven tier override (router forced a cheaper tier).
    ///
    /// # Arguments
    /// - `budget_mode` - Budget state at the time of override ("thrifty" or "local_only")
    fn count_budget_override(&self, budget_mode: &str);

    /// Record a barge-in interruption during assistant speech.
    fn count_barge_in(&self);

    /// Record token usage for a generator adapter request.
    ///
    /// # Arguments
    /// - `tier` - Dispatch tier
    /// - `input_tokens` - Input tokens consumed
    /// - `output_tokens` - Output tokens generated
    fn record_token_usage(&self, tier: &str, input_tokens: u64, output_tokens: u64);

    /// Record turn cost in USD.
    ///
    /// # Arguments
    /// - `tier` - Dispatch tier
    /// - `cost_usd` - Total cost in USD (can be fractional, e.g., 0.00125)
    fn record_cost(&self, tier: &str, cost_usd: f64);
}

/// No-op metrics collector (default implementation).
///
/// This implementation does nothing and has zero runtime cost. Use it when metrics
/// collection is disabled or during development.
///
/// # Example
///
/// ```rust
/// use atlas_core::observability::metrics::{MetricsCollector, NoopMetrics};
///
/// let metrics = NoopMetrics;
/// metrics.record_turn_latency_ms(1000); // No-op
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn record_turn_latency_ms(&self, _latency_ms: u64) {
        // No-op
    }

    fn record_tier_latency_ms(&self, _tier: &str, _latency_ms: u64) {
        // No-op
    }

    fn record_ttft_ms(&self, _tier: &str, _ttft_ms: u64) {
        // No-op
    }

    fn count_event(&self, _event_name: &str, _label: &str) {
        // No-op
    }

    fn count_downgrade(&self, _from_tier: &str, _to_tier: &str) {
        // No-op
    }

    fn count_budget_override(&self, _budget_mode: &str) {
        // No-op
    }

    fn count_barge_in(&self) {
        // No-op
    }

    fn record_token_usage(&self, _tier: &str, _input_tokens: u64, _output_tokens: u64) {
        // No-op
    }

    fn record_cost(&self, _tier: &str, _cost_usd: f64) {
        // No-op
    }
}

/// Helper to convert [`Duration`] to milliseconds as `u64`.
///
/// Useful when passing [`std::time::Instant::elapsed()`] to metrics methods.
///
/// # Example
///
/// ```rust
/// use std::time::Instant;
/// use atlas_core::observability::metrics::duration_to_ms;
///
/// let start = Instant::now();
/// // ... some work ...
/// let elapsed_ms = duration_to_ms(start.elapsed());
/// ```
pub fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_compiles() {
        let metrics = NoopMetrics;
        metrics.record_turn_latency_ms(100);
        metrics.count_event("test_event", "label");
    }

    #[test]
    fn noop_metrics_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopMetrics>();
    }

    #[test]
    fn duration_to_ms_conversion() {
        let dur = Duration::from_millis(1234);
        assert_eq!(duration_to_ms(dur), 1234);

        let dur = Duration::from_secs(2);
        assert_eq!(duration_to_ms(dur), 2000);

        let dur = Duration::from_micros(500);
        assert_eq!(duration_to_ms(dur), 0);
    }

    #[test]
    fn trait_methods_are_non_blocking() {
        // This test verifies the trait signature allows &self (not &mut self)
        // which enables concurrent calls from multiple tasks
        let metrics: &dyn MetricsCollector = &NoopMetrics;
        metrics.record_tier_latency_ms("fast", 100);
        metrics.count_event("event", "label");
        metrics.record_token_usage("fast", 100, 200);
    }
}
