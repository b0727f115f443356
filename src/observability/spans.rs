/// Structured tracing spans for observability.
///
/// This module defines standardized span names and field keys for consistent
/// tracing across a conversational turn. Spans follow the hierarchy:
///
/// ```text
/// atlas.turn
///   └─> atlas.router.classify
///   └─> atlas.generator.request
///        └─> atlas.ledger.write
/// ```
///
/// # Example
///
/// ```rust,ignore
/// use tracing::info_span;
/// use atlas_core::observability::spans::*;
///
/// let span = info_span!(
///     SPAN_GENERATOR_REQUEST,
///     { FIELD_TIER } = "fast",
///     { FIELD_MODEL } = "gpt-4o-mini",
/// );
/// let _enter = span.enter();
/// // ... generator request logic ...
/// ```
// Span names (hierarchical, dot-separated)
/// Root span for a single conversational turn.
pub const SPAN_TURN: &str = "atlas.turn";

/// Span for router classification (rule stage + semantic stage).
pub const SPAN_ROUTER_CLASSIFY: &str = "atlas.router.classify";

/// Span for a generator adapter request (LOCAL, FAST, or AGENT tier).
pub const SPAN_GENERATOR_REQUEST: &str = "atlas.generator.request";

/// Span for a cost ledger write (usage record commit).
pub const SPAN_LEDGER_WRITE: &str = "atlas.ledger.write";

// Field keys for span attributes
/// Dispatch tier field ("local", "fast", or "agent").
pub const FIELD_TIER: &str = "tier";

/// Model identifier field (e.g., "gpt-4o-mini", "qwen2.5-3b-instruct").
pub const FIELD_MODEL: &str = "model";

/// Routing category field (e.g., "command", "chat", "agent_task").
pub const FIELD_CATEGORY: &str = "category";

/// Turn identifier field (UUID).
pub const FIELD_TURN_ID: &str = "turn_id";

/// Utterance identifier field (UUID).
pub const FIELD_UTTERANCE_ID: &str = "utterance_id";

/// Budget mode field ("normal", "thrifty", or "local_only").
pub const FIELD_BUDGET_MODE: &str = "budget_mode";

/// Error type field (for error spans).
pub const FIELD_ERROR_TYPE: &str = "error_type";

/// Helper macro for creating generator request spans.
///
/// # Example
///
/// ```rust,ignore
/// use atlas_core::generator_request_span;
///
/// let span = generator_request_span!("fast", "gpt-4o-mini");
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! generator_request_span {
    ($tier:expr, $model:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_GENERATOR_REQUEST,
            { $crate::observability::spans::FIELD_TIER } = $tier,
            { $crate::observability::spans::FIELD_MODEL } = $model,
        )
    };
    ($tier:expr, $model:expr, $turn_id:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_GENERATOR_REQUEST,
            { $crate::observability::spans::FIELD_TIER } = $tier,
            { $crate::observability::spans::FIELD_MODEL } = $model,
            { $crate::observability::spans::FIELD_TURN_ID } = $turn_id,
        )
    };
}

/// Helper macro for creating turn spans.
///
/// # Example
///
/// ```rust,ignore
/// use atlas_core::turn_span;
///
/// let span = turn_span!("a1b2c3d4-...");
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! turn_span {
    ($turn_id:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_TURN,
            { $crate::observability::spans::FIELD_TURN_ID } = $turn_id,
        )
    };
}

/// Helper macro for creating router classification spans.
///
/// # Example
///
/// ```rust,ignore
/// use atlas_core::router_classify_span;
///
/// let span = router_classify_span!("a1b2c3d4-...");
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! router_classify_span {
    ($utterance_id:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_ROUTER_CLASSIFY,
            { $crate::observability::spans::FIELD_UTTERANCE_ID } = $utterance_id,
        )
    };
}

/// Helper macro for creating ledger write spans.
///
/// # Example
///
/// ```rust,ignore
/// use atlas_core::ledger_write_span;
///
/// let span = ledger_write_span!("fast", "normal");
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! ledger_write_span {
    ($tier:expr, $budget_mode:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_LEDGER_WRITE,
            { $crate::observability::spans::FIELD_TIER } = $tier,
            { $crate::observability::spans::FIELD_BUDGET_MODE } = $budget_mode,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_constants_are_hierarchical() {
        assert!(SPAN_TURN.starts_with("atlas."));
        assert!(SPAN_ROUTER_CLASSIFY.starts_with("atlas."));
        assert!(SPAN_GENERATOR_REQUEST.starts_with("atlas."));
        assert!(SPAN_LEDGER_WRITE.starts_with("atlas."));
    }

    #[test]
    fn field_constants_are_snake_case() {
        assert_eq!(FIELD_TIER, "tier");
        assert_eq!(FIELD_MODEL, "model");
        assert_eq!(FIELD_CATEGORY, "category");
        assert_eq!(FIELD_TURN_ID, "turn_id");
        assert_eq!(FIELD_UTTERANCE_ID, "utterance_id");
        assert_eq!(FIELD_BUDGET_MODE, "budget_mode");
    }

    #[test]
    fn span_names_are_unique() {
        let spans = [
            SPAN_TURN,
            SPAN_ROUTER_CLASSIFY,
            SPAN_GENERATOR_REQUEST,
            SPAN_LEDGER_WRITE,
        ];
        let unique: std::collections::HashSet<_> = spans.iter().collect();
        assert_eq!(spans.len(), unique.len(), "Span names must be unique");
    }
}
