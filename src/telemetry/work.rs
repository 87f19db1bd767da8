//! Drain span helpers.

use crate::model::WorkItemId;
use tracing::Span;

/// Span covering one fetch-execute-delete pass over the queue.
pub fn start_cycle_span() -> Span {
    tracing::info_span!("drain.cycle")
}

/// Span for a single queued row.
///
/// The `work.outcome` field is declared empty and filled by
/// [`record_outcome`].
pub fn start_work_span(id: &WorkItemId) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.id" = %id,
        "work.outcome" = tracing::field::Empty,
    )
}

/// Record whether the row's statement succeeded ("ok") or failed ("error").
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("work.outcome", outcome);
}
