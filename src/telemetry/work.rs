//! Span helpers for firings and appends.

use std::path::Path;
use tracing::Span;

/// Span covering one timer firing, from sequence issue to submission.
pub fn start_firing_span(sequence: u32) -> Span {
    tracing::info_span!("ticklog.fire", "work.sequence" = sequence)
}

/// Span covering one sink append performed by a worker.
///
/// `work.outcome` is declared empty and filled in when the append returns.
pub fn start_append_span(sequence: u32, destination: &Path) -> Span {
    tracing::info_span!(
        "ticklog.append",
        "work.sequence" = sequence,
        "work.destination" = %destination.display(),
        "work.outcome" = tracing::field::Empty,
    )
}

/// Record an engine state transition as an event on `span`.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
