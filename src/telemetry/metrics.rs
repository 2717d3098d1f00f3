//! Metric instrument factories for ticklog.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op, so recording is
//! always safe.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("ticklog")
}

/// Counter: timer firings that found the engine active.
pub fn firings() -> Counter<u64> {
    meter()
        .u64_counter("ticklog.timer.firings")
        .with_description("Number of timer firings")
        .build()
}

/// Counter: work item submissions.
/// Labels: `result` ("accepted" | "rejected" | "allocation").
pub fn submissions() -> Counter<u64> {
    meter()
        .u64_counter("ticklog.work.submissions")
        .with_description("Number of work item submissions")
        .build()
}

/// Counter: sink appends.
/// Labels: `result` ("ok" | "failed").
pub fn appends() -> Counter<u64> {
    meter()
        .u64_counter("ticklog.sink.appends")
        .with_description("Number of sink appends")
        .build()
}

/// Histogram: time spent draining the worker pool on stop.
pub fn drain_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("ticklog.pool.drain_duration_ms")
        .with_description("Worker pool drain duration in milliseconds")
        .with_unit("ms")
        .build()
}

pub(crate) fn result(value: &'static str) -> [KeyValue; 1] {
    [KeyValue::new("result", value)]
}
