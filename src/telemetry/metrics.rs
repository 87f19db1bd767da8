//! Metric instrument factories for queryd.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"queryd"` meter; without an
//! OTLP endpoint they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("queryd")
}

/// Counter: queue-table operations.
/// Labels: `operation` ("fetch" | "execute" | "delete" | "submit"),
/// `result` ("ok" | "error").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("queryd.queue.operations")
        .with_description("Number of queue table operations")
        .build()
}

/// Counter: rows returned by fetches.
pub fn items_fetched() -> Counter<u64> {
    meter()
        .u64_counter("queryd.queue.fetched")
        .with_description("Number of queued rows fetched")
        .build()
}

/// Histogram: wall time of one drain cycle, pause excluded.
pub fn cycle_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("queryd.cycle.duration_ms")
        .with_description("Drain cycle duration in milliseconds")
        .with_unit("ms")
        .build()
}
