// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writer metric descriptions and recording helpers.
//!
//! Emitted through the metrics-rs facade. Without an installed recorder
//! every call is a no-op.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register descriptions for every writer metric.
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    describe_counter!("scribe_writes_total", "Write tasks finished, by store and status");
    describe_gauge!("scribe_write_queue_depth", "Write tasks waiting in a store's queue");
    describe_histogram!(
        "scribe_write_duration_seconds",
        "Time from enqueue to completion of a write task"
    );
    describe_counter!(
        "scribe_middleware_failures_total",
        "After-phase middleware failures that were logged and ignored"
    );
}

/// Record a finished task. `status` is one of `ok`, `error` or `skipped`.
pub(crate) fn record_write(store: &str, status: &'static str) {
    metrics::counter!("scribe_writes_total", "store" => store.to_string(), "status" => status)
        .increment(1);
}

pub(crate) fn set_queue_depth(store: &str, depth: usize) {
    metrics::gauge!("scribe_write_queue_depth", "store" => store.to_string()).set(depth as f64);
}

pub(crate) fn record_duration(store: &str, elapsed: Duration) {
    metrics::histogram!("scribe_write_duration_seconds", "store" => store.to_string())
        .record(elapsed.as_secs_f64());
}

pub(crate) fn record_middleware_failure(store: &str, middleware: &str) {
    metrics::counter!(
        "scribe_middleware_failures_total",
        "store" => store.to_string(),
        "middleware" => middleware.to_string()
    )
    .increment(1);
}
