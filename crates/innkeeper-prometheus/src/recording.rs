// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. With no recorder installed every call is a
//! no-op, so the queue crates record unconditionally.

use innkeeper_core::{QueueStats, QueueStatus};
use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Innkeeper metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("innkeeper_messages_enqueued_total", "Messages accepted into the queue");
    describe_counter!("innkeeper_messages_delivered_total", "Messages accepted by the provider");
    describe_counter!(
        "innkeeper_messages_failed_total",
        "Messages that reached the failed state"
    );
    describe_counter!(
        "innkeeper_messages_retried_total",
        "Failed send attempts rescheduled with backoff"
    );
    describe_counter!(
        "innkeeper_messages_deferred_total",
        "Sends pushed back by the per-recipient rate limit"
    );
    describe_counter!(
        "innkeeper_claims_released_total",
        "Processing claims returned to pending after their lease expired"
    );
    describe_gauge!("innkeeper_queue_items", "Queue items by status");
    describe_histogram!(
        "innkeeper_send_latency_seconds",
        "Provider send round-trip latency in seconds"
    );
    describe_gauge!("innkeeper_memory_heap_bytes", "Heap bytes allocated (jemalloc)");
    describe_gauge!("innkeeper_memory_resident_bytes", "Resident bytes (jemalloc)");
}

/// Record an accepted enqueue.
pub fn record_enqueued(priority: &str) {
    metrics::counter!("innkeeper_messages_enqueued_total", "priority" => priority.to_string())
        .increment(1);
}

/// Record a successful delivery.
pub fn record_delivered() {
    metrics::counter!("innkeeper_messages_delivered_total").increment(1);
}

/// Record a terminal failure. `reason` is `permanent` or `exhausted`.
pub fn record_failed(reason: &'static str) {
    metrics::counter!("innkeeper_messages_failed_total", "reason" => reason).increment(1);
}

/// Record a transient failure that will be retried.
pub fn record_retried() {
    metrics::counter!("innkeeper_messages_retried_total").increment(1);
}

/// Record a rate-limit deferral.
pub fn record_deferred() {
    metrics::counter!("innkeeper_messages_deferred_total").increment(1);
}

/// Record claims released by the lease reaper.
pub fn record_claims_released(count: u64) {
    metrics::counter!("innkeeper_claims_released_total").increment(count);
}

/// Record provider send latency.
pub fn record_send_latency(seconds: f64) {
    metrics::histogram!("innkeeper_send_latency_seconds").record(seconds);
}

/// Publish per-status queue gauges.
pub fn set_queue_stats(stats: &QueueStats) {
    for status in [
        QueueStatus::Pending,
        QueueStatus::Processing,
        QueueStatus::Completed,
        QueueStatus::Failed,
    ] {
        metrics::gauge!("innkeeper_queue_items", "status" => status.to_string())
            .set(stats.get(status) as f64);
    }
}

pub fn set_memory_heap(bytes: f64) {
    metrics::gauge!("innkeeper_memory_heap_bytes").set(bytes);
}

pub fn set_memory_resident(bytes: f64) {
    metrics::gauge!("innkeeper_memory_resident_bytes").set(bytes);
}
