//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Producer fetch/replicate throughput
//! - Queue depth and producer wait time
//! - Apply throughput and retries
//! - Sync-target selection and vetoes
//! - Rollback activity
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `opsync_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state,
//! histograms track distributions.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record one entry replicated into the local oplog.
pub fn record_entry_replicated(host: &str) {
    counter!("opsync_entries_replicated_total", "host" => host.to_string()).increment(1);
}

/// Record one entry applied to local state.
pub fn record_entry_applied() {
    counter!("opsync_entries_applied_total").increment(1);
}

/// Record an apply failure (the entry will be retried).
pub fn record_apply_retry() {
    counter!("opsync_apply_retries_total").increment(1);
}

/// Current queue depth.
pub fn set_queue_depth(len: usize) {
    gauge!("opsync_queue_depth").set(len as f64);
}

/// Time spent writing and enqueueing one entry.
pub fn record_produce_latency(duration: Duration) {
    histogram!("opsync_produce_duration_seconds").record(duration.as_secs_f64());
}

/// Record a sync-target selection.
pub fn record_target_selected(host: &str) {
    counter!("opsync_target_selected_total", "host" => host.to_string()).increment(1);
}

/// Record a candidate veto.
pub fn record_target_veto(host: &str, reason: &'static str) {
    counter!("opsync_target_vetoes_total", "host" => host.to_string(), "reason" => reason)
        .increment(1);
}

/// Record that this node went stale relative to every candidate.
pub fn record_went_stale() {
    counter!("opsync_went_stale_total").increment(1);
}

/// Record a rollback attempt.
pub fn record_rollback_started() {
    counter!("opsync_rollbacks_started_total").increment(1);
}

/// Record a completed rollback with the number of entries undone.
pub fn record_rollback_completed(entries_undone: u64) {
    counter!("opsync_rollbacks_completed_total").increment(1);
    counter!("opsync_rollback_entries_undone_total").increment(entries_undone);
}

/// Record an uncaught producer error (the worker sleeps and resumes).
pub fn record_producer_error() {
    counter!("opsync_producer_errors_total").increment(1);
}

/// Current pipeline run state ("paused", "running", "exited").
pub fn set_pipeline_state(state: &'static str) {
    gauge!("opsync_pipeline_running", "state" => state).set(1.0);
}
