//! Metrics definitions for harness runs.
//!
//! All metrics follow Prometheus naming conventions:
//! - `e2e_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `step`: the seven scenario step names
//! - `condition`: one per condition the scenario waits on
//! - `status` / `result` / `trigger`: small fixed sets

use metrics::{counter, histogram};
use std::time::Duration;

/// Record the outcome of one scenario step.
///
/// Metrics: `e2e_step_duration_seconds`, `e2e_step_total`
/// Labels: `step`, `status` (passed, failed, interrupted)
pub fn record_step(step: &'static str, status: &'static str, duration: Duration) {
    histogram!("e2e_step_duration_seconds", "step" => step, "status" => status)
        .record(duration.as_secs_f64());

    counter!("e2e_step_total", "step" => step, "status" => status).increment(1);
}

/// Record how many attempts a wait took and how it ended.
///
/// Metric: `e2e_poll_attempts_total`
/// Labels: `condition`, `result` (satisfied, timeout, predicate_error, observation_error)
pub fn record_poll(condition: &'static str, result: &'static str, attempts: u32) {
    counter!("e2e_poll_attempts_total", "condition" => condition, "result" => result)
        .increment(u64::from(attempts));
}

/// Record a namespace teardown.
///
/// Metric: `e2e_teardown_total`
/// Labels: `trigger` (passed, failed, interrupted, explicit), `status` (deleted, absent,
/// retained, error)
pub fn record_teardown(trigger: &'static str, status: &'static str) {
    counter!("e2e_teardown_total", "trigger" => trigger, "status" => status).increment(1);
}
