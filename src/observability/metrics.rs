//! Metrics emitted by the validator.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op. Provides metrics for:
//! - validate calls by kind and outcome
//! - validator compilations and their latency
//! - routing misses by error code

use metrics::{counter, gauge, histogram};

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record one validate call.
///
/// `kind` is `request` or `response`; `outcome` is `valid`, `invalid` or
/// `runtime_exception`.
pub fn record_validation(kind: &'static str, outcome: &'static str, issues: usize, duration_secs: f64) {
    counter!("live_validator_validations_total", "kind" => kind, "outcome" => outcome).increment(1);
    histogram!("live_validator_validation_duration_seconds", "kind" => kind).record(duration_secs);
    if issues > 0 {
        counter!("live_validator_issues_total", "kind" => kind).increment(issues as u64);
    }
}

/// Record one validator compilation.
pub fn record_compilation(kind: &'static str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "error" };
    counter!("live_validator_compilations_total", "kind" => kind, "outcome" => outcome).increment(1);
    histogram!("live_validator_compile_duration_seconds", "kind" => kind).record(duration_secs);
}

/// Record a request that could not be routed to an operation.
pub fn record_route_miss(code: &'static str) {
    counter!("live_validator_route_misses_total", "code" => code).increment(1);
}

/// Record the size of the operation cache after initialize.
pub fn set_cached_operations(count: usize) {
    gauge!("live_validator_cached_operations").set(count as f64);
}
