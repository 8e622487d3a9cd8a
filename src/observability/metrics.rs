//! Metrics collection.
//!
//! # Metrics
//! - `resilience_calls_total` (counter): completed calls by operation, outcome
//! - `resilience_rejections_total` (counter): admission rejections by operation, reason
//! - `resilience_retries_total` (counter): retry attempts by operation
//! - `resilience_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `resilience_state_transitions_total` (counter): breaker transitions by target state
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; no exporter is installed here
//! - Low-overhead metric updates (no-ops until the host installs a recorder)

use crate::error::ErrorKind;
use crate::resilience::circuit_breaker::CircuitState;

/// Record the outcome of a call that went through the executor.
pub fn record_call(operation: &str, outcome: Result<(), ErrorKind>) {
    let outcome = match outcome {
        Ok(()) => "success",
        Err(kind) => kind.as_str(),
    };
    metrics::counter!(
        "resilience_calls_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a call rejected before it ran.
pub fn record_rejection(operation: &str, reason: ErrorKind) {
    metrics::counter!(
        "resilience_rejections_total",
        "operation" => operation.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record one retry attempt (attempts after the first).
pub fn record_retry(operation: &str) {
    metrics::counter!("resilience_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a breaker transition and the new state gauge.
pub fn record_state_transition(breaker: &str, to: CircuitState) {
    metrics::counter!(
        "resilience_state_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    metrics::gauge!("resilience_circuit_state", "breaker" => breaker.to_string())
        .set(to as u8 as f64);
}
