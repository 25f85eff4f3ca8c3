//! Prometheus metrics for the resilience layer.
//!
//! Recording goes through the `metrics` facade, so every `record_*` helper is
//! a no-op until a recorder is installed. [`init_metrics`] installs the
//! Prometheus recorder once per process and registers metric descriptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use concierge_resilience::observability::metrics::{init_metrics, render_metrics};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_metrics()?;
//! let exposition = render_metrics()?;
//! # Ok(())
//! # }
//! ```

use concierge_core::{CircuitState, DegradationMode};
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub const BREAKER_TRANSITIONS: &str = "circuit_breaker_transitions_total";
pub const BREAKER_REJECTIONS: &str = "circuit_breaker_rejections_total";
pub const RETRY_ATTEMPTS: &str = "retry_attempts_total";
pub const RETRY_EXHAUSTED: &str = "retry_exhausted_total";
pub const DEAD_LETTER_ENTRIES: &str = "dead_letter_entries_total";
pub const DEAD_LETTER_EVICTIONS: &str = "dead_letter_evictions_total";
pub const DEAD_LETTER_REPLAYS: &str = "dead_letter_replays_total";
pub const IDEMPOTENCY_LOOKUPS: &str = "idempotency_lookups_total";
pub const DEGRADATION_MODE: &str = "degradation_mode";

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Errors that can occur during metrics operations
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to install metrics exporter: {0}")]
    Installation(String),

    #[error("Metrics not initialized")]
    NotInitialized,
}

/// Installs the Prometheus recorder.
///
/// Subsequent calls return Ok without re-initializing.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn init_metrics() -> Result<(), MetricsError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Installation("Handle already set".to_string()))?;

    register_metric_descriptions();
    Ok(())
}

/// Prometheus text exposition of everything recorded so far.
pub fn render_metrics() -> Result<String, MetricsError> {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .ok_or(MetricsError::NotInitialized)
}

fn register_metric_descriptions() {
    describe_counter!(
        BREAKER_TRANSITIONS,
        Unit::Count,
        "Circuit breaker state transitions"
    );
    describe_counter!(
        BREAKER_REJECTIONS,
        Unit::Count,
        "Calls rejected by an open or saturated half-open circuit"
    );
    describe_counter!(RETRY_ATTEMPTS, Unit::Count, "Operation attempts made under a retry policy");
    describe_counter!(RETRY_EXHAUSTED, Unit::Count, "Operations that failed on every retry attempt");
    describe_counter!(DEAD_LETTER_ENTRIES, Unit::Count, "Entries added to dead letter queues");
    describe_counter!(
        DEAD_LETTER_EVICTIONS,
        Unit::Count,
        "Dead letter entries dropped because the queue was full"
    );
    describe_counter!(DEAD_LETTER_REPLAYS, Unit::Count, "Manual dead letter replays by outcome");
    describe_counter!(IDEMPOTENCY_LOOKUPS, Unit::Count, "Idempotency executions by hit or miss");
    describe_gauge!(
        DEGRADATION_MODE,
        Unit::Count,
        "Current degradation mode (0 normal, 1 read_only, 2 offline)"
    );
}

pub fn record_breaker_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    counter!(
        BREAKER_TRANSITIONS,
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_breaker_rejection(breaker: &str) {
    counter!(BREAKER_REJECTIONS, "breaker" => breaker.to_string()).increment(1);
}

pub fn record_retry_attempt() {
    counter!(RETRY_ATTEMPTS).increment(1);
}

pub fn record_retry_exhausted() {
    counter!(RETRY_EXHAUSTED).increment(1);
}

pub fn record_dead_letter(queue: &str) {
    counter!(DEAD_LETTER_ENTRIES, "queue" => queue.to_string()).increment(1);
}

pub fn record_dead_letter_evictions(queue: &str, evicted: u64) {
    counter!(DEAD_LETTER_EVICTIONS, "queue" => queue.to_string()).increment(evicted);
}

pub fn record_dead_letter_replay(queue: &str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    counter!(DEAD_LETTER_REPLAYS, "queue" => queue.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_idempotency_lookup(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(IDEMPOTENCY_LOOKUPS, "outcome" => outcome).increment(1);
}

pub fn record_degradation_mode(mode: DegradationMode) {
    gauge!(DEGRADATION_MODE).set(f64::from(mode.as_u8()));
}
