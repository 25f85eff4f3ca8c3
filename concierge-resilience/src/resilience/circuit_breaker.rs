//! Circuit breaker for gating calls to a flaky dependency.
//!
//! A circuit breaker counts failures of the operations it protects and, once a
//! threshold is reached, rejects further calls without executing them until a
//! recovery timeout has passed.
//!
//! # States
//!
//! - **Closed**: calls pass through; failures accumulate, successes decay them
//! - **Open**: calls are rejected with [`CircuitOpenError`]
//! - **HalfOpen**: up to `half_open_max_calls` trial calls are admitted
//!
//! The Open → HalfOpen transition is evaluated lazily on access, inside the
//! same critical section that decides whether the call is admitted.
//!
//! # Example
//!
//! ```no_run
//! use concierge_resilience::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     recovery_timeout: Duration::from_secs(30),
//!     ..Default::default()
//! };
//!
//! let breaker = CircuitBreaker::new("ai_provider", config);
//!
//! match breaker.call(|| async { Ok::<_, std::io::Error>(42) }).await {
//!     Ok(result) => println!("Success: {}", result),
//!     Err(e) if e.is_open() => println!("Using fallback"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use concierge_core::{CircuitBreakerStatus, CircuitState, SuccessPolicy};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::retry::Retryable;
use crate::observability::metrics as resilience_metrics;

/// Configuration for circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures in the closed state before the circuit opens
    pub failure_threshold: u32,
    /// Time to wait after the last failure before probing again
    pub recovery_timeout: Duration,
    /// Trial calls admitted while half-open; this many successes close the circuit
    pub half_open_max_calls: u32,
    /// Effect of a success on the failure counter while closed
    pub success_policy: SuccessPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
            success_policy: SuccessPolicy::Decay,
        }
    }
}

/// The breaker refused the call without executing it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circuit {name} is {state}")]
pub struct CircuitOpenError {
    pub name: String,
    pub state: CircuitState,
}

/// Circuit breaker errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Call rejected, the operation was not executed
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The operation ran and failed
    #[error("Execution failed: {0}")]
    Execution(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open(_))
    }

    /// The underlying operation error, if the operation ran.
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitBreakerError::Execution(e) => Some(e),
            CircuitBreakerError::Open(_) => None,
        }
    }
}

impl<E: Retryable> Retryable for CircuitBreakerError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            // Retrying against an open circuit cannot succeed
            CircuitBreakerError::Open(_) => false,
            CircuitBreakerError::Execution(e) => e.is_retryable(),
        }
    }
}

/// Lifetime counters for a breaker.
#[derive(Debug, Default)]
struct CircuitBreakerMetrics {
    failures: AtomicU64,
    successes: AtomicU64,
    opened_count: AtomicU64,
    rejected_count: AtomicU64,
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub failures: u64,
    pub successes: u64,
    pub opened_count: u64,
    pub rejected_count: u64,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_admitted: u32,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    /// Bumped on every state change so outcomes of calls admitted under a
    /// previous state can be told apart.
    generation: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_admitted: 0,
            last_failure_at: None,
            last_failure_time: None,
            generation: 0,
        }
    }

    fn recovery_elapsed(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_failure_at {
            Some(at) => now.saturating_duration_since(at) >= timeout,
            None => true,
        }
    }
}

enum Admission {
    Allowed { generation: u64, state: CircuitState },
    Rejected(CircuitState),
}

/// Circuit breaker instance, shared between callers through an `Arc`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    metrics: CircuitBreakerMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// A `half_open_max_calls` of zero is raised to one so the circuit can
    /// always recover.
    pub fn new(name: impl Into<String>, mut config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        config.half_open_max_calls = config.half_open_max_calls.max(1);
        debug!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            "Creating circuit breaker"
        );

        Self {
            name,
            config,
            state: Mutex::new(BreakerState::new()),
            metrics: CircuitBreakerMetrics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, with a due Open → HalfOpen transition applied.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.refresh(&mut state, Instant::now());
        state.state
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Snapshot for management callers.
    ///
    /// Reports the state as it would be observed by the next call but does not
    /// write the transition back.
    pub fn status(&self) -> CircuitBreakerStatus {
        let state = self.state.lock();
        let effective = match state.state {
            CircuitState::Open
                if state.recovery_elapsed(Instant::now(), self.config.recovery_timeout) =>
            {
                CircuitState::HalfOpen
            }
            other => other,
        };

        CircuitBreakerStatus {
            name: self.name.clone(),
            state: effective,
            failure_count: state.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure: state.last_failure_time,
            recovery_timeout_seconds: self.config.recovery_timeout.as_secs_f64(),
        }
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            failures: self.metrics.failures.load(Ordering::Relaxed),
            successes: self.metrics.successes.load(Ordering::Relaxed),
            opened_count: self.metrics.opened_count.load(Ordering::Relaxed),
            rejected_count: self.metrics.rejected_count.load(Ordering::Relaxed),
        }
    }

    /// Call an operation with circuit breaker protection.
    ///
    /// Every `Err` returned by the operation counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = match self.admit() {
            Admission::Allowed { generation, state } => CallPermit {
                breaker: self,
                generation,
                state,
                settled: false,
            },
            Admission::Rejected(state) => {
                self.metrics.rejected_count.fetch_add(1, Ordering::Relaxed);
                resilience_metrics::record_breaker_rejection(&self.name);
                debug!(breaker = %self.name, %state, "Circuit breaker rejected call");
                return Err(CircuitBreakerError::Open(CircuitOpenError {
                    name: self.name.clone(),
                    state,
                }));
            }
        };

        match f().await {
            Ok(result) => {
                permit.succeed();
                Ok(result)
            }
            Err(e) => {
                permit.fail();
                Err(CircuitBreakerError::Execution(e))
            }
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        info!(breaker = %self.name, "Manually resetting circuit breaker");
        let from = state.state;
        *state = BreakerState {
            generation: state.generation + 1,
            ..BreakerState::new()
        };
        if from != CircuitState::Closed {
            resilience_metrics::record_breaker_transition(&self.name, from, CircuitState::Closed);
        }
    }

    /// Applies a due Open → HalfOpen transition. Caller holds the lock.
    fn refresh(&self, state: &mut BreakerState, now: Instant) {
        if state.state == CircuitState::Open
            && state.recovery_elapsed(now, self.config.recovery_timeout)
        {
            info!(breaker = %self.name, "Circuit breaker transitioning OPEN -> HALF_OPEN");
            self.transition(state, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        state.state = to;
        state.success_count = 0;
        state.half_open_admitted = 0;
        state.generation += 1;
        resilience_metrics::record_breaker_transition(&self.name, from, to);
    }

    fn admit(&self) -> Admission {
        let mut state = self.state.lock();
        self.refresh(&mut state, Instant::now());

        match state.state {
            CircuitState::Closed => Admission::Allowed {
                generation: state.generation,
                state: CircuitState::Closed,
            },
            CircuitState::Open => Admission::Rejected(CircuitState::Open),
            CircuitState::HalfOpen => {
                if state.half_open_admitted >= self.config.half_open_max_calls {
                    Admission::Rejected(CircuitState::HalfOpen)
                } else {
                    state.half_open_admitted += 1;
                    Admission::Allowed {
                        generation: state.generation,
                        state: CircuitState::HalfOpen,
                    }
                }
            }
        }
    }

    fn on_success(&self, generation: u64) {
        self.metrics.successes.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        match state.state {
            CircuitState::Closed if state.generation == generation => {
                state.failure_count = self.config.success_policy.apply(state.failure_count);
            }
            CircuitState::HalfOpen if state.generation == generation => {
                state.success_count += 1;
                if state.success_count >= self.config.half_open_max_calls {
                    info!(
                        breaker = %self.name,
                        successes = state.success_count,
                        "Circuit breaker closing after successful probes"
                    );
                    state.failure_count = 0;
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            // Outcome of a call admitted under an earlier state
            _ => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        match state.state {
            CircuitState::Closed if state.generation == generation => {
                state.failure_count += 1;
                state.last_failure_at = Some(Instant::now());
                state.last_failure_time = Some(Utc::now());
                if state.failure_count >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        "Circuit breaker opening after reaching failure threshold"
                    );
                    self.metrics.opened_count.fetch_add(1, Ordering::Relaxed);
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if state.generation == generation => {
                warn!(breaker = %self.name, "Circuit breaker re-opening after failed probe");
                state.failure_count += 1;
                state.last_failure_at = Some(Instant::now());
                state.last_failure_time = Some(Utc::now());
                self.metrics.opened_count.fetch_add(1, Ordering::Relaxed);
                self.transition(&mut state, CircuitState::Open);
            }
            _ => {}
        }
    }

    /// Releases a half-open slot held by a call that never reported an outcome.
    fn on_abandoned(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.state == CircuitState::HalfOpen && state.generation == generation {
            state.half_open_admitted = state.half_open_admitted.saturating_sub(1);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Admission ticket for one call. Dropping it unsettled (the caller's future
/// was cancelled mid-call) gives a half-open slot back.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    state: CircuitState,
    settled: bool,
}

impl CallPermit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.state == CircuitState::HalfOpen {
            self.breaker.on_abandoned(self.generation);
        }
    }
}

/// Convenience function to wrap an operation with a circuit breaker
pub async fn with_circuit_breaker<F, Fut, T, E>(
    breaker: &CircuitBreaker,
    f: F,
) -> Result<T, CircuitBreakerError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    breaker.call(f).await
}
