//! Process-wide resilience context.
//!
//! [`ResilienceContext`] owns one instance of every resilience component and is
//! meant to be created once at startup and shared behind an `Arc`.

use concierge_core::DegradationMode;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ResilienceSettings;
use crate::reliability::{
    DeadLetterQueue, DegradationController, FallbackCatalog, IdempotencyStore,
};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, RetryError, RetryPolicy,
    Retryable,
};

/// Shared registry of breakers, dead letter queues, the idempotency store and
/// the degradation switch.
#[derive(Debug)]
pub struct ResilienceContext {
    settings: ResilienceSettings,
    breakers: CircuitBreakerRegistry,
    dead_letter_queues: DashMap<String, Arc<DeadLetterQueue>>,
    idempotency: IdempotencyStore<Value>,
    degradation: DegradationController,
    fallbacks: FallbackCatalog,
    retry_policy: RetryPolicy,
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new(ResilienceSettings::default())
    }
}

impl ResilienceContext {
    pub fn new(settings: ResilienceSettings) -> Self {
        info!(
            failure_threshold = settings.circuit_breaker.failure_threshold,
            max_retries = settings.retry.max_retries,
            dead_letter_max_size = settings.dead_letter.max_size,
            "Initializing resilience context"
        );

        Self {
            breakers: CircuitBreakerRegistry::new(settings.circuit_breaker.to_config()),
            dead_letter_queues: DashMap::new(),
            idempotency: IdempotencyStore::new(settings.idempotency.to_config()),
            degradation: DegradationController::new(DegradationMode::Normal),
            fallbacks: FallbackCatalog::default(),
            retry_policy: RetryPolicy::new(settings.retry.to_config()),
            settings,
        }
    }

    /// Replaces the fallback templates.
    pub fn with_fallbacks(mut self, fallbacks: FallbackCatalog) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn settings(&self) -> &ResilienceSettings {
        &self.settings
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Breaker for `name`, created with the configured defaults on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers.breaker(name)
    }

    /// Dead letter queue for `name`, created with the configured limits on first use.
    pub fn dead_letter_queue(&self, name: &str) -> Arc<DeadLetterQueue> {
        if let Some(queue) = self.dead_letter_queues.get(name) {
            return Arc::clone(queue.value());
        }

        let queue = self
            .dead_letter_queues
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(queue = %name, "Creating dead letter queue");
                Arc::new(DeadLetterQueue::new(name, self.settings.dead_letter.to_config()))
            });
        Arc::clone(queue.value())
    }

    /// All dead letter queues, ordered by name.
    pub fn dead_letter_queues(&self) -> Vec<Arc<DeadLetterQueue>> {
        let mut queues: Vec<_> = self
            .dead_letter_queues
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        queues.sort_by(|a, b| a.name().cmp(b.name()));
        queues
    }

    pub(crate) fn existing_dead_letter_queue(&self, name: &str) -> Option<Arc<DeadLetterQueue>> {
        self.dead_letter_queues
            .get(name)
            .map(|queue| Arc::clone(queue.value()))
    }

    pub fn idempotency(&self) -> &IdempotencyStore<Value> {
        &self.idempotency
    }

    pub fn degradation(&self) -> &DegradationController {
        &self.degradation
    }

    pub fn fallbacks(&self) -> &FallbackCatalog {
        &self.fallbacks
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Runs `op` through the named breaker, retrying retryable failures.
    ///
    /// Each attempt is a separate breaker call, so every failed attempt counts
    /// toward the threshold. Once the circuit opens the remaining attempts stop
    /// immediately because an open circuit is never retried.
    pub async fn execute_protected<F, Fut, T, E>(
        &self,
        breaker: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<CircuitBreakerError<E>>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let breaker = self.breaker(breaker);
        self.retry_policy
            .execute(cancel, || {
                let attempt = op();
                let breaker = Arc::clone(&breaker);
                async move { breaker.call(move || attempt).await }
            })
            .await
    }

    /// Like [`execute_protected`](Self::execute_protected), but parks `payload`
    /// in the `queue` dead letter queue when the call fails terminally.
    ///
    /// Cancelled calls are not dead-lettered.
    pub async fn execute_or_dead_letter<F, Fut, T, E>(
        &self,
        breaker: &str,
        queue: &str,
        payload: Value,
        metadata: BTreeMap<String, Value>,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, RetryError<CircuitBreakerError<E>>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let err = match self.execute_protected(breaker, cancel, op).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        if err.is_cancelled() {
            return Err(err);
        }

        let error = match err.last_error() {
            Some(CircuitBreakerError::Execution(e)) => e.to_string(),
            Some(open) => open.to_string(),
            None => err.to_string(),
        };
        let id = self
            .dead_letter_queue(queue)
            .add(payload, error, Some(breaker.to_string()), metadata);
        warn!(
            breaker = %breaker,
            queue = %queue,
            entry_id = %id,
            attempts = err.attempts(),
            "Protected call failed, payload dead-lettered"
        );
        Err(err)
    }
}
