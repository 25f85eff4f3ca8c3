//! Named circuit breakers shared across the process.

use concierge_core::CircuitBreakerStatus;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// Get-or-create map of breakers keyed by dependency name.
///
/// The configuration passed on first use is kept for the lifetime of the
/// breaker; later calls with a different configuration get the existing one.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &CircuitBreakerConfig {
        &self.defaults
    }

    /// Breaker for `name`, created with the registry defaults if missing.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.defaults.clone())
    }

    pub fn get_or_create(
        &self,
        name: &str,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> Arc<CircuitBreaker> {
        self.get_or_create_with(
            name,
            CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout,
                ..self.defaults.clone()
            },
        )
    }

    pub fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        let entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)));
        Arc::clone(entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    pub fn all_statuses(&self) -> BTreeMap<String, CircuitBreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// Names of breakers currently rejecting calls.
    pub fn open_circuits(&self) -> Vec<String> {
        self.all_statuses()
            .into_values()
            .filter(|status| status.is_open())
            .map(|status| status.name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
