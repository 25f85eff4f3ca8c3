//! Read-mostly management surface over a [`ResilienceContext`].
//!
//! Everything returned here is a serializable snapshot, ready to be handed to
//! whichever transport exposes it.

use concierge_core::{
    CircuitBreakerStatus, CoreError, DeadLetterEntry, DeadLetterStats, DegradationMode,
    IdempotencyStats,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::ResilienceContext;

/// Point-in-time view of every resilience component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceStats {
    pub circuit_breakers: BTreeMap<String, CircuitBreakerStatus>,
    pub dead_letter_queues: BTreeMap<String, DeadLetterStats>,
    pub idempotency: IdempotencyStats,
    pub degradation_mode: DegradationMode,
}

/// A dead letter queue's stats plus its most recent entries, newest last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterView {
    pub stats: DeadLetterStats,
    pub messages: Vec<DeadLetterEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No open circuits and normal mode
    Healthy,
    /// At least one open circuit, or a reduced mode is active
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub open_circuits: Vec<String>,
    pub degradation_mode: DegradationMode,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl ResilienceContext {
    pub fn stats(&self) -> ResilienceStats {
        ResilienceStats {
            circuit_breakers: self.circuit_breakers(),
            dead_letter_queues: self
                .dead_letter_queues()
                .into_iter()
                .map(|queue| (queue.name().to_string(), queue.stats()))
                .collect(),
            idempotency: self.idempotency().stats(),
            degradation_mode: self.degradation().mode(),
        }
    }

    /// Status of every known breaker, keyed by name.
    pub fn circuit_breakers(&self) -> BTreeMap<String, CircuitBreakerStatus> {
        self.breakers().all_statuses()
    }

    /// Stats and the `limit` most recent entries of an existing queue.
    ///
    /// `None` uses the configured display limit. Unknown queue names return
    /// `CoreError::NotFound` rather than creating an empty queue.
    pub fn dead_letter_view(
        &self,
        name: &str,
        limit: Option<usize>,
    ) -> Result<DeadLetterView, CoreError> {
        let queue = self
            .existing_dead_letter_queue(name)
            .ok_or_else(|| CoreError::NotFound(format!("dead letter queue '{name}'")))?;
        let limit = limit.unwrap_or(self.settings().dead_letter.display_limit);

        Ok(DeadLetterView {
            stats: queue.stats(),
            messages: queue.recent(limit),
        })
    }

    /// Parses `normal`, `read_only` or `offline` and applies it.
    ///
    /// Returns the previous mode.
    pub fn set_degradation_mode_str(&self, mode: &str) -> Result<DegradationMode, CoreError> {
        let mode: DegradationMode = mode.parse()?;
        Ok(self.degradation().set_mode(mode))
    }

    pub fn health(&self) -> HealthReport {
        let open_circuits = self.breakers().open_circuits();
        let degradation_mode = self.degradation().mode();

        let status = if open_circuits.is_empty() && degradation_mode == DegradationMode::Normal {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            open_circuits,
            degradation_mode,
        }
    }
}
