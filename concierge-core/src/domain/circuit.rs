use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Too many failures, calls are rejected without being executed
    Open,
    /// Recovery probe: a bounded number of trial calls are admitted
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a success in the closed state affects the failure counter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Each success forgives one failure.
    #[default]
    Decay,
    /// Any success clears the failure streak.
    Reset,
}

impl SuccessPolicy {
    pub fn apply(&self, failure_count: u32) -> u32 {
        match self {
            SuccessPolicy::Decay => failure_count.saturating_sub(1),
            SuccessPolicy::Reset => 0,
        }
    }
}

/// Point-in-time snapshot of a circuit breaker, as exposed to management callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub recovery_timeout_seconds: f64,
}

impl CircuitBreakerStatus {
    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_never_goes_negative() {
        assert_eq!(SuccessPolicy::Decay.apply(0), 0);
        assert_eq!(SuccessPolicy::Decay.apply(3), 2);
        assert_eq!(SuccessPolicy::Reset.apply(3), 0);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"half_open\"");
    }
}
