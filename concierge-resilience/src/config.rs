//! Settings for the resilience layer.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. `config/resilience.{toml,yaml,json}` (optional)
//! 3. `config/resilience.local.{toml,yaml,json}` (optional)
//! 4. environment variables prefixed `CONCIERGE`, `__` separating sections,
//!    e.g. `CONCIERGE__CIRCUIT_BREAKER__FAILURE_THRESHOLD=10`

use concierge_core::SuccessPolicy;
use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::observability::LogConfig;
use crate::reliability::{DeadLetterConfig, IdempotencyConfig};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

pub const ENV_PREFIX: &str = "CONCIERGE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load resilience configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid resilience configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid resilience configuration: {0}")]
    Constraint(String),
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ResilienceSettings {
    #[validate(nested)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[validate(nested)]
    pub retry: RetrySettings,
    #[validate(nested)]
    pub dead_letter: DeadLetterSettings,
    #[validate(nested)]
    pub idempotency: IdempotencySettings,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    #[validate(range(min = 1))]
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub half_open_max_calls: u32,
    pub success_policy: SuccessPolicy,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            half_open_max_calls: 3,
            success_policy: SuccessPolicy::Decay,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            half_open_max_calls: self.half_open_max_calls,
            success_policy: self.success_policy,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RetrySettings {
    #[validate(range(max = 20))]
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    #[validate(range(min = 1.0))]
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct DeadLetterSettings {
    #[validate(range(min = 1))]
    pub max_size: usize,
    pub max_replay_attempts: Option<u32>,
    /// Entries returned by management views
    #[validate(range(min = 1))]
    pub display_limit: usize,
}

impl Default for DeadLetterSettings {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_replay_attempts: None,
            display_limit: 50,
        }
    }
}

impl DeadLetterSettings {
    pub fn to_config(&self) -> DeadLetterConfig {
        DeadLetterConfig {
            max_size: self.max_size,
            max_replay_attempts: self.max_replay_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct IdempotencySettings {
    #[validate(range(min = 1))]
    pub ttl_secs: u64,
    #[validate(range(min = 10))]
    pub capacity: usize,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            capacity: 10_000,
        }
    }
}

impl IdempotencySettings {
    pub fn to_config(&self) -> IdempotencyConfig {
        IdempotencyConfig {
            ttl: Duration::from_secs(self.ttl_secs),
            capacity: self.capacity,
        }
    }
}

impl ResilienceSettings {
    /// Loads settings from `config/` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_dir("config")
    }

    /// Loads settings from `dir/resilience*` files and the environment.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let settings: Self = ConfigLoader::builder()
            .add_source(File::from(dir.join("resilience")).required(false))
            .add_source(File::from(dir.join("resilience.local")).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    /// Validates field ranges and cross-field constraints.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Constraint(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}
