//! Fault-tolerance layer for calls to unreliable dependencies.
//!
//! Circuit breakers and retry gate the call path. Dead letter queues,
//! idempotency and the degradation switch sit beside it. A
//! [`ResilienceContext`] owns one of each and is shared by the layers that
//! need them.
//!
//! # Example
//!
//! ```no_run
//! use concierge_resilience::{ResilienceContext, ResilienceSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = ResilienceContext::new(ResilienceSettings::load()?);
//! let cancel = CancellationToken::new();
//!
//! let reply = context
//!     .execute_protected("ai_provider", &cancel, || async {
//!         Ok::<_, std::io::Error>("hello")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod management;
pub mod observability;
pub mod reliability;
pub mod resilience;

pub use crate::config::{ConfigError, ResilienceSettings};
pub use context::ResilienceContext;
pub use management::{DeadLetterView, HealthReport, HealthStatus, ResilienceStats};
pub use reliability::{
    DeadLetterConfig, DeadLetterError, DeadLetterQueue, DegradationController, FallbackCatalog,
    IdempotencyConfig, IdempotencyStore, Intent,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry,
    CircuitOpenError, RetryConfig, RetryError, RetryPolicy, Retryable,
};
