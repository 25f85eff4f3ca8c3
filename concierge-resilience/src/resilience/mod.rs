//! Call-gating resilience patterns.
//!
//! - **Circuit Breaker**: stops calling a failing dependency and probes it again
//!   after a recovery timeout
//! - **Registry**: one shared breaker per dependency name
//! - **Retry**: absorbs transient failures with exponential backoff and jitter
//!
//! # Example
//!
//! ```no_run
//! use concierge_resilience::resilience::{CircuitBreakerRegistry, RetryConfig, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CircuitBreakerRegistry::default();
//! let breaker = registry.get_or_create("ai_provider", 5, Duration::from_secs(30));
//! let policy = RetryPolicy::new(RetryConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let result = policy
//!     .execute(&cancel, || breaker.call(|| async { Ok::<_, std::io::Error>(42) }))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    with_circuit_breaker, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
    CircuitBreakerStats, CircuitOpenError,
};
pub use registry::CircuitBreakerRegistry;
pub use retry::{retry, RetryConfig, RetryError, RetryPolicy, Retryable};
