//! Retry with exponential backoff and jitter.
//!
//! A [`RetryPolicy`] re-invokes an operation after retryable failures, up to
//! `max_retries` additional attempts. The wait between attempts is
//! `min(base_delay * exponential_base^attempt, max_delay)`, scaled by a random
//! factor in `[0.5, 1.5]` when jitter is enabled. Waits are cancellable through
//! a [`CancellationToken`].
//!
//! # Example
//!
//! ```no_run
//! use concierge_resilience::resilience::retry::{RetryConfig, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::new(RetryConfig {
//!     max_retries: 5,
//!     base_delay: Duration::from_millis(100),
//!     ..Default::default()
//! });
//!
//! let cancel = CancellationToken::new();
//! let result = policy
//!     .execute_with(&cancel, |_: &std::io::Error| true, || async {
//!         Ok::<_, std::io::Error>(42)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::observability::metrics as resilience_metrics;

/// Classifies failures as transient (worth retrying) or fatal.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind::*;
        matches!(
            self.kind(),
            TimedOut | Interrupted | WouldBlock | ConnectionReset | ConnectionAborted
                | ConnectionRefused | BrokenPipe | UnexpectedEof
        )
    }
}

impl Retryable for anyhow::Error {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap applied before jitter
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub exponential_base: f64,
    /// Scale delays by a random factor in `[0.5, 1.5]`
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("Operation failed after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },

    /// The operation failed with an error classified as not retryable
    #[error("Operation failed with non-retryable error: {error}")]
    Fatal { attempts: u32, error: E },

    /// The caller cancelled while waiting between attempts
    #[error("Operation cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last_error: Option<E> },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Fatal { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The last error the operation produced, if it ran at all.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Exhausted { error, .. } | RetryError::Fatal { error, .. } => Some(error),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { error, .. } | RetryError::Fatal { error, .. } => Some(error),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }
}

/// Stateless retry policy; each `execute` call has its own attempt counter.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Backoff before retry number `attempt + 1`, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.config.base_delay.as_secs_f64() * self.config.exponential_base.powi(exponent);
        let capped = secs.min(self.config.max_delay.as_secs_f64());
        // Rounding near Duration::MAX can overshoot, so the cap wins on overflow
        Duration::try_from_secs_f64(capped)
            .map(|delay| delay.min(self.config.max_delay))
            .unwrap_or(self.config.max_delay)
    }

    /// Backoff before retry number `attempt + 1`, jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if self.config.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.5);
            scale(delay, factor)
        } else {
            delay
        }
    }

    /// Upper bound on the total time spent waiting for `max_retries` retries.
    pub fn max_total_delay(&self) -> Duration {
        let factor = if self.config.jitter { 1.5 } else { 1.0 };
        (0..self.config.max_retries)
            .map(|attempt| scale(self.base_delay_for(attempt), factor))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Executes `f`, retrying failures the error type classifies as retryable.
    pub async fn execute<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        self.execute_with(cancel, |e: &E| e.is_retryable(), f).await
    }

    /// Executes `f`, retrying failures for which `is_retryable` returns true.
    pub async fn execute_with<F, Fut, T, E, P>(
        &self,
        cancel: &CancellationToken,
        is_retryable: P,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error: None,
                });
            }

            debug!(attempt = attempt + 1, max = self.config.max_retries + 1, "Retry attempt");
            resilience_metrics::record_retry_attempt();

            let error = match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            let attempts = attempt + 1;

            if !is_retryable(&error) {
                warn!(attempts, error = %error, "Error is not retryable, giving up");
                return Err(RetryError::Fatal { attempts, error });
            }

            if attempt >= self.config.max_retries {
                warn!(attempts, error = %error, "All retries exhausted");
                resilience_metrics::record_retry_exhausted();
                return Err(RetryError::Exhausted { attempts, error });
            }

            let delay = self.delay_for(attempt);
            debug!(
                retry = attempts,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after delay"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(attempts, "Retry wait cancelled");
                    return Err(RetryError::Cancelled {
                        attempts,
                        last_error: Some(error),
                    });
                }
                _ = sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

/// `delay * factor`, saturating at `Duration::MAX`.
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Retry an operation with the given policy and no external cancellation.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    policy.execute(&CancellationToken::new(), f).await
}
