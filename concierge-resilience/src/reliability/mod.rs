//! Reliability features that sit beside the call path.
//!
//! - **Dead Letter Queue**: bounded holding area for terminal failures, with
//!   manual replay
//! - **Idempotency**: at-most-once execution per key within a TTL window
//! - **Degradation**: process-wide NORMAL / READ_ONLY / OFFLINE switch
//! - **Fallback**: canned replies used while a dependency is unavailable

pub mod dead_letter;
pub mod degradation;
pub mod fallback;
pub mod idempotency;

pub use dead_letter::{DeadLetterConfig, DeadLetterError, DeadLetterQueue};
pub use degradation::DegradationController;
pub use fallback::{FallbackCatalog, Intent};
pub use idempotency::{IdempotencyConfig, IdempotencyRecord, IdempotencyStore};
