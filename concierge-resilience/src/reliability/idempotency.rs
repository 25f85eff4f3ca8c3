//! Idempotency store with TTL expiry and bulk eviction.
//!
//! Each key owns a slot holding a [`OnceCell`]. The first caller to reach an
//! empty slot runs the operation; concurrent callers with the same key wait on
//! the same cell and receive the stored result instead of executing again.
//! If the operation fails nothing is stored and the next waiter gets its turn.
//!
//! # Examples
//!
//! ```no_run
//! use concierge_resilience::reliability::idempotency::{IdempotencyConfig, IdempotencyStore};
//! use serde_json::{json, Value};
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let store: IdempotencyStore<Value> = IdempotencyStore::new(IdempotencyConfig::default());
//!
//! let booking = store
//!     .execute("create_booking:guest=42", || async { Ok::<_, std::io::Error>(json!({"id": 1})) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use concierge_core::IdempotencyStats;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::observability::metrics as resilience_metrics;

/// Results are remembered for 24 hours by default
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(86_400);

/// Soft cap on stored records
pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 10_000;

/// Configuration for the idempotency store.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyConfig {
    /// How long a stored result stays valid
    pub ttl: Duration,
    /// Record count above which the oldest tenth is evicted
    pub capacity: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_IDEMPOTENCY_TTL,
            capacity: DEFAULT_IDEMPOTENCY_CAPACITY,
        }
    }
}

/// A stored result.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord<T> {
    pub result: T,
    pub created_at: DateTime<Utc>,
    stored_at: Instant,
}

impl<T> IdempotencyRecord<T> {
    fn new(result: T) -> Self {
        Self {
            result,
            created_at: Utc::now(),
            stored_at: Instant::now(),
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) > ttl
    }
}

struct Slot<T> {
    cell: OnceCell<IdempotencyRecord<T>>,
}

impl<T> Slot<T> {
    fn empty() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    fn filled(record: IdempotencyRecord<T>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(record)),
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.cell.get().is_some_and(|r| r.is_expired(now, ttl))
    }

    fn stored_at(&self) -> Option<Instant> {
        self.cell.get().map(|r| r.stored_at)
    }
}

pub struct IdempotencyStore<T> {
    slots: DashMap<String, Arc<Slot<T>>>,
    config: IdempotencyConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> IdempotencyStore<T>
where
    T: Clone + Send + Sync,
{
    pub fn new(config: IdempotencyConfig) -> Self {
        Self {
            slots: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// The stored result for `key`, unless absent or expired.
    pub fn check(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;

        if slot.is_expired(now, self.config.ttl) {
            self.slots
                .remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
            return None;
        }

        let result = slot.cell.get().map(|record| record.result.clone())?;
        self.record_hit(key);
        Some(result)
    }

    /// Stores `result` under `key`, replacing any previous record.
    pub fn store(&self, key: &str, result: T) {
        self.slots.insert(
            key.to_string(),
            Arc::new(Slot::filled(IdempotencyRecord::new(result))),
        );
        self.enforce_capacity();
    }

    /// Runs `operation` at most once per key within the TTL window.
    ///
    /// Concurrent callers with the same key wait for the first caller and
    /// receive its result. Errors are returned to the caller that ran the
    /// operation and are not cached.
    pub async fn execute<F, Fut, E>(&self, key: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot_for(key);
        let executed = AtomicBool::new(false);

        let init = slot
            .cell
            .get_or_try_init(|| async {
                executed.store(true, Ordering::Relaxed);
                operation().await.map(IdempotencyRecord::new)
            })
            .await;
        let result = match init {
            Ok(record) => record.result.clone(),
            Err(e) => {
                // Drop the empty slot unless another caller is waiting on it
                self.slots.remove_if(key, |_, current| {
                    Arc::ptr_eq(current, &slot)
                        && !current.cell.initialized()
                        && Arc::strong_count(current) == 2
                });
                return Err(e);
            }
        };

        if executed.load(Ordering::Relaxed) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            resilience_metrics::record_idempotency_lookup(false);
            self.enforce_capacity();
        } else {
            self.record_hit(key);
        }

        Ok(result)
    }

    fn record_hit(&self, key: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        resilience_metrics::record_idempotency_lookup(true);
        debug!(key, "Idempotent hit, returning stored result");
    }

    /// Current slot for `key`; a fresh one replaces an expired record.
    fn slot_for(&self, key: &str) -> Arc<Slot<T>> {
        let now = Instant::now();
        let mut entry = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Slot::empty()));

        if entry.is_expired(now, self.config.ttl) {
            *entry = Arc::new(Slot::empty());
        }

        Arc::clone(entry.value())
    }

    /// Evicts the oldest tenth of the stored records once over capacity.
    fn enforce_capacity(&self) {
        // Empty slots belong to in-flight calls and never count toward capacity
        let mut stored: Vec<(String, Instant)> = self
            .slots
            .iter()
            .filter_map(|entry| entry.value().stored_at().map(|at| (entry.key().clone(), at)))
            .collect();
        if stored.len() <= self.config.capacity {
            return;
        }
        stored.sort_by_key(|(_, at)| *at);

        let evict = (self.config.capacity / 10).max(1);
        let mut evicted = 0usize;
        for (key, at) in stored.into_iter().take(evict) {
            let removed = self
                .slots
                .remove_if(&key, |_, slot| slot.stored_at() == Some(at));
            if removed.is_some() {
                evicted += 1;
            }
        }

        info!(evicted, capacity = self.config.capacity, "Evicted oldest idempotency records");
    }

    /// Drops expired records and empty slots nobody is waiting on.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl;
        let before = self.slots.len();

        self.slots.retain(|_, slot| {
            if slot.cell.initialized() {
                !slot.is_expired(now, ttl)
            } else {
                Arc::strong_count(slot) > 1
            }
        });

        let purged = before.saturating_sub(self.slots.len());
        if purged > 0 {
            debug!(purged, "Purged idempotency slots");
        }
        purged
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> IdempotencyStats {
        IdempotencyStats {
            cached_operations: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<T> std::fmt::Debug for IdempotencyStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyStore")
            .field("config", &self.config)
            .field("slots", &self.slots.len())
            .finish()
    }
}
