//! Bounded in-memory dead letter queue.
//!
//! Holds operations that failed terminally so an operator can inspect them and
//! replay them by hand. The queue is bounded: once `max_size` is exceeded the
//! oldest entries are dropped, never the newest.
//!
//! Replay handlers run outside the queue lock. While an entry is being
//! replayed, a second replay of the same id is refused with
//! [`DeadLetterError::ReplayInProgress`].

use concierge_core::{DeadLetterEntry, DeadLetterStats, ReplayHandler};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{info, warn};

use crate::observability::metrics as resilience_metrics;

/// Default queue capacity
pub const DEFAULT_DEAD_LETTER_MAX_SIZE: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterError {
    #[error("Dead letter entry not found: {0}")]
    NotFound(String),

    #[error("Dead letter entry {0} is already being replayed")]
    ReplayInProgress(String),

    #[error("Dead letter entry {id} reached the replay limit of {limit}")]
    ReplayLimitReached { id: String, limit: u32 },
}

/// Configuration for a dead letter queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterConfig {
    /// Entries retained before the oldest are evicted
    pub max_size: usize,
    /// Failed replays allowed per entry; `None` means unlimited
    pub max_replay_attempts: Option<u32>,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_DEAD_LETTER_MAX_SIZE,
            max_replay_attempts: None,
        }
    }
}

struct QueueState {
    entries: VecDeque<DeadLetterEntry>,
    replaying: HashSet<String>,
}

pub struct DeadLetterQueue {
    name: String,
    config: DeadLetterConfig,
    state: Mutex<QueueState>,
    total_added: AtomicU64,
    total_evicted: AtomicU64,
}

impl DeadLetterQueue {
    pub fn new(name: impl Into<String>, config: DeadLetterConfig) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(config.max_size.min(1024)),
                replaying: HashSet::new(),
            }),
            config,
            total_added: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
        }
    }

    pub fn with_max_size(name: impl Into<String>, max_size: usize) -> Self {
        Self::new(
            name,
            DeadLetterConfig {
                max_size,
                ..Default::default()
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    /// Parks a failed operation and returns its entry id.
    pub fn add(
        &self,
        payload: Value,
        error: impl Into<String>,
        original_queue: Option<String>,
        metadata: BTreeMap<String, Value>,
    ) -> String {
        let entry = DeadLetterEntry::new(payload, error, original_queue, metadata);
        let id = entry.id.clone();

        let evicted = {
            let mut state = self.state.lock();
            state.entries.push_back(entry);
            let mut evicted = 0u64;
            while state.entries.len() > self.config.max_size {
                state.entries.pop_front();
                evicted += 1;
            }
            evicted
        };

        self.total_added.fetch_add(1, Ordering::Relaxed);
        resilience_metrics::record_dead_letter(&self.name);
        if evicted > 0 {
            self.total_evicted.fetch_add(evicted, Ordering::Relaxed);
            resilience_metrics::record_dead_letter_evictions(&self.name, evicted);
            warn!(queue = %self.name, evicted, "Dead letter queue full, evicted oldest entries");
        }

        info!(queue = %self.name, entry_id = %id, "Added entry to dead letter queue");
        id
    }

    /// Snapshot of every entry, oldest first.
    pub fn get_all(&self) -> Vec<DeadLetterEntry> {
        self.state.lock().entries.iter().cloned().collect()
    }

    /// The newest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<DeadLetterEntry> {
        let state = self.state.lock();
        let skip = state.entries.len().saturating_sub(limit);
        state.entries.iter().skip(skip).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<DeadLetterEntry> {
        self.state.lock().entries.iter().find(|e| e.id == id).cloned()
    }

    /// Replays an entry through `handler`.
    ///
    /// Returns `Ok(true)` and removes the entry when the handler succeeds.
    /// Returns `Ok(false)` when it fails; the entry stays queued with its
    /// `retry_count` incremented and its error updated.
    pub async fn retry<H>(&self, id: &str, handler: &H) -> Result<bool, DeadLetterError>
    where
        H: ReplayHandler + ?Sized,
    {
        let payload = {
            let mut state = self.state.lock();
            if state.replaying.contains(id) {
                return Err(DeadLetterError::ReplayInProgress(id.to_string()));
            }
            let entry = state
                .entries
                .iter()
                .find(|e| e.id == id)
                .ok_or_else(|| DeadLetterError::NotFound(id.to_string()))?;
            if let Some(limit) = self.config.max_replay_attempts {
                if entry.retry_count >= limit {
                    return Err(DeadLetterError::ReplayLimitReached {
                        id: id.to_string(),
                        limit,
                    });
                }
            }
            let payload = entry.payload.clone();
            state.replaying.insert(id.to_string());
            payload
        };

        let _guard = ReplayGuard { queue: self, id };
        let outcome = handler.replay(payload).await;

        let mut state = self.state.lock();
        match outcome {
            Ok(()) => {
                if let Some(pos) = state.entries.iter().position(|e| e.id == id) {
                    state.entries.remove(pos);
                }
                info!(queue = %self.name, entry_id = %id, "Successfully replayed dead letter entry");
                resilience_metrics::record_dead_letter_replay(&self.name, true);
                Ok(true)
            }
            Err(e) => {
                if let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) {
                    entry.record_failed_replay(e.to_string());
                }
                warn!(queue = %self.name, entry_id = %id, error = %e, "Replay of dead letter entry failed");
                resilience_metrics::record_dead_letter_replay(&self.name, false);
                Ok(false)
            }
        }
    }

    /// Removes every entry and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        info!(queue = %self.name, count, "Cleared dead letter queue");
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn stats(&self) -> DeadLetterStats {
        let state = self.state.lock();
        DeadLetterStats {
            name: self.name.clone(),
            size: state.entries.len(),
            max_size: self.config.max_size,
            oldest: state.entries.front().map(|e| e.failed_at),
            newest: state.entries.back().map(|e| e.failed_at),
            total_added: self.total_added.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DeadLetterQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterQueue")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

/// Clears the in-progress marker even if the replay future is dropped.
struct ReplayGuard<'a> {
    queue: &'a DeadLetterQueue,
    id: &'a str,
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.queue.state.lock().replaying.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add(queue: &DeadLetterQueue, payload: Value) -> String {
        queue.add(payload, "boom", Some("outbound".to_string()), BTreeMap::new())
    }

    #[test]
    fn test_fifo_eviction_drops_oldest() {
        let queue = DeadLetterQueue::with_max_size("test", 2);
        let _a = add(&queue, json!("a"));
        let b = add(&queue, json!("b"));
        let c = add(&queue, json!("c"));

        let ids: Vec<_> = queue.get_all().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, c]);
        assert_eq!(queue.stats().total_evicted, 1);
    }

    #[test]
    fn test_recent_returns_newest_entries() {
        let queue = DeadLetterQueue::with_max_size("test", 10);
        for i in 0..5 {
            add(&queue, json!(i));
        }

        let recent: Vec<_> = queue.recent(2).into_iter().map(|e| e.payload).collect();
        assert_eq!(recent, vec![json!(3), json!(4)]);
        assert_eq!(queue.recent(50).len(), 5);
    }

    #[test]
    fn test_stats_on_empty_queue() {
        let queue = DeadLetterQueue::with_max_size("empty", 3);
        let stats = queue.stats();

        assert_eq!(stats.size, 0);
        assert_eq!(stats.max_size, 3);
        assert!(stats.oldest.is_none());
        assert!(stats.newest.is_none());
    }

    #[tokio::test]
    async fn test_replay_unknown_id() {
        let queue = DeadLetterQueue::with_max_size("test", 2);
        let handler = |_: Value| async { Ok::<(), String>(()) };

        let result = queue.retry("missing", &handler).await;
        assert_eq!(result, Err(DeadLetterError::NotFound("missing".to_string())));
    }

    #[tokio::test]
    async fn test_replay_limit_is_enforced() {
        let queue = DeadLetterQueue::new(
            "test",
            DeadLetterConfig {
                max_size: 10,
                max_replay_attempts: Some(1),
            },
        );
        let id = add(&queue, json!({"msg": 1}));
        let handler = |_: Value| async { Err::<(), _>("still failing") };

        assert_eq!(queue.retry(&id, &handler).await, Ok(false));
        assert!(matches!(
            queue.retry(&id, &handler).await,
            Err(DeadLetterError::ReplayLimitReached { limit: 1, .. })
        ));
        assert_eq!(queue.get(&id).unwrap().retry_count, 1);
    }
}
