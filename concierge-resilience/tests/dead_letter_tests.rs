use async_trait::async_trait;
use concierge_core::{dead_letter_id, ReplayHandler};
use concierge_resilience::{DeadLetterError, DeadLetterQueue};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

// ===== Test Helper Functions =====

fn add(queue: &DeadLetterQueue, payload: Value) -> String {
    let metadata = BTreeMap::from([("attempts".to_string(), json!(4))]);
    queue.add(payload, "connection refused", Some("whatsapp".to_string()), metadata)
}

/// Handler that blocks until released, to hold a replay in flight.
struct GatedHandler {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ReplayHandler for GatedHandler {
    async fn replay(&self, _payload: Value) -> anyhow::Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

// ===== Capacity =====

#[test]
fn test_oldest_entry_is_evicted() {
    let queue = DeadLetterQueue::with_max_size("outbound", 2);
    add(&queue, json!("a"));
    add(&queue, json!("b"));
    add(&queue, json!("c"));

    let payloads: Vec<Value> = queue.get_all().into_iter().map(|e| e.payload).collect();
    assert_eq!(payloads, vec![json!("b"), json!("c")]);

    let stats = queue.stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.total_added, 3);
    assert_eq!(stats.total_evicted, 1);
}

proptest! {
    #[test]
    fn prop_queue_never_exceeds_max_size(max_size in 1usize..20, count in 0usize..100) {
        let queue = DeadLetterQueue::with_max_size("prop", max_size);
        for n in 0..count {
            add(&queue, json!({ "n": n }));
        }

        prop_assert_eq!(queue.len(), count.min(max_size));

        // Survivors are the most recent insertions, in order
        let survivors: Vec<Value> = queue.get_all().into_iter().map(|e| e.payload).collect();
        let expected: Vec<Value> = (count.saturating_sub(max_size)..count)
            .map(|n| json!({ "n": n }))
            .collect();
        prop_assert_eq!(survivors, expected);
    }
}

// ===== Entries =====

#[test]
fn test_entry_fields() {
    let queue = DeadLetterQueue::with_max_size("outbound", 10);
    let payload = json!({"to": "+100", "text": "Your table is ready"});
    let id = add(&queue, payload.clone());

    let entry = queue.get(&id).unwrap();
    assert_eq!(id, dead_letter_id(&payload));
    assert_eq!(entry.payload, payload);
    assert_eq!(entry.error, "connection refused");
    assert_eq!(entry.original_queue.as_deref(), Some("whatsapp"));
    assert_eq!(entry.metadata["attempts"], json!(4));
    assert_eq!(entry.retry_count, 0);
    assert!(entry.last_retry_at.is_none());
}

#[test]
fn test_clear_empties_queue() {
    let queue = DeadLetterQueue::with_max_size("outbound", 10);
    add(&queue, json!(1));
    add(&queue, json!(2));

    assert_eq!(queue.clear(), 2);
    assert!(queue.is_empty());
    assert_eq!(queue.stats().total_added, 2);
}

// ===== Replay =====

#[tokio::test]
async fn test_successful_replay_removes_entry() {
    let queue = DeadLetterQueue::with_max_size("outbound", 10);
    let id = add(&queue, json!({"msg": "hello"}));
    let replayed = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&replayed);
    let handler = move |payload: Value| {
        let counter = Arc::clone(&counter);
        async move {
            assert_eq!(payload, json!({"msg": "hello"}));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        }
    };

    assert_eq!(queue.retry(&id, &handler).await, Ok(true));
    assert_eq!(replayed.load(Ordering::SeqCst), 1);
    assert!(queue.get(&id).is_none());
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_failed_replay_keeps_entry_and_records_error() {
    let queue = DeadLetterQueue::with_max_size("outbound", 10);
    let id = add(&queue, json!({"msg": "hello"}));
    let handler = |_: Value| async { Err::<(), _>("provider still down") };

    assert_eq!(queue.retry(&id, &handler).await, Ok(false));
    assert_eq!(queue.retry(&id, &handler).await, Ok(false));

    let entry = queue.get(&id).unwrap();
    assert_eq!(entry.retry_count, 2);
    assert_eq!(entry.error, "provider still down");
    assert_eq!(entry.last_error.as_deref(), Some("provider still down"));
    assert!(entry.last_retry_at.is_some());
}

#[tokio::test]
async fn test_concurrent_replay_of_same_entry_is_rejected() {
    let queue = Arc::new(DeadLetterQueue::with_max_size("outbound", 10));
    let id = add(&queue, json!({"msg": "hello"}));
    let handler = Arc::new(GatedHandler {
        entered: Notify::new(),
        release: Notify::new(),
    });

    let first = {
        let queue = Arc::clone(&queue);
        let handler = Arc::clone(&handler);
        let id = id.clone();
        tokio::spawn(async move { queue.retry(&id, handler.as_ref()).await })
    };
    handler.entered.notified().await;

    let noop = |_: Value| async { Ok::<(), String>(()) };
    assert_eq!(
        queue.retry(&id, &noop).await,
        Err(DeadLetterError::ReplayInProgress(id.clone()))
    );

    handler.release.notify_one();
    assert_eq!(first.await.unwrap(), Ok(true));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_dropped_replay_releases_entry() {
    let queue = DeadLetterQueue::with_max_size("outbound", 10);
    let id = add(&queue, json!({"msg": "hello"}));
    let handler = GatedHandler {
        entered: Notify::new(),
        release: Notify::new(),
    };

    let replay = queue.retry(&id, &handler);
    tokio::select! {
        _ = replay => panic!("replay should still be waiting"),
        _ = handler.entered.notified() => {}
    }

    // The abandoned replay no longer blocks a new one
    let noop = |_: Value| async { Ok::<(), String>(()) };
    assert_eq!(queue.retry(&id, &noop).await, Ok(true));
}
