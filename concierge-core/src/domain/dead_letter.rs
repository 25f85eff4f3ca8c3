use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Number of hex characters kept from the payload digest.
pub const DEAD_LETTER_ID_LEN: usize = 12;

/// An operation that failed terminally and is parked for inspection or replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEntry {
    pub id: String,
    pub payload: Value,
    pub error: String,
    pub original_queue: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub failed_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl DeadLetterEntry {
    pub fn new(
        payload: Value,
        error: impl Into<String>,
        original_queue: Option<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id: dead_letter_id(&payload),
            payload,
            error: error.into(),
            original_queue,
            metadata,
            failed_at: Utc::now(),
            retry_count: 0,
            last_error: None,
            last_retry_at: None,
        }
    }

    /// Records a failed replay attempt. The entry stays queued.
    pub fn record_failed_replay(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.retry_count += 1;
        self.error = error.clone();
        self.last_error = Some(error);
        self.last_retry_at = Some(Utc::now());
    }
}

/// Derives the entry id from the payload content.
///
/// Identical payloads share an id.
pub fn dead_letter_id(payload: &Value) -> String {
    let digest = Sha256::digest(payload.to_string().as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(DEAD_LETTER_ID_LEN);
    id
}

/// Queue-level statistics for a dead letter queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterStats {
    pub name: String,
    pub size: usize,
    pub max_size: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub total_added: u64,
    pub total_evicted: u64,
}
