use concierge_core::{
    canonicalize, dead_letter_id, idempotency_key, idempotency_key_for_value, CircuitBreakerStatus,
    CircuitState, CoreError, DeadLetterEntry, DegradationMode, SuccessPolicy, DEAD_LETTER_ID_LEN,
    IDEMPOTENCY_HASH_LEN,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use test_case::test_case;

// ===== Degradation Mode =====

#[test_case("normal", DegradationMode::Normal ; "normal")]
#[test_case("read_only", DegradationMode::ReadOnly ; "read only")]
#[test_case(" Offline ", DegradationMode::Offline ; "padded mixed case")]
fn test_degradation_mode_parses(input: &str, expected: DegradationMode) {
    assert_eq!(input.parse::<DegradationMode>().unwrap(), expected);
}

#[rstest]
#[case("")]
#[case("readonly")]
#[case("maintenance")]
fn test_degradation_mode_rejects_unknown(#[case] input: &str) {
    let err = input.parse::<DegradationMode>().unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn test_degradation_mode_serializes_snake_case() {
    assert_eq!(serde_json::to_value(DegradationMode::ReadOnly).unwrap(), json!("read_only"));
    assert_eq!(DegradationMode::default(), DegradationMode::Normal);
}

// ===== Circuit Breaker Status =====

#[test]
fn test_circuit_status_serialization() {
    let status = CircuitBreakerStatus {
        name: "ai".to_string(),
        state: CircuitState::HalfOpen,
        failure_count: 3,
        failure_threshold: 3,
        last_failure: None,
        recovery_timeout_seconds: 1.5,
    };

    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["state"], json!("half_open"));
    assert_eq!(value["recovery_timeout_seconds"], json!(1.5));

    let back: CircuitBreakerStatus = serde_json::from_value(value).unwrap();
    assert_eq!(back, status);
    assert!(!back.is_open());
}

#[rstest]
#[case(SuccessPolicy::Decay, 4, 3)]
#[case(SuccessPolicy::Decay, 0, 0)]
#[case(SuccessPolicy::Reset, 4, 0)]
fn test_success_policy(#[case] policy: SuccessPolicy, #[case] before: u32, #[case] after: u32) {
    assert_eq!(policy.apply(before), after);
}

// ===== Dead Letter Entries =====

#[test]
fn test_dead_letter_entry_replay_bookkeeping() {
    let mut entry = DeadLetterEntry::new(
        json!({"to": "+100"}),
        "connection refused",
        Some("whatsapp".to_string()),
        BTreeMap::new(),
    );
    assert_eq!(entry.id.len(), DEAD_LETTER_ID_LEN);
    assert_eq!(entry.retry_count, 0);

    entry.record_failed_replay("still refused");

    assert_eq!(entry.retry_count, 1);
    assert_eq!(entry.error, "still refused");
    assert_eq!(entry.last_error.as_deref(), Some("still refused"));
    assert!(entry.last_retry_at.is_some());
}

#[test]
fn test_identical_payloads_share_dead_letter_id() {
    let payload = json!({"to": "+100", "text": "hi"});
    assert_eq!(dead_letter_id(&payload), dead_letter_id(&payload.clone()));
    assert_ne!(dead_letter_id(&payload), dead_letter_id(&json!({"to": "+101", "text": "hi"})));
}

// ===== Idempotency Keys =====

#[test]
fn test_idempotency_key_format() {
    let key = idempotency_key("create_booking", &json!({"guest": 42})).unwrap();
    let (operation, hash) = key.split_once(':').unwrap();

    assert_eq!(operation, "create_booking");
    assert_eq!(hash.len(), IDEMPOTENCY_HASH_LEN);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_idempotency_key_accepts_typed_params() {
    #[derive(serde::Serialize)]
    struct Booking {
        guest: u32,
        room: &'static str,
    }

    let typed = idempotency_key("create_booking", &Booking { guest: 42, room: "101" }).unwrap();
    let untyped = idempotency_key("create_booking", &json!({"room": "101", "guest": 42})).unwrap();
    assert_eq!(typed, untyped);
}

#[test]
fn test_operation_name_changes_key() {
    let params = json!({"guest": 42});
    assert_ne!(
        idempotency_key_for_value("create_booking", &params),
        idempotency_key_for_value("cancel_booking", &params)
    );
}

#[test]
fn test_canonical_form_sorts_nested_keys() {
    let value = json!({"b": {"z": 1, "a": [{"y": true, "x": null}]}, "a": "s"});
    assert_eq!(
        canonicalize(&value),
        r#"{"a":"s","b":{"a":[{"x":null,"y":true}],"z":1}}"#
    );
}

fn object_from(pairs: &[(String, i64)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.clone(), json!(value));
    }
    Value::Object(map)
}

proptest! {
    #[test]
    fn prop_key_ignores_insertion_order(
        pairs in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)
    ) {
        let forward: Vec<(String, i64)> = pairs.clone().into_iter().collect();
        let reversed: Vec<(String, i64)> = forward.iter().rev().cloned().collect();

        let a = object_from(&forward);
        let b = object_from(&reversed);

        prop_assert_eq!(canonicalize(&a), canonicalize(&b));
        prop_assert_eq!(
            idempotency_key_for_value("op", &a),
            idempotency_key_for_value("op", &b)
        );
    }

    #[test]
    fn prop_canonical_form_is_valid_json(
        pairs in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)
    ) {
        let value = object_from(&pairs.into_iter().collect::<Vec<_>>());
        let reparsed: Value = serde_json::from_str(&canonicalize(&value)).unwrap();
        prop_assert_eq!(reparsed, value);
    }
}
