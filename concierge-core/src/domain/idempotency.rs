use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the parameter digest.
pub const IDEMPOTENCY_HASH_LEN: usize = 16;

/// Renders a JSON value with object keys sorted at every depth, so that two
/// semantically identical parameter sets always produce the same text.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Derives the idempotency key for an operation and its parameters.
///
/// The key keeps the operation name readable and appends a truncated SHA-256
/// of the canonical parameter text: `create_booking:3f1c0a9e5b7d2c41`.
pub fn idempotency_key<P: Serialize + ?Sized>(operation: &str, params: &P) -> Result<String> {
    let value = serde_json::to_value(params)?;
    Ok(idempotency_key_for_value(operation, &value))
}

pub fn idempotency_key_for_value(operation: &str, params: &Value) -> String {
    let content = format!("{}:{}", operation, canonicalize(params));
    let digest = Sha256::digest(content.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(IDEMPOTENCY_HASH_LEN);
    format!("{}:{}", operation, hash)
}

/// Counters reported by the idempotency store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdempotencyStats {
    pub cached_operations: usize,
    /// Stored results returned by `check` or `execute`
    pub hits: u64,
    /// Operations actually executed
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [1, 2], "c": null}});
        assert_eq!(canonicalize(&value), r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
    }

    #[test]
    fn test_key_prefix_is_operation_name() {
        let key = idempotency_key("create_booking", &json!({"guest": 42})).unwrap();
        let (op, hash) = key.split_once(':').unwrap();
        assert_eq!(op, "create_booking");
        assert_eq!(hash.len(), IDEMPOTENCY_HASH_LEN);
    }

    #[test]
    fn test_operation_name_is_part_of_the_hash() {
        let params = json!({"guest": 42});
        let a = idempotency_key_for_value("create_booking", &params);
        let b = idempotency_key_for_value("cancel_booking", &params);
        assert_ne!(a.split_once(':').unwrap().1, b.split_once(':').unwrap().1);
    }
}
