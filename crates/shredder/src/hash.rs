//! Stable content hashing for `array_contains` and `sub_doc_equals`.
//!
//! Object key order must not affect the hash — two objects with the same
//! keys and values but different insertion order must compare equal under
//! `$eq`/`$in`/`$all`. `doc_json` itself keeps insertion order;
//! only this hash path re-sorts keys.

use serde_json::Value as JsonValue;

/// Stable, order-independent content hash, hex-encoded.
pub fn stable_hash(value: &JsonValue) -> String {
    let canonical = canonical_for_hash(value);
    let bytes = serde_json::to_vec(&canonical).expect("serialization of canonical value");
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(&bytes))
}

/// The `array_contains` entry literal for one element at `path` — shared
/// between the shredder (building the set) and the filter algebra
/// (building `$in`/`$all` membership candidates), so the two always agree
/// on format.
pub fn array_entry_literal(path: &str, element: &JsonValue) -> String {
    match element {
        JsonValue::Null => format!("{path}|null|null"),
        JsonValue::Bool(b) => format!("{path}|boolean|{b}"),
        JsonValue::Number(n) => format!("{path}|number|{n}"),
        JsonValue::String(s) => format!("{path}|text|{s}"),
        JsonValue::Object(_) | JsonValue::Array(_) => {
            format!("{path}|hash|{}", stable_hash(element))
        }
    }
}

/// Recursively sort object keys so hashing is independent of insertion
/// order. Arrays keep their order — element order is significant.
fn canonical_for_hash(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonical_for_hash(v));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(canonical_for_hash).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn array_order_does_affect_hash() {
        let a = json!([1, 2]);
        let b = json!([2, 1]);
        assert_ne!(stable_hash(&a), stable_hash(&b));
    }
}
