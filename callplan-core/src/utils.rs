// callplan-core/src/utils.rs
use serde_json::{Map, Value};

/// Renders a JSON value compactly with object keys sorted recursively, so
/// two values differing only in key order produce identical text. Used for
/// content-addressed cache keys and memoization fingerprints.
pub(crate) fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
