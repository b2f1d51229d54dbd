//! Result cache key construction.
//!
//! A key is built from the operation kind, the target id and the request
//! parameters. Parameters are canonicalized first (object keys sorted at
//! every depth) so logically identical requests always produce the same key
//! regardless of how the caller ordered its fields.

use std::fmt;

use serde_json::{Map, Value};

use crate::models::tool::OperationKind;

/// Deterministic key of a cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `(kind, target_id, params)`.
    pub fn new(kind: OperationKind, target_id: &str, params: &Value) -> Self {
        let params = canonicalize(params);
        // Value serialization cannot fail for canonicalized JSON.
        let encoded = serde_json::to_string(&params).unwrap_or_default();
        Self(format!("{}:{}:{}", kind.as_str(), target_id, encoded))
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns a copy of `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
