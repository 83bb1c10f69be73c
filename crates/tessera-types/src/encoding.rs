//! Canonical JSON serialization.
//!
//! Content addressing requires that the same value always serializes to the
//! same bytes. Object keys are sorted lexicographically, nulls are dropped,
//! and output is compact.

use crate::error::{Result, TypesError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Serialize a value to its canonical JSON string.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).map_err(|e| TypesError::Serialization(e.to_string()))?;
    let canonical = canonicalize_value(json_value);
    serde_json::to_string(&canonical).map_err(|e| TypesError::Serialization(e.to_string()))
}

/// Blake3 hash of the canonical JSON representation.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<[u8; 32]> {
    let canonical = to_canonical_json(value)?;
    Ok(*blake3::hash(canonical.as_bytes()).as_bytes())
}

fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: BTreeMap<String, Value> = BTreeMap::new();
            for (k, v) in map {
                if !v.is_null() {
                    sorted.insert(k, canonicalize_value(v));
                }
            }
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}
