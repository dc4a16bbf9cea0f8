//! Deep merge for JSON trees: objects merge recursively, everything else is replaced.
//!
//! Used both for configuration layering and for merge-update of documents, so the two
//! share one definition of "request/later source wins".

use serde_json::{Map, Value};

/// Merge `source` into `target`. Keys present in `source` win; nested objects are merged
/// key by key; arrays, scalars and `null` replace the previous value wholesale.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => merge_maps(target, source),
        (target, source) => *target = source,
    }
}

/// Object form of [`deep_merge`].
pub fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) if existing.is_object() && value.is_object() => deep_merge(existing, value),
            _ => {
                target.insert(key, value);
            }
        }
    }
}
