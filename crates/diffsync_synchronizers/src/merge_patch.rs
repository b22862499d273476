//! JSON Merge Patch (RFC 7386) diff/patch.
//!
//! Merge patches cannot express "set this member to null": a `null` in the
//! patch removes the member. Content that relies on explicit nulls should use
//! [`JsonPatcher`](crate::JsonPatcher) instead.

use diffsync_protocol::{DiffPatch, ProtocolResult};
use serde_json::{Map, Value};

use crate::checksum::checksum_json;

/// JSON diff/patch exchanging merge patch documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMergePatcher;

impl JsonMergePatcher {
    /// Creates a JSON Merge Patch primitive.
    pub fn new() -> Self {
        Self
    }
}

/// Computes the smallest merge patch turning `source` into `target`.
fn merge_diff(source: &Value, target: &Value) -> Value {
    match (source, target) {
        (Value::Object(source), Value::Object(target)) => {
            let mut patch = Map::new();
            for (key, old) in source {
                match target.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new) if new != old => {
                        patch.insert(key.clone(), merge_diff(old, new));
                    }
                    Some(_) => {}
                }
            }
            for (key, new) in target {
                if !source.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            Value::Object(patch)
        }
        _ => target.clone(),
    }
}

impl DiffPatch for JsonMergePatcher {
    type Content = Value;
    type Diff = Value;

    fn diff(&self, source: &Value, target: &Value) -> Value {
        merge_diff(source, target)
    }

    fn patch(&self, diff: &Value, content: &Value) -> ProtocolResult<Value> {
        let mut patched = content.clone();
        json_patch::merge(&mut patched, diff);
        Ok(patched)
    }

    fn checksum(&self, content: &Value) -> String {
        checksum_json(content)
    }
}
