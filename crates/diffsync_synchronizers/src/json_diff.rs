//! JSON Patch (RFC 6902) diff/patch.

use diffsync_protocol::{DiffPatch, ProtocolError, ProtocolResult};
use json_patch::Patch;
use serde_json::Value;

use crate::checksum::checksum_json;

/// JSON diff/patch exchanging RFC 6902 operation lists.
///
/// Patches are applied to a copy, so a failing operation never leaves the
/// input half patched.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPatcher;

impl JsonPatcher {
    /// Creates a JSON Patch primitive.
    pub fn new() -> Self {
        Self
    }
}

impl DiffPatch for JsonPatcher {
    type Content = Value;
    type Diff = Patch;

    fn diff(&self, source: &Value, target: &Value) -> Patch {
        json_patch::diff(source, target)
    }

    fn patch(&self, diff: &Patch, content: &Value) -> ProtocolResult<Value> {
        let mut patched = content.clone();
        json_patch::patch(&mut patched, &diff.0)
            .map_err(|e| ProtocolError::patch_failed(e.to_string()))?;
        Ok(patched)
    }

    fn checksum(&self, content: &Value) -> String {
        checksum_json(content)
    }
}
