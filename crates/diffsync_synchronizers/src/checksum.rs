//! Content checksums.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 of `content`.
pub fn checksum_text(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Returns the lowercase hex SHA-256 of the compact serialization of `value`.
pub fn checksum_json(value: &Value) -> String {
    checksum_text(&value.to_string())
}
