//! Versioned edits.

use serde::{Deserialize, Serialize};

use crate::document::SyncKey;

/// Client version carried by a seed edit.
///
/// A seed edit hands a newly registered client the starting state of a
/// document. It is accepted regardless of the receiver's shadow versions.
pub const SEED_VERSION: i64 = -1;

/// One atomic change, versioned against the sender's view of the receiver.
///
/// `client_version` is signed so the seed sentinel can travel on the wire.
/// `checksum` hashes the shadow content the diff was computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit<D> {
    /// Client identifier.
    pub client_id: String,
    /// Document identifier.
    #[serde(rename = "id")]
    pub document_id: String,
    /// Client version of the shadow the diff was computed against.
    pub client_version: i64,
    /// Server version of the shadow the diff was computed against.
    pub server_version: u64,
    /// Checksum of the shadow content the diff was computed against.
    pub checksum: String,
    /// Content-type specific diff.
    #[serde(rename = "diffs")]
    pub diff: D,
}

impl<D> Edit<D> {
    /// Creates an edit.
    pub fn new(
        key: &SyncKey,
        client_version: i64,
        server_version: u64,
        checksum: impl Into<String>,
        diff: D,
    ) -> Self {
        Self {
            client_id: key.client_id.clone(),
            document_id: key.document_id.clone(),
            client_version,
            server_version,
            checksum: checksum.into(),
            diff,
        }
    }

    /// Creates a seed edit at server version zero.
    pub fn seed(key: &SyncKey, checksum: impl Into<String>, diff: D) -> Self {
        Self::new(key, SEED_VERSION, 0, checksum, diff)
    }

    /// Returns the replica key this edit belongs to.
    pub fn key(&self) -> SyncKey {
        SyncKey::new(self.document_id.clone(), self.client_id.clone())
    }

    /// Returns true for a seed edit.
    pub fn is_seed(&self) -> bool {
        self.client_version == SEED_VERSION
    }

    /// Returns the client version as a shadow version, or `None` for a seed.
    pub fn known_client_version(&self) -> Option<u64> {
        u64::try_from(self.client_version).ok()
    }

    /// Returns true if both edits were computed against the same versions.
    pub fn same_versions<E>(&self, other: &Edit<E>) -> bool {
        self.client_version == other.client_version && self.server_version == other.server_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SyncKey {
        SyncKey::new("doc", "a")
    }

    #[test]
    fn seed_has_no_known_client_version() {
        let seed = Edit::seed(&key(), "sum", ());
        assert!(seed.is_seed());
        assert_eq!(seed.known_client_version(), None);
        assert_eq!(seed.server_version, 0);

        let edit = Edit::new(&key(), 3, 1, "sum", ());
        assert!(!edit.is_seed());
        assert_eq!(edit.known_client_version(), Some(3));
        assert_eq!(edit.key(), key());
    }

    #[test]
    fn wire_field_names() {
        let edit = Edit::new(&key(), 2, 5, "abc", vec![1, 2]);
        let json = serde_json::to_value(&edit).unwrap();
        assert_eq!(json["id"], "doc");
        assert_eq!(json["clientId"], "a");
        assert_eq!(json["clientVersion"], 2);
        assert_eq!(json["serverVersion"], 5);
        assert_eq!(json["checksum"], "abc");
        assert_eq!(json["diffs"], serde_json::json!([1, 2]));
    }

    #[test]
    fn seed_version_survives_the_wire() {
        let json = r#"{"id":"doc","clientId":"a","clientVersion":-1,"serverVersion":0,"checksum":"","diffs":null}"#;
        let edit: Edit<Option<u8>> = serde_json::from_str(json).unwrap();
        assert!(edit.is_seed());
        assert!(edit.same_versions(&Edit::seed(&key(), "", ())));
    }
}
