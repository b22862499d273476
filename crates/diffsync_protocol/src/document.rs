//! Documents, shadows and backups.
//!
//! All values here are immutable in practice: every state change produces a
//! new value through a consuming method, and stores replace values wholesale.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one replica pair: a document as seen by one client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncKey {
    /// Document identifier.
    pub document_id: String,
    /// Client identifier.
    pub client_id: String,
}

impl SyncKey {
    /// Creates a key for the given document and client.
    pub fn new(document_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_id, self.client_id)
    }
}

/// A document: an identifier and its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document<C> {
    /// Document identifier.
    pub id: String,
    /// Document content.
    pub content: C,
}

impl<C> Document<C> {
    /// Creates a document.
    pub fn new(id: impl Into<String>, content: C) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    /// Returns a copy of this document with new content.
    pub fn with_content(self, content: C) -> Self {
        Self {
            id: self.id,
            content,
        }
    }

    /// Tags this document with the client holding it.
    pub fn for_client(self, client_id: impl Into<String>) -> ClientDocument<C> {
        ClientDocument {
            id: self.id,
            client_id: client_id.into(),
            content: self.content,
        }
    }
}

/// A document replica owned by a particular client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDocument<C> {
    /// Document identifier.
    pub id: String,
    /// Client identifier.
    pub client_id: String,
    /// Document content.
    pub content: C,
}

impl<C> ClientDocument<C> {
    /// Creates a client document.
    pub fn new(id: impl Into<String>, client_id: impl Into<String>, content: C) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            content,
        }
    }

    /// Returns the replica key of this document.
    pub fn key(&self) -> SyncKey {
        SyncKey::new(self.id.clone(), self.client_id.clone())
    }

    /// Returns a copy of this document with new content.
    pub fn with_content(self, content: C) -> Self {
        Self {
            id: self.id,
            client_id: self.client_id,
            content,
        }
    }

    /// Drops the client tag.
    pub fn into_document(self) -> Document<C> {
        Document {
            id: self.id,
            content: self.content,
        }
    }
}

/// One side's view of what the other side last acknowledged.
///
/// `server_version` counts edits received from the server, `client_version`
/// counts edits sent by the client. Both only ever move forward, except when
/// a seed edit resets `client_version` to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowDocument<C> {
    /// Number of server edits this shadow reflects.
    pub server_version: u64,
    /// Number of client edits this shadow reflects.
    pub client_version: u64,
    /// Shadowed document.
    pub document: ClientDocument<C>,
}

impl<C> ShadowDocument<C> {
    /// Creates a shadow.
    pub fn new(server_version: u64, client_version: u64, document: ClientDocument<C>) -> Self {
        Self {
            server_version,
            client_version,
            document,
        }
    }

    /// Creates the initial shadow for a freshly registered document.
    pub fn initial(document: ClientDocument<C>) -> Self {
        Self::new(0, 0, document)
    }

    /// Returns the replica key of this shadow.
    pub fn key(&self) -> SyncKey {
        self.document.key()
    }

    /// Returns the shadowed content.
    pub fn content(&self) -> &C {
        &self.document.content
    }

    /// Returns this shadow with `client_version` set.
    pub fn with_client_version(self, client_version: u64) -> Self {
        Self {
            client_version,
            ..self
        }
    }

    /// Returns this shadow with `server_version` advanced by one.
    pub fn increment_server_version(self) -> Self {
        Self {
            server_version: self.server_version + 1,
            ..self
        }
    }

    /// Returns this shadow with `client_version` advanced by one.
    pub fn increment_client_version(self) -> Self {
        Self {
            client_version: self.client_version + 1,
            ..self
        }
    }

    /// Returns this shadow with new content and unchanged versions.
    pub fn with_content(self, content: C) -> Self {
        Self {
            document: self.document.with_content(content),
            ..self
        }
    }
}

/// Snapshot of a shadow at the last point both sides agreed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupShadowDocument<C> {
    /// Version on the owning side's axis when the snapshot was taken.
    pub version: u64,
    /// Snapshotted shadow.
    pub shadow: ShadowDocument<C>,
}

impl<C> BackupShadowDocument<C> {
    /// Creates a backup.
    pub fn new(version: u64, shadow: ShadowDocument<C>) -> Self {
        Self { version, shadow }
    }
}
