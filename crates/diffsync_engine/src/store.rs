//! Data store contracts.
//!
//! A store persists, per replica pair, the shadow, the backup shadow and the
//! queue of unacknowledged edits. The client store adds the local document;
//! the server store adds the authoritative documents.
//!
//! Queue mutations for one key must never lose an append or a removal when
//! called concurrently. Stores that cannot fail return `Ok` unconditionally.

use diffsync_protocol::{
    BackupShadowDocument, ClientDocument, Document, Edit, ShadowDocument, SyncKey,
};

use crate::error::SyncResult;

/// State shared by client and server stores.
pub trait DataStore<C, D>: Send + Sync {
    /// Replaces the shadow for the shadow's key.
    fn save_shadow(&self, shadow: ShadowDocument<C>) -> SyncResult<()>;

    /// Gets the shadow for `key`.
    fn get_shadow(&self, key: &SyncKey) -> SyncResult<Option<ShadowDocument<C>>>;

    /// Replaces the backup shadow for the backup's key.
    fn save_backup_shadow(&self, backup: BackupShadowDocument<C>) -> SyncResult<()>;

    /// Gets the backup shadow for `key`.
    fn get_backup_shadow(&self, key: &SyncKey) -> SyncResult<Option<BackupShadowDocument<C>>>;

    /// Appends an edit to the pending queue of the edit's key.
    fn save_edit(&self, edit: Edit<D>) -> SyncResult<()>;

    /// Gets the pending queue for `key`, oldest first.
    fn get_edits(&self, key: &SyncKey) -> SyncResult<Vec<Edit<D>>>;

    /// Removes the queued edit with the same versions as `edit`.
    fn remove_edit(&self, edit: &Edit<D>) -> SyncResult<()>;

    /// Clears the pending queue for `key`.
    fn remove_edits(&self, key: &SyncKey) -> SyncResult<()>;
}

/// Client-side store.
pub trait ClientDataStore<C, D>: DataStore<C, D> {
    /// Replaces the local document for the document's key.
    fn save_client_document(&self, document: ClientDocument<C>) -> SyncResult<()>;

    /// Gets the local document for `key`.
    fn get_client_document(&self, key: &SyncKey) -> SyncResult<Option<ClientDocument<C>>>;
}

/// Server-side store.
pub trait ServerDataStore<C, D>: DataStore<C, D> {
    /// Stores `document` unless a document with the same id exists.
    ///
    /// Returns true if the document was new.
    fn save_document(&self, document: Document<C>) -> SyncResult<bool>;

    /// Replaces the authoritative document.
    fn update_document(&self, document: Document<C>) -> SyncResult<()>;

    /// Gets the authoritative document.
    fn get_document(&self, document_id: &str) -> SyncResult<Option<Document<C>>>;
}
