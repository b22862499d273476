//! Server half of the protocol.
//!
//! The server keeps one authoritative document per document id and, for every
//! subscribed client, a shadow, a backup and a pending queue. Inbound client
//! edits are reconciled against that client's shadow and then merged into the
//! authoritative document; outbound edits are diffs of the authoritative
//! document against each client's shadow.
//!
//! Two kinds of lock are involved. A per-key lock serializes `diff` and
//! `patch` for one (document, client) pair, so clients of the same document
//! never wait on each other while diffing. A per-document lock guards the
//! read-patch-write of the authoritative document itself.

use std::collections::HashMap;
use std::sync::Arc;

use diffsync_protocol::{
    BackupShadowDocument, ClientDocument, Document, Edit, PatchMessage, ServerSynchronizer,
    ShadowDocument, SyncKey,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::classify::{self, Disposition};
use crate::config::{ChecksumPolicy, DocumentUpdate, EngineConfig};
use crate::error::{SyncError, SyncResult};
use crate::locks::KeyLocks;
use crate::notify::Subscriber;
use crate::stats::SyncStats;
use crate::store::ServerDataStore;

type Content<S> = <S as ServerSynchronizer>::Content;
type Diff<S> = <S as ServerSynchronizer>::Diff;
type SubscriberMap<D> = HashMap<String, HashMap<String, Arc<dyn Subscriber<D>>>>;

/// Server sync engine.
pub struct ServerSyncEngine<S: ServerSynchronizer, St> {
    synchronizer: S,
    store: St,
    config: EngineConfig,
    keys: KeyLocks<SyncKey>,
    documents: KeyLocks<String>,
    subscribers: RwLock<SubscriberMap<Diff<S>>>,
    stats: RwLock<SyncStats>,
}

impl<S, St> ServerSyncEngine<S, St>
where
    S: ServerSynchronizer,
    St: ServerDataStore<Content<S>, Diff<S>>,
{
    /// Creates an engine with the default configuration.
    pub fn new(synchronizer: S, store: St) -> Self {
        Self::with_config(synchronizer, store, EngineConfig::default())
    }

    /// Creates an engine with the given configuration.
    pub fn with_config(synchronizer: S, store: St, config: EngineConfig) -> Self {
        Self {
            synchronizer,
            store,
            config,
            keys: KeyLocks::new(),
            documents: KeyLocks::new(),
            subscribers: RwLock::new(HashMap::new()),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the synchronizer.
    pub fn synchronizer(&self) -> &S {
        &self.synchronizer
    }

    /// Returns the store.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// Subscribes a client to a document and returns its seed message.
    ///
    /// `document` is the client's copy. If the server has no document with
    /// that id it becomes the authoritative document; otherwise the existing
    /// one wins. The client gets a fresh shadow at `(0, 0)` holding the
    /// authoritative content, and the returned message carries a single seed
    /// edit turning the client's content into the authoritative content.
    pub fn add_subscriber(
        &self,
        subscriber: Arc<dyn Subscriber<Diff<S>>>,
        document: Document<Content<S>>,
    ) -> SyncResult<PatchMessage<Diff<S>>> {
        let key = SyncKey::new(document.id.clone(), subscriber.client_id());
        let lock = self.keys.get(&key);
        let _guard = lock.lock();

        if self.store.save_document(document.clone())? {
            info!(document_id = %key.document_id, "document created");
        }
        let authoritative = self.require_document(&key.document_id)?;

        let shadow = ShadowDocument::initial(authoritative.clone().for_client(&key.client_id));
        self.store.save_shadow(shadow.clone())?;
        self.store
            .save_backup_shadow(BackupShadowDocument::new(0, shadow))?;
        self.store.remove_edits(&key)?;

        let theirs = ShadowDocument::initial(document.for_client(&key.client_id));
        let edit = self.synchronizer.server_diff(&authoritative, &theirs);
        let seed = Edit::seed(&key, edit.checksum, edit.diff);

        self.connect_subscriber(&key.document_id, subscriber);
        info!(document_id = %key.document_id, client_id = %key.client_id, "subscriber added");
        Ok(self
            .synchronizer
            .create_patch_message(&key.document_id, &key.client_id, vec![seed]))
    }

    /// Registers a subscriber without touching its sync state.
    ///
    /// Used when a client reconnects with state the server already holds.
    /// Replaces any subscriber registered under the same client id.
    pub fn connect_subscriber(&self, document_id: &str, subscriber: Arc<dyn Subscriber<Diff<S>>>) {
        let client_id = subscriber.client_id().to_string();
        self.subscribers
            .write()
            .entry(document_id.to_string())
            .or_default()
            .insert(client_id, subscriber);
    }

    /// Unregisters a subscriber. Returns true if it was registered.
    ///
    /// The client's shadow and queue are kept so it can reconnect.
    pub fn remove_subscriber(&self, document_id: &str, client_id: &str) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(clients) = subscribers.get_mut(document_id) else {
            return false;
        };
        let removed = clients.remove(client_id).is_some();
        if clients.is_empty() {
            subscribers.remove(document_id);
        }
        if removed {
            info!(document_id, client_id, "subscriber removed");
        }
        removed
    }

    /// Returns the subscribers of a document.
    pub fn subscribers(&self, document_id: &str) -> Vec<Arc<dyn Subscriber<Diff<S>>>> {
        self.subscribers
            .read()
            .get(document_id)
            .map(|clients| clients.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true if `client_id` is subscribed to `document_id`.
    pub fn is_subscribed(&self, document_id: &str, client_id: &str) -> bool {
        self.subscribers
            .read()
            .get(document_id)
            .is_some_and(|clients| clients.contains_key(client_id))
    }

    /// Diffs the authoritative document against a client's shadow.
    ///
    /// The edit is queued for the client and the shadow advances to the
    /// document content with `server_version + 1`. Safe to call concurrently
    /// for different clients of the same document.
    pub fn diff(&self, document_id: &str, client_id: &str) -> SyncResult<Edit<Diff<S>>> {
        let key = SyncKey::new(document_id, client_id);
        let lock = self.keys.get(&key);
        let _guard = lock.lock();
        self.diff_locked(&key)
    }

    /// Diffs for a client and returns its whole pending queue.
    pub fn patch_message(
        &self,
        document_id: &str,
        client_id: &str,
    ) -> SyncResult<PatchMessage<Diff<S>>> {
        let key = SyncKey::new(document_id, client_id);
        let lock = self.keys.get(&key);
        let _guard = lock.lock();

        self.diff_locked(&key)?;
        let edits = self.store.get_edits(&key)?;
        Ok(self
            .synchronizer
            .create_patch_message(document_id, client_id, edits))
    }

    fn diff_locked(&self, key: &SyncKey) -> SyncResult<Edit<Diff<S>>> {
        let shadow = self.require_shadow(key)?;
        let document = self.require_document(&key.document_id)?;

        let edit = self.synchronizer.server_diff(&document, &shadow);
        let shadow = self
            .synchronizer
            .patch_shadow(&edit, &shadow)?
            .increment_server_version();

        self.store.save_edit(edit.clone())?;
        self.store.save_shadow(shadow.clone())?;
        self.stats.write().diffs_created += 1;
        debug!(
            document_id = %key.document_id,
            client_id = %key.client_id,
            server_version = shadow.server_version,
            "diff created"
        );
        Ok(edit)
    }

    /// Reconciles a patch message from a client and returns the authoritative document.
    ///
    /// Edits are classified in order against the client's shadow; the applied
    /// ones are then merged into the authoritative document. Call
    /// [`notify_subscribers`](Self::notify_subscribers) afterwards to fan the
    /// change out.
    pub fn patch(&self, message: &PatchMessage<Diff<S>>) -> SyncResult<Document<Content<S>>> {
        let key = message.key();
        let lock = self.keys.get(&key);
        let _guard = lock.lock();

        let mut applied = Vec::new();
        let outcome = self.reconcile(&key, &message.edits, &mut applied);
        let document = if applied.is_empty() {
            outcome?;
            self.require_document(&key.document_id)?
        } else {
            let document = self.update_document(&key, &applied)?;
            outcome?;
            document
        };
        Ok(document)
    }

    /// Pushes a fresh patch message to every subscriber of the message's document.
    ///
    /// The sender is included: its message acknowledges the edits it sent.
    /// Empty messages change nothing and notify nobody. A subscriber whose
    /// state cannot be diffed is logged and skipped. Returns the number of
    /// subscribers notified.
    pub fn notify_subscribers(&self, message: &PatchMessage<Diff<S>>) -> usize {
        if message.is_empty() {
            return 0;
        }

        let mut notified = 0;
        for subscriber in self.subscribers(&message.document_id) {
            match self.patch_message(&message.document_id, subscriber.client_id()) {
                Ok(outbound) => {
                    subscriber.patched(&outbound);
                    notified += 1;
                }
                Err(e) => warn!(
                    document_id = %message.document_id,
                    client_id = subscriber.client_id(),
                    error = %e,
                    "failed to diff for subscriber"
                ),
            }
        }
        notified
    }

    fn reconcile<'a>(
        &self,
        key: &SyncKey,
        edits: &'a [Edit<Diff<S>>],
        applied: &mut Vec<&'a Edit<Diff<S>>>,
    ) -> SyncResult<()> {
        let mut shadow = self.require_shadow(key)?;
        for edit in edits {
            let disposition = match classify::server(edit, &shadow) {
                Disposition::Rollback => match self.restore_backup(key, edit)? {
                    Some(backup) => {
                        shadow = backup;
                        classify::server(edit, &shadow)
                    }
                    None => Disposition::Superseded,
                },
                other => other,
            };
            shadow = self.settle(key, edit, shadow, disposition, applied)?;
        }
        Ok(())
    }

    fn settle<'a>(
        &self,
        key: &SyncKey,
        edit: &'a Edit<Diff<S>>,
        shadow: ShadowDocument<Content<S>>,
        disposition: Disposition,
        applied: &mut Vec<&'a Edit<Diff<S>>>,
    ) -> SyncResult<ShadowDocument<Content<S>>> {
        match disposition {
            Disposition::Apply => {
                self.verify_checksum(edit, &shadow)?;
                let patched = self
                    .synchronizer
                    .patch_shadow(edit, &shadow)?
                    .increment_client_version();
                self.store.save_shadow(patched.clone())?;
                self.acknowledge(key, edit)?;
                self.stats.write().edits_applied += 1;
                applied.push(edit);
                debug!(
                    document_id = %key.document_id,
                    client_id = %key.client_id,
                    client_version = patched.client_version,
                    "edit applied"
                );
                Ok(patched)
            }
            Disposition::Duplicate => {
                self.acknowledge(key, edit)?;
                self.stats.write().duplicates_discarded += 1;
                debug!(
                    document_id = %key.document_id,
                    client_id = %key.client_id,
                    client_version = edit.client_version,
                    "duplicate edit discarded"
                );
                Ok(shadow)
            }
            Disposition::Ahead => {
                self.stats.write().edits_deferred += 1;
                debug!(
                    document_id = %key.document_id,
                    client_id = %key.client_id,
                    edit_client_version = edit.client_version,
                    shadow_client_version = shadow.client_version,
                    "edit ahead of shadow, deferred"
                );
                Ok(shadow)
            }
            Disposition::Superseded => {
                self.acknowledge(key, edit)?;
                self.stats.write().edits_superseded += 1;
                debug!(
                    document_id = %key.document_id,
                    client_id = %key.client_id,
                    edit_server_version = edit.server_version,
                    shadow_server_version = shadow.server_version,
                    "edit predates later pushes, discarded"
                );
                Ok(shadow)
            }
            // A restored backup always matches the edit's server version.
            Disposition::Rollback => Err(SyncError::Divergence {
                key: key.clone(),
                backup_version: shadow.server_version,
                edit_version: wire_version(edit.server_version),
            }),
        }
    }

    /// Restores the backup for an edit made against an older server version.
    ///
    /// Returns `None` when the client saw some pushes newer than the backup
    /// but not the latest: the edit is dropped and the client rolls back
    /// on its side when the later pushes reach it.
    fn restore_backup(
        &self,
        key: &SyncKey,
        edit: &Edit<Diff<S>>,
    ) -> SyncResult<Option<ShadowDocument<Content<S>>>> {
        let backup = self
            .store
            .get_backup_shadow(key)?
            .ok_or_else(|| SyncError::MissingBackup(key.clone()))?;
        if edit.server_version > backup.version {
            return Ok(None);
        }
        if edit.server_version != backup.version {
            return Err(SyncError::Divergence {
                key: key.clone(),
                backup_version: backup.version,
                edit_version: wire_version(edit.server_version),
            });
        }

        info!(
            document_id = %key.document_id,
            client_id = %key.client_id,
            backup_version = backup.version,
            "client missed server edits, restoring backup shadow"
        );
        self.store.remove_edits(key)?;
        self.store.save_shadow(backup.shadow.clone())?;
        self.stats.write().rollbacks += 1;
        Ok(Some(backup.shadow))
    }

    /// Drops queued edits the client has confirmed receiving.
    fn acknowledge(&self, key: &SyncKey, edit: &Edit<Diff<S>>) -> SyncResult<()> {
        for pending in self.store.get_edits(key)? {
            if pending.server_version < edit.server_version {
                self.store.remove_edit(&pending)?;
            }
        }
        Ok(())
    }

    fn verify_checksum(
        &self,
        edit: &Edit<Diff<S>>,
        shadow: &ShadowDocument<Content<S>>,
    ) -> SyncResult<()> {
        if self.config.checksum_policy == ChecksumPolicy::Ignore || edit.checksum.is_empty() {
            return Ok(());
        }
        if self.synchronizer.checksum(shadow.content()) == edit.checksum {
            return Ok(());
        }

        self.stats.write().checksum_mismatches += 1;
        if self.config.checksum_policy == ChecksumPolicy::Reject {
            return Err(SyncError::ChecksumMismatch {
                key: shadow.key(),
                client_version: edit.client_version,
                server_version: edit.server_version,
            });
        }
        warn!(
            document_id = %edit.document_id,
            client_id = %edit.client_id,
            client_version = edit.client_version,
            server_version = edit.server_version,
            "edit checksum does not match shadow"
        );
        Ok(())
    }

    /// Merges applied edits into the authoritative document and takes a fresh backup.
    fn update_document(
        &self,
        key: &SyncKey,
        applied: &[&Edit<Diff<S>>],
    ) -> SyncResult<Document<Content<S>>> {
        let shadow = self.require_shadow(key)?;

        let lock = self.documents.get(&key.document_id);
        let patched = {
            let _guard = lock.lock();
            let document = self.require_document(&key.document_id)?;
            let patched = match self.config.document_update {
                DocumentUpdate::PatchEdits => match self.patch_edits(&document, applied) {
                    Ok(patched) => patched,
                    Err(e) => {
                        warn!(
                            document_id = %key.document_id,
                            client_id = %key.client_id,
                            error = %e,
                            "edit no longer applies to document, replacing it with the shadow"
                        );
                        self.stats.write().document_fallbacks += 1;
                        self.replace_with_shadow(&shadow, &document)
                    }
                },
                DocumentUpdate::ReplaceWithShadow => self.replace_with_shadow(&shadow, &document),
            };
            self.store.update_document(patched.clone())?;
            patched
        };

        self.store
            .save_backup_shadow(BackupShadowDocument::new(shadow.server_version, shadow))?;
        Ok(patched)
    }

    fn patch_edits(
        &self,
        document: &Document<Content<S>>,
        applied: &[&Edit<Diff<S>>],
    ) -> SyncResult<Document<Content<S>>> {
        let mut patched = document.clone();
        for edit in applied {
            patched = self.synchronizer.patch_document(edit, &patched)?;
        }
        Ok(patched)
    }

    fn replace_with_shadow(
        &self,
        shadow: &ShadowDocument<Content<S>>,
        document: &Document<Content<S>>,
    ) -> Document<Content<S>> {
        let edit = self.synchronizer.client_diff(shadow, document);
        self.synchronizer
            .patch_document(&edit, document)
            .unwrap_or_else(|_| document.clone().with_content(shadow.content().clone()))
    }

    /// Parses a patch message.
    pub fn patch_message_from_json(&self, json: &str) -> SyncResult<PatchMessage<Diff<S>>> {
        Ok(self.synchronizer.patch_message_from_json(json)?)
    }

    /// Parses the client document carried by an `add` message.
    pub fn document_from_json(&self, json: &str) -> SyncResult<ClientDocument<Content<S>>>
    where
        Content<S>: Default,
    {
        Ok(self.synchronizer.document_from_json(json)?)
    }

    /// Returns the authoritative document.
    pub fn document(&self, document_id: &str) -> SyncResult<Option<Document<Content<S>>>> {
        self.store.get_document(document_id)
    }

    /// Returns a client's shadow.
    pub fn shadow(&self, key: &SyncKey) -> SyncResult<Option<ShadowDocument<Content<S>>>> {
        self.store.get_shadow(key)
    }

    /// Returns a client's backup shadow.
    pub fn backup_shadow(
        &self,
        key: &SyncKey,
    ) -> SyncResult<Option<BackupShadowDocument<Content<S>>>> {
        self.store.get_backup_shadow(key)
    }

    /// Returns the edits not yet acknowledged by a client, oldest first.
    pub fn pending_edits(&self, key: &SyncKey) -> SyncResult<Vec<Edit<Diff<S>>>> {
        self.store.get_edits(key)
    }

    fn require_shadow(&self, key: &SyncKey) -> SyncResult<ShadowDocument<Content<S>>> {
        self.store
            .get_shadow(key)?
            .ok_or_else(|| SyncError::UnknownShadow(key.clone()))
    }

    fn require_document(&self, document_id: &str) -> SyncResult<Document<Content<S>>> {
        self.store
            .get_document(document_id)?
            .ok_or_else(|| SyncError::UnknownDocument(document_id.to_string()))
    }
}

fn wire_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}
