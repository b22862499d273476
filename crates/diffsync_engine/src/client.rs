//! Client half of the protocol.

use std::sync::Arc;

use diffsync_protocol::{
    AddMessage, BackupShadowDocument, ClientDocument, ClientSynchronizer, Edit, PatchMessage,
    ShadowDocument, SyncKey, SyncMessage,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::classify::{self, Disposition};
use crate::config::{ChecksumPolicy, DocumentUpdate, EngineConfig};
use crate::error::{SyncError, SyncResult};
use crate::locks::KeyLocks;
use crate::notify::PatchListener;
use crate::stats::SyncStats;
use crate::store::ClientDataStore;

type Content<S> = <S as ClientSynchronizer>::Content;
type Diff<S> = <S as ClientSynchronizer>::Diff;

/// Client sync engine.
///
/// Produces patch messages from local edits with [`diff`](Self::diff) and
/// reconciles patch messages from the server with [`patch`](Self::patch).
pub struct ClientSyncEngine<S: ClientSynchronizer, St> {
    synchronizer: S,
    store: St,
    config: EngineConfig,
    locks: KeyLocks<SyncKey>,
    listeners: RwLock<Vec<Arc<dyn PatchListener<Content<S>>>>>,
    stats: RwLock<SyncStats>,
}

impl<S, St> ClientSyncEngine<S, St>
where
    S: ClientSynchronizer,
    St: ClientDataStore<Content<S>, Diff<S>>,
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
            locks: KeyLocks::new(),
            listeners: RwLock::new(Vec::new()),
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

    /// Registers a listener called with the document after every successful patch.
    pub fn add_listener<L>(&self, listener: L)
    where
        L: PatchListener<Content<S>> + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Registers a document for synchronization.
    ///
    /// Creates the shadow at versions `(0, 0)` and a backup of it. Adding a
    /// document again resets its state and drops any pending edits.
    pub fn add_document(&self, document: ClientDocument<Content<S>>) -> SyncResult<()> {
        let key = document.key();
        let lock = self.locks.get(&key);
        let _guard = lock.lock();

        let shadow = ShadowDocument::initial(document.clone());
        self.store.save_client_document(document)?;
        self.store.save_shadow(shadow.clone())?;
        self.store
            .save_backup_shadow(BackupShadowDocument::new(0, shadow))?;
        self.store.remove_edits(&key)?;
        debug!(document_id = %key.document_id, client_id = %key.client_id, "document added");
        Ok(())
    }

    /// Records a local change and returns every unacknowledged edit.
    ///
    /// The new edit is queued behind earlier unacknowledged edits, so the
    /// returned message also retransmits anything the server has not
    /// confirmed yet.
    pub fn diff(&self, document: ClientDocument<Content<S>>) -> SyncResult<PatchMessage<Diff<S>>> {
        let key = document.key();
        let lock = self.locks.get(&key);
        let _guard = lock.lock();

        let shadow = self.require_shadow(&key)?;
        let edit = self.synchronizer.server_diff(&document, &shadow);
        let shadow = self
            .synchronizer
            .patch_shadow(&edit, &shadow)?
            .increment_client_version();

        self.store.save_edit(edit)?;
        self.store.save_shadow(shadow.clone())?;
        self.store.save_client_document(document)?;
        self.stats.write().diffs_created += 1;

        let edits = self.store.get_edits(&key)?;
        debug!(
            document_id = %key.document_id,
            client_id = %key.client_id,
            client_version = shadow.client_version,
            pending = edits.len(),
            "diff created"
        );
        Ok(self
            .synchronizer
            .create_patch_message(&key.document_id, &key.client_id, edits))
    }

    /// Reconciles a patch message from the server and returns the local document.
    ///
    /// Edits are classified in order against the shadow. Listeners are
    /// called with the resulting document when the whole message succeeds.
    pub fn patch(&self, message: &PatchMessage<Diff<S>>) -> SyncResult<ClientDocument<Content<S>>> {
        let key = message.key();
        let lock = self.locks.get(&key);
        let _guard = lock.lock();

        let mut applied = Vec::new();
        let outcome = self.reconcile(&key, &message.edits, &mut applied);
        let document = if applied.is_empty() {
            outcome?;
            self.require_document(&key)?
        } else {
            let document = self.update_document(&key, &applied)?;
            outcome?;
            document
        };

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.patched(&document);
        }
        Ok(document)
    }

    fn reconcile<'a>(
        &self,
        key: &SyncKey,
        edits: &'a [Edit<Diff<S>>],
        applied: &mut Vec<&'a Edit<Diff<S>>>,
    ) -> SyncResult<()> {
        let mut shadow = self.require_shadow(key)?;
        for edit in edits {
            let disposition = match classify::client(edit, &shadow) {
                Disposition::Rollback => match self.restore_backup(key, edit)? {
                    Some(backup) => {
                        shadow = backup;
                        classify::client(edit, &shadow)
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
            Disposition::Apply if edit.is_seed() => {
                // The seed was diffed from the content we registered, which
                // the backup still holds; local edits since then are resent
                // by the next diff.
                let base = self.require_backup(key)?.shadow;
                self.verify_checksum(edit, &base)?;
                let patched = self
                    .synchronizer
                    .patch_shadow(edit, &base)?
                    .with_client_version(0);
                self.store.save_shadow(patched.clone())?;
                self.store.remove_edits(key)?;
                self.stats.write().edits_applied += 1;
                applied.push(edit);
                debug!(
                    document_id = %key.document_id,
                    client_id = %key.client_id,
                    dropped_client_version = shadow.client_version,
                    "seed applied"
                );
                Ok(patched)
            }
            Disposition::Apply => {
                self.verify_checksum(edit, &shadow)?;
                let patched = self
                    .synchronizer
                    .patch_shadow(edit, &shadow)?
                    .increment_server_version();
                self.store.save_shadow(patched.clone())?;
                self.acknowledge(key, edit)?;
                self.stats.write().edits_applied += 1;
                applied.push(edit);
                debug!(
                    document_id = %key.document_id,
                    client_id = %key.client_id,
                    server_version = patched.server_version,
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
                    server_version = edit.server_version,
                    "duplicate edit discarded"
                );
                Ok(shadow)
            }
            Disposition::Ahead => {
                self.stats.write().edits_deferred += 1;
                debug!(
                    document_id = %key.document_id,
                    client_id = %key.client_id,
                    edit_server_version = edit.server_version,
                    shadow_server_version = shadow.server_version,
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
                    edit_client_version = edit.client_version,
                    shadow_client_version = shadow.client_version,
                    "edit predates our later edits, discarded"
                );
                Ok(shadow)
            }
            // A restored backup always matches the edit's client version.
            Disposition::Rollback => Err(SyncError::Divergence {
                key: key.clone(),
                backup_version: shadow.client_version,
                edit_version: edit.client_version,
            }),
        }
    }

    /// Restores the backup for an edit made against an older client version.
    ///
    /// Returns `None` when the edit is newer than the backup: the server
    /// applied some of our pipelined edits but diffed before the rest
    /// arrived. Its later edits will carry the rest.
    fn restore_backup(
        &self,
        key: &SyncKey,
        edit: &Edit<Diff<S>>,
    ) -> SyncResult<Option<ShadowDocument<Content<S>>>> {
        let backup = self.require_backup(key)?;
        let edit_version = edit.known_client_version();
        if edit_version > Some(backup.version) {
            return Ok(None);
        }
        if edit_version != Some(backup.version) {
            return Err(SyncError::Divergence {
                key: key.clone(),
                backup_version: backup.version,
                edit_version: edit.client_version,
            });
        }

        info!(
            document_id = %key.document_id,
            client_id = %key.client_id,
            backup_version = backup.version,
            "server missed client edits, restoring backup shadow"
        );
        self.store.remove_edits(key)?;
        self.store.save_shadow(backup.shadow.clone())?;
        self.stats.write().rollbacks += 1;
        Ok(Some(backup.shadow))
    }

    /// Drops queued edits the server has confirmed receiving.
    fn acknowledge(&self, key: &SyncKey, edit: &Edit<Diff<S>>) -> SyncResult<()> {
        for pending in self.store.get_edits(key)? {
            if pending.client_version < edit.client_version {
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
        match self.config.checksum_policy {
            ChecksumPolicy::Reject => Err(SyncError::ChecksumMismatch {
                key: shadow.key(),
                client_version: edit.client_version,
                server_version: edit.server_version,
            }),
            _ => {
                warn!(
                    document_id = %edit.document_id,
                    client_id = %edit.client_id,
                    client_version = edit.client_version,
                    server_version = edit.server_version,
                    "edit checksum does not match shadow"
                );
                Ok(())
            }
        }
    }

    /// Brings the local document up to date and takes a fresh backup.
    fn update_document(
        &self,
        key: &SyncKey,
        applied: &[&Edit<Diff<S>>],
    ) -> SyncResult<ClientDocument<Content<S>>> {
        let shadow = self.require_shadow(key)?;
        let document = self.require_document(key)?;

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

        self.store.save_client_document(patched.clone())?;
        self.store
            .save_backup_shadow(BackupShadowDocument::new(shadow.client_version, shadow))?;
        Ok(patched)
    }

    fn patch_edits(
        &self,
        document: &ClientDocument<Content<S>>,
        applied: &[&Edit<Diff<S>>],
    ) -> SyncResult<ClientDocument<Content<S>>> {
        let mut patched = document.clone();
        for edit in applied {
            patched = self.synchronizer.patch_document(edit, &patched)?;
        }
        Ok(patched)
    }

    fn replace_with_shadow(
        &self,
        shadow: &ShadowDocument<Content<S>>,
        document: &ClientDocument<Content<S>>,
    ) -> ClientDocument<Content<S>> {
        let edit = self.synchronizer.client_diff(shadow, document);
        self.synchronizer
            .patch_document(&edit, document)
            .unwrap_or_else(|_| document.clone().with_content(shadow.content().clone()))
    }

    /// Parses a patch message.
    pub fn patch_message_from_json(&self, json: &str) -> SyncResult<PatchMessage<Diff<S>>> {
        Ok(self.synchronizer.patch_message_from_json(json)?)
    }

    /// Serializes the `add` message registering `document` with a server.
    pub fn document_to_json(&self, document: &ClientDocument<Content<S>>) -> SyncResult<String> {
        let message: SyncMessage<Content<S>, Diff<S>> =
            AddMessage::from_document(document.clone()).into();
        Ok(message.to_json()?)
    }

    /// Wraps edits in a patch message.
    pub fn create_patch_message(
        &self,
        document_id: &str,
        client_id: &str,
        edits: Vec<Edit<Diff<S>>>,
    ) -> PatchMessage<Diff<S>> {
        self.synchronizer
            .create_patch_message(document_id, client_id, edits)
    }

    /// Returns the local document.
    pub fn document(&self, key: &SyncKey) -> SyncResult<Option<ClientDocument<Content<S>>>> {
        self.store.get_client_document(key)
    }

    /// Returns the shadow.
    pub fn shadow(&self, key: &SyncKey) -> SyncResult<Option<ShadowDocument<Content<S>>>> {
        self.store.get_shadow(key)
    }

    /// Returns the backup shadow.
    pub fn backup_shadow(
        &self,
        key: &SyncKey,
    ) -> SyncResult<Option<BackupShadowDocument<Content<S>>>> {
        self.store.get_backup_shadow(key)
    }

    /// Returns the unacknowledged edits, oldest first.
    pub fn pending_edits(&self, key: &SyncKey) -> SyncResult<Vec<Edit<Diff<S>>>> {
        self.store.get_edits(key)
    }

    fn require_shadow(&self, key: &SyncKey) -> SyncResult<ShadowDocument<Content<S>>> {
        self.store
            .get_shadow(key)?
            .ok_or_else(|| SyncError::UnknownShadow(key.clone()))
    }

    fn require_backup(&self, key: &SyncKey) -> SyncResult<BackupShadowDocument<Content<S>>> {
        self.store
            .get_backup_shadow(key)?
            .ok_or_else(|| SyncError::MissingBackup(key.clone()))
    }

    fn require_document(&self, key: &SyncKey) -> SyncResult<ClientDocument<Content<S>>> {
        self.store
            .get_client_document(key)?
            .ok_or_else(|| SyncError::MissingDocument(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClientStore;
    use diffsync_protocol::{DiffPatch, ProtocolError};
    use diffsync_synchronizers::{TextDiffs, TextPatcher, TextSynchronizer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Engine = ClientSyncEngine<TextSynchronizer, MemoryClientStore<String, TextDiffs>>;

    fn engine() -> Engine {
        engine_with(EngineConfig::default())
    }

    fn engine_with(config: EngineConfig) -> Engine {
        ClientSyncEngine::with_config(TextSynchronizer::default(), MemoryClientStore::new(), config)
    }

    fn key() -> SyncKey {
        SyncKey::new("doc", "client")
    }

    fn doc(content: &str) -> ClientDocument<String> {
        ClientDocument::new("doc", "client", content.to_string())
    }

    /// A server edit computed the way the server would: shadow content to new content.
    fn server_edit(client_version: i64, server_version: u64, from: &str, to: &str) -> Edit<TextDiffs> {
        let diff = TextPatcher.diff(&from.to_string(), &to.to_string());
        let checksum = TextPatcher.checksum(&from.to_string());
        Edit::new(&key(), client_version, server_version, checksum, diff)
    }

    fn message(edits: Vec<Edit<TextDiffs>>) -> PatchMessage<TextDiffs> {
        PatchMessage::new("doc", "client", edits)
    }

    #[test]
    fn add_document_initializes_state() {
        let engine = engine();
        engine.add_document(doc("Hello")).unwrap();

        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (0, 0));
        let backup = engine.backup_shadow(&key()).unwrap().unwrap();
        assert_eq!(backup.version, 0);
        assert_eq!(backup.shadow, shadow);
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
    }

    #[test]
    fn diff_queues_and_advances_client_version() {
        let engine = engine();
        engine.add_document(doc("Do or do not, there is no try.")).unwrap();

        let msg = engine.diff(doc("Do or do not, there is no try!")).unwrap();
        assert_eq!(msg.edits.len(), 1);
        let edit = &msg.edits[0];
        assert_eq!((edit.client_version, edit.server_version), (0, 0));
        assert_eq!(
            edit.diff,
            TextDiffs::new()
                .unchanged("Do or do not, there is no try")
                .delete(".")
                .add("!")
        );

        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (0, 1));
        assert_eq!(shadow.content(), "Do or do not, there is no try!");
        assert_eq!(engine.stats().diffs_created, 1);
    }

    #[test]
    fn unacknowledged_edits_are_retransmitted() {
        let engine = engine();
        engine.add_document(doc("a")).unwrap();
        engine.diff(doc("ab")).unwrap();
        let msg = engine.diff(doc("abc")).unwrap();

        let versions: Vec<i64> = msg.edits.iter().map(|e| e.client_version).collect();
        assert_eq!(versions, vec![0, 1]);
    }

    #[test]
    fn diff_without_document_fails() {
        let err = engine().diff(doc("x")).unwrap_err();
        assert!(matches!(err, SyncError::UnknownShadow(_)));
    }

    #[test]
    fn catch_up_applies_edits_in_order() {
        let engine = engine();
        engine.add_document(doc("one")).unwrap();

        let patched = engine
            .patch(&message(vec![
                server_edit(0, 0, "one", "one two"),
                server_edit(0, 1, "one two", "one two three"),
            ]))
            .unwrap();

        assert_eq!(patched.content, "one two three");
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (2, 0));
        assert_eq!(shadow.content(), "one two three");
        let backup = engine.backup_shadow(&key()).unwrap().unwrap();
        assert_eq!(backup.shadow, shadow);
        assert_eq!(engine.stats().edits_applied, 2);
    }

    #[test]
    fn duplicate_edit_is_idempotent() {
        let engine = engine();
        engine.add_document(doc("one")).unwrap();
        let edit = server_edit(0, 0, "one", "one two");

        engine.patch(&message(vec![edit.clone()])).unwrap();
        let before = engine.shadow(&key()).unwrap().unwrap();
        let patched = engine.patch(&message(vec![edit])).unwrap();
        let after = engine.shadow(&key()).unwrap().unwrap();

        assert_eq!(before, after);
        assert_eq!(patched.content, "one two");
        assert_eq!(engine.stats().duplicates_discarded, 1);
    }

    #[test]
    fn ahead_edit_is_deferred() {
        let engine = engine();
        engine.add_document(doc("one")).unwrap();
        let patched = engine
            .patch(&message(vec![server_edit(0, 5, "one", "zzz")]))
            .unwrap();

        assert_eq!(patched.content, "one");
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (0, 0));
        assert_eq!(engine.stats().edits_deferred, 1);
    }

    #[test]
    fn acknowledgment_drops_confirmed_edits() {
        let engine = engine();
        engine.add_document(doc("a")).unwrap();
        engine.diff(doc("ab")).unwrap();
        engine.diff(doc("abc")).unwrap();
        assert_eq!(engine.pending_edits(&key()).unwrap().len(), 2);

        // The server has both edits and replies with one of its own.
        let patched = engine
            .patch(&message(vec![server_edit(2, 0, "abc", "abc!")]))
            .unwrap();
        assert_eq!(patched.content, "abc!");
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (1, 2));
    }

    #[test]
    fn seed_edit_resets_client_version() {
        let engine = engine();
        engine.add_document(doc("local")).unwrap();
        engine.diff(doc("local edit")).unwrap();

        // Diffed from the content we registered, not from our later edit.
        let seed = Edit::seed(
            &key(),
            TextPatcher.checksum(&"local".to_string()),
            TextPatcher.diff(&"local".to_string(), &"server".to_string()),
        );
        let patched = engine.patch(&message(vec![seed])).unwrap();

        assert_eq!(patched.content, "server edit");
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (0, 0));
        assert_eq!(shadow.content(), "server");
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        assert_eq!(engine.backup_shadow(&key()).unwrap().unwrap().version, 0);
        assert_eq!(engine.stats().checksum_mismatches, 0);

        let msg = engine.diff(patched).unwrap();
        assert_eq!(msg.edits.len(), 1);
        assert_eq!((msg.edits[0].client_version, msg.edits[0].server_version), (0, 0));
    }

    #[test]
    fn dropped_client_edit_rolls_back_to_backup() {
        let engine = engine();
        engine.add_document(doc("base")).unwrap();

        // Server edit received: shadow (1, 0), backup version 0.
        engine
            .patch(&message(vec![server_edit(0, 0, "base", "base+s1")]))
            .unwrap();
        // Local edit that never reaches the server: shadow (1, 1).
        engine.diff(doc("base+s1+c1")).unwrap();
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (1, 1));

        // Server replies against client version 0.
        engine
            .patch(&message(vec![server_edit(0, 1, "base+s1", "base+s1+s2")]))
            .unwrap();

        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (2, 0));
        assert_eq!(shadow.content(), "base+s1+s2");
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        assert_eq!(engine.stats().rollbacks, 1);
    }

    #[test]
    fn rollback_with_mismatched_backup_is_divergence() {
        let engine = engine();
        engine.add_document(doc("a")).unwrap();
        engine
            .patch(&message(vec![server_edit(0, 0, "a", "ab")]))
            .unwrap();
        engine.diff(doc("abc")).unwrap();
        engine
            .patch(&message(vec![server_edit(1, 1, "abc", "abcd")]))
            .unwrap();
        assert_eq!(engine.backup_shadow(&key()).unwrap().unwrap().version, 1);

        // An edit made before the server saw client version 1 cannot be recovered.
        let err = engine
            .patch(&message(vec![server_edit(0, 1, "ab", "abx")]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Divergence { backup_version: 1, edit_version: 0, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn reply_to_earlier_of_pipelined_diffs_is_superseded() {
        let engine = engine();
        engine.add_document(doc("a")).unwrap();
        engine.diff(doc("ab")).unwrap();
        engine.diff(doc("abc")).unwrap();

        // The server answered the first message before the second arrived.
        let patched = engine
            .patch(&message(vec![server_edit(1, 0, "ab", "ab")]))
            .unwrap();
        assert_eq!(patched.content, "abc");
        let pending: Vec<i64> = engine
            .pending_edits(&key())
            .unwrap()
            .iter()
            .map(|e| e.client_version)
            .collect();
        assert_eq!(pending, vec![1]);
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (0, 2));

        engine
            .patch(&message(vec![server_edit(2, 0, "abc", "abc")]))
            .unwrap();
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.server_version, shadow.client_version), (1, 2));

        let stats = engine.stats();
        assert_eq!((stats.edits_superseded, stats.rollbacks), (1, 0));
    }

    #[test]
    fn failed_patch_is_reported_without_partial_content() {
        let engine = engine();
        engine.add_document(doc("abc")).unwrap();
        let bad = server_edit(0, 0, "xyz", "xyz!");

        let err = engine.patch(&message(vec![bad])).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(ProtocolError::PatchFailed(_))));
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "abc");
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!(shadow.content(), "abc");
    }

    #[test]
    fn checksum_policy_reject() {
        let engine = engine_with(EngineConfig::new().with_checksum_policy(ChecksumPolicy::Reject));
        engine.add_document(doc("abc")).unwrap();
        let mut edit = server_edit(0, 0, "abc", "abcd");
        edit.checksum = "bogus".to_string();

        let err = engine.patch(&message(vec![edit])).unwrap_err();
        assert!(matches!(err, SyncError::ChecksumMismatch { .. }));
        assert_eq!(engine.stats().checksum_mismatches, 1);
    }

    #[test]
    fn checksum_policy_warn_applies() {
        let engine = engine();
        engine.add_document(doc("abc")).unwrap();
        let mut edit = server_edit(0, 0, "abc", "abcd");
        edit.checksum = "bogus".to_string();

        let patched = engine.patch(&message(vec![edit])).unwrap();
        assert_eq!(patched.content, "abcd");
        assert_eq!(engine.stats().checksum_mismatches, 1);
    }

    #[test]
    fn listeners_see_patched_document() {
        let engine = engine();
        engine.add_document(doc("a")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        engine.add_listener(move |document: &ClientDocument<String>| {
            assert_eq!(document.content, "ab");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        engine
            .patch(&message(vec![server_edit(0, 0, "a", "ab")]))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replace_with_shadow_policy() {
        let engine =
            engine_with(EngineConfig::new().with_document_update(DocumentUpdate::ReplaceWithShadow));
        engine.add_document(doc("a")).unwrap();
        let patched = engine
            .patch(&message(vec![server_edit(0, 0, "a", "ab")]))
            .unwrap();
        assert_eq!(patched.content, "ab");
    }

    #[test]
    fn document_to_json_is_add_message() {
        let json = engine().document_to_json(&doc("hi")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["msgType"], "add");
        assert_eq!(value["id"], "doc");
        assert_eq!(value["clientId"], "client");
        assert_eq!(value["content"], "hi");
    }

    #[test]
    fn patch_message_from_json() {
        let engine = engine();
        let json = r#"{"msgType":"patch","id":"doc","clientId":"client","edits":[
            {"id":"doc","clientId":"client","clientVersion":0,"serverVersion":0,"checksum":"",
             "diffs":[{"operation":"UNCHANGED","text":"a"},{"operation":"ADD","text":"b"}]}]}"#;
        let msg = engine.patch_message_from_json(json).unwrap();
        assert_eq!(msg.edits[0].diff, TextDiffs::new().unchanged("a").add("b"));

        let created = engine.create_patch_message("doc", "client", msg.edits.clone());
        assert_eq!(created, msg);
    }
}
