//! In-memory data stores.
//!
//! Each replica pair owns one mutex guarding its shadow, backup and queue.
//! The outer map lock is only taken to find or create that mutex.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use diffsync_protocol::{
    BackupShadowDocument, ClientDocument, Document, Edit, ShadowDocument, SyncKey,
};
use parking_lot::{Mutex, RwLock};

use crate::error::SyncResult;
use crate::store::{ClientDataStore, DataStore, ServerDataStore};

struct Replica<C, D> {
    document: Option<ClientDocument<C>>,
    shadow: Option<ShadowDocument<C>>,
    backup: Option<BackupShadowDocument<C>>,
    edits: Vec<Edit<D>>,
}

impl<C, D> Default for Replica<C, D> {
    fn default() -> Self {
        Self {
            document: None,
            shadow: None,
            backup: None,
            edits: Vec::new(),
        }
    }
}

struct ReplicaTable<C, D> {
    replicas: RwLock<HashMap<SyncKey, Arc<Mutex<Replica<C, D>>>>>,
}

impl<C: Clone, D: Clone> ReplicaTable<C, D> {
    fn new() -> Self {
        Self {
            replicas: RwLock::new(HashMap::new()),
        }
    }

    fn existing(&self, key: &SyncKey) -> Option<Arc<Mutex<Replica<C, D>>>> {
        self.replicas.read().get(key).cloned()
    }

    fn entry(&self, key: &SyncKey) -> Arc<Mutex<Replica<C, D>>> {
        if let Some(replica) = self.existing(key) {
            return replica;
        }
        Arc::clone(
            self.replicas
                .write()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Replica::default()))),
        )
    }

    fn read<R>(&self, key: &SyncKey, f: impl FnOnce(&Replica<C, D>) -> R) -> Option<R> {
        self.existing(key).map(|replica| f(&*replica.lock()))
    }

    fn write<R>(&self, key: &SyncKey, f: impl FnOnce(&mut Replica<C, D>) -> R) -> R {
        let replica = self.entry(key);
        let mut guard = replica.lock();
        f(&mut *guard)
    }

    fn len(&self) -> usize {
        self.replicas.read().len()
    }

    fn save_shadow(&self, shadow: ShadowDocument<C>) {
        let key = shadow.key();
        self.write(&key, |r| r.shadow = Some(shadow));
    }

    fn get_shadow(&self, key: &SyncKey) -> Option<ShadowDocument<C>> {
        self.read(key, |r| r.shadow.clone()).flatten()
    }

    fn save_backup(&self, backup: BackupShadowDocument<C>) {
        let key = backup.shadow.key();
        self.write(&key, |r| r.backup = Some(backup));
    }

    fn get_backup(&self, key: &SyncKey) -> Option<BackupShadowDocument<C>> {
        self.read(key, |r| r.backup.clone()).flatten()
    }

    fn save_edit(&self, edit: Edit<D>) {
        let key = edit.key();
        self.write(&key, |r| r.edits.push(edit));
    }

    fn get_edits(&self, key: &SyncKey) -> Vec<Edit<D>> {
        self.read(key, |r| r.edits.clone()).unwrap_or_default()
    }

    fn remove_edit(&self, edit: &Edit<D>) {
        if let Some(replica) = self.existing(&edit.key()) {
            replica.lock().edits.retain(|queued| !queued.same_versions(edit));
        }
    }

    fn remove_edits(&self, key: &SyncKey) {
        if let Some(replica) = self.existing(key) {
            replica.lock().edits.clear();
        }
    }
}

/// In-memory client store.
pub struct MemoryClientStore<C, D> {
    replicas: ReplicaTable<C, D>,
}

impl<C: Clone, D: Clone> MemoryClientStore<C, D> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            replicas: ReplicaTable::new(),
        }
    }

    /// Returns the number of replica pairs with any stored state.
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }
}

impl<C: Clone, D: Clone> Default for MemoryClientStore<C, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, D> DataStore<C, D> for MemoryClientStore<C, D>
where
    C: Clone + Send + Sync,
    D: Clone + Send + Sync,
{
    fn save_shadow(&self, shadow: ShadowDocument<C>) -> SyncResult<()> {
        self.replicas.save_shadow(shadow);
        Ok(())
    }

    fn get_shadow(&self, key: &SyncKey) -> SyncResult<Option<ShadowDocument<C>>> {
        Ok(self.replicas.get_shadow(key))
    }

    fn save_backup_shadow(&self, backup: BackupShadowDocument<C>) -> SyncResult<()> {
        self.replicas.save_backup(backup);
        Ok(())
    }

    fn get_backup_shadow(&self, key: &SyncKey) -> SyncResult<Option<BackupShadowDocument<C>>> {
        Ok(self.replicas.get_backup(key))
    }

    fn save_edit(&self, edit: Edit<D>) -> SyncResult<()> {
        self.replicas.save_edit(edit);
        Ok(())
    }

    fn get_edits(&self, key: &SyncKey) -> SyncResult<Vec<Edit<D>>> {
        Ok(self.replicas.get_edits(key))
    }

    fn remove_edit(&self, edit: &Edit<D>) -> SyncResult<()> {
        self.replicas.remove_edit(edit);
        Ok(())
    }

    fn remove_edits(&self, key: &SyncKey) -> SyncResult<()> {
        self.replicas.remove_edits(key);
        Ok(())
    }
}

impl<C, D> ClientDataStore<C, D> for MemoryClientStore<C, D>
where
    C: Clone + Send + Sync,
    D: Clone + Send + Sync,
{
    fn save_client_document(&self, document: ClientDocument<C>) -> SyncResult<()> {
        let key = document.key();
        self.replicas.write(&key, |r| r.document = Some(document));
        Ok(())
    }

    fn get_client_document(&self, key: &SyncKey) -> SyncResult<Option<ClientDocument<C>>> {
        Ok(self.replicas.read(key, |r| r.document.clone()).flatten())
    }
}

/// In-memory server store.
pub struct MemoryServerStore<C, D> {
    documents: RwLock<HashMap<String, Document<C>>>,
    replicas: ReplicaTable<C, D>,
}

impl<C: Clone, D: Clone> MemoryServerStore<C, D> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            replicas: ReplicaTable::new(),
        }
    }

    /// Returns the number of authoritative documents.
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns the number of replica pairs with any stored state.
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }
}

impl<C: Clone, D: Clone> Default for MemoryServerStore<C, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, D> DataStore<C, D> for MemoryServerStore<C, D>
where
    C: Clone + Send + Sync,
    D: Clone + Send + Sync,
{
    fn save_shadow(&self, shadow: ShadowDocument<C>) -> SyncResult<()> {
        self.replicas.save_shadow(shadow);
        Ok(())
    }

    fn get_shadow(&self, key: &SyncKey) -> SyncResult<Option<ShadowDocument<C>>> {
        Ok(self.replicas.get_shadow(key))
    }

    fn save_backup_shadow(&self, backup: BackupShadowDocument<C>) -> SyncResult<()> {
        self.replicas.save_backup(backup);
        Ok(())
    }

    fn get_backup_shadow(&self, key: &SyncKey) -> SyncResult<Option<BackupShadowDocument<C>>> {
        Ok(self.replicas.get_backup(key))
    }

    fn save_edit(&self, edit: Edit<D>) -> SyncResult<()> {
        self.replicas.save_edit(edit);
        Ok(())
    }

    fn get_edits(&self, key: &SyncKey) -> SyncResult<Vec<Edit<D>>> {
        Ok(self.replicas.get_edits(key))
    }

    fn remove_edit(&self, edit: &Edit<D>) -> SyncResult<()> {
        self.replicas.remove_edit(edit);
        Ok(())
    }

    fn remove_edits(&self, key: &SyncKey) -> SyncResult<()> {
        self.replicas.remove_edits(key);
        Ok(())
    }
}

impl<C, D> ServerDataStore<C, D> for MemoryServerStore<C, D>
where
    C: Clone + Send + Sync,
    D: Clone + Send + Sync,
{
    fn save_document(&self, document: Document<C>) -> SyncResult<bool> {
        match self.documents.write().entry(document.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(document);
                Ok(true)
            }
        }
    }

    fn update_document(&self, document: Document<C>) -> SyncResult<()> {
        self.documents.write().insert(document.id.clone(), document);
        Ok(())
    }

    fn get_document(&self, document_id: &str) -> SyncResult<Option<Document<C>>> {
        Ok(self.documents.read().get(document_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key() -> SyncKey {
        SyncKey::new("doc", "a")
    }

    fn edit(client_version: i64, server_version: u64) -> Edit<String> {
        Edit::new(&key(), client_version, server_version, "", format!("{client_version}"))
    }

    #[test]
    fn missing_state_reads_as_none() {
        let store: MemoryClientStore<String, String> = MemoryClientStore::new();
        assert!(store.get_shadow(&key()).unwrap().is_none());
        assert!(store.get_backup_shadow(&key()).unwrap().is_none());
        assert!(store.get_client_document(&key()).unwrap().is_none());
        assert!(store.get_edits(&key()).unwrap().is_empty());
        store.remove_edit(&edit(0, 0)).unwrap();
        assert_eq!(store.replica_count(), 0);
    }

    #[test]
    fn shadow_and_backup_are_replaced() {
        let store: MemoryClientStore<String, String> = MemoryClientStore::new();
        let doc = ClientDocument::new("doc", "a", "v1".to_string());
        let shadow = ShadowDocument::initial(doc.clone());
        store.save_shadow(shadow.clone()).unwrap();
        store
            .save_backup_shadow(BackupShadowDocument::new(0, shadow.clone()))
            .unwrap();

        let next = shadow.increment_client_version();
        store.save_shadow(next.clone()).unwrap();
        assert_eq!(store.get_shadow(&key()).unwrap(), Some(next));
        assert_eq!(store.get_backup_shadow(&key()).unwrap().unwrap().version, 0);
        assert_eq!(store.replica_count(), 1);
    }

    #[test]
    fn queue_preserves_order_and_removes_by_version() {
        let store: MemoryClientStore<String, String> = MemoryClientStore::new();
        for v in 0..3 {
            store.save_edit(edit(v, 0)).unwrap();
        }
        store.remove_edit(&edit(1, 0)).unwrap();
        let versions: Vec<i64> = store
            .get_edits(&key())
            .unwrap()
            .iter()
            .map(|e| e.client_version)
            .collect();
        assert_eq!(versions, vec![0, 2]);

        store.remove_edits(&key()).unwrap();
        assert!(store.get_edits(&key()).unwrap().is_empty());
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let store: Arc<MemoryServerStore<String, String>> = Arc::new(MemoryServerStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store.save_edit(edit(t * 50 + i, 0)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get_edits(&key()).unwrap().len(), 400);

        let removers: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store.remove_edit(&edit(t * 50 + i, 0)).unwrap();
                    }
                })
            })
            .collect();
        for handle in removers {
            handle.join().unwrap();
        }
        assert!(store.get_edits(&key()).unwrap().is_empty());
    }

    #[test]
    fn server_documents_keep_first_writer() {
        let store: MemoryServerStore<String, String> = MemoryServerStore::new();
        assert!(store.save_document(Document::new("doc", "first".to_string())).unwrap());
        assert!(!store.save_document(Document::new("doc", "second".to_string())).unwrap());
        assert_eq!(store.get_document("doc").unwrap().unwrap().content, "first");

        store
            .update_document(Document::new("doc", "third".to_string()))
            .unwrap();
        assert_eq!(store.get_document("doc").unwrap().unwrap().content, "third");
        assert_eq!(store.document_count(), 1);
        assert!(store.get_document("other").unwrap().is_none());
    }
}
