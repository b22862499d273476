//! Per-key mutual exclusion.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// A table of mutexes, one per key, created on first use.
///
/// The table lock is held only to look up or insert a key's mutex, so callers
/// working on different keys never wait on each other.
pub(crate) struct KeyLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyLocks<K> {
    pub(crate) fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the mutex for `key`. Lock it for the duration of the operation.
    pub(crate) fn get(&self, key: &K) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().len()
    }
}
