//! Keyed async locks

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{Error, Result};

/// One async lock per key, created on first use
///
/// An entry is dropped again once nobody holds or waits for it, so the
/// table stays as small as the set of keys in use.
pub struct LockTable<K: Eq + Hash + Clone> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive use of `key`
    pub async fn lock(&self, key: &K) -> Result<KeyGuard<'_, K>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| Error::Internal("Lock table poisoned".to_string()))?;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = lock.lock_owned().await;

        Ok(KeyGuard {
            table: self,
            key: key.clone(),
            guard: Some(guard),
        })
    }

    fn release(&self, key: &K) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

impl<K: Eq + Hash + Clone> Default for LockTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Held lock on one key of a [`LockTable`]
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    table: &'a LockTable<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        // Unlock first so the entry's only remaining owner is the table
        self.guard.take();
        self.table.release(&self.key);
    }
}
