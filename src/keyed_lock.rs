// Per-key async locks. Rollup ticks use `try_lock` for single-flight per
// (agent, level); alert evaluation uses `lock` to serialize the
// read-then-write on the triggered-alert ledger per (agent, alert).
// A key's entry is dropped once nobody holds or waits on it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: Mutex<HashMap<K, Slot>>,
}

/// Held lock on one key. Dropping it releases the key.
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    owner: &'a KeyedLocks<K>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner.release(&self.key);
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, key: &K) -> Slot {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(key.clone()).or_default().clone()
    }

    /// Removes the entry when the map holds the only reference. Clones are
    /// only handed out under the map lock, so the count cannot grow meanwhile.
    fn release(&self, key: &K) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            map.remove(key);
        }
    }

    /// Waits until the key is free.
    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let guard = self.entry(key).lock_owned().await;
        KeyedGuard {
            guard: Some(guard),
            key: key.clone(),
            owner: self,
        }
    }

    /// Returns `None` if another task holds the key.
    pub fn try_lock(&self, key: &K) -> Option<KeyedGuard<'_, K>> {
        match self.entry(key).try_lock_owned() {
            Ok(guard) => Some(KeyedGuard {
                guard: Some(guard),
                key: key.clone(),
                owner: self,
            }),
            Err(_) => {
                // the holder may have released while we held a reference
                self.release(key);
                None
            }
        }
    }

    #[cfg(test)]
    fn entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
