//! Typed store over [`SafeMap`] with an observer sub-registry.

use std::sync::Arc;

use parking_lot::Mutex;

use super::listen::Listen;
use super::safemap::SafeMap;
use crate::core::RegistryError;

/// A value that can live in a [`Store`].
pub trait Entry: Send + Sync {
    /// Registry key of this entry.
    fn key(&self) -> String;

    /// Copy the mutable fields of `newer` into `self`.
    fn refresh(&self, newer: &Self) {
        let _ = newer;
    }
}

/// Registry of shared entries keyed by [`Entry::key`].
pub struct Store<V> {
    entries: SafeMap<Arc<V>>,
    listen: Listen<V>,
    admit: Mutex<()>,
}

impl<V: Entry> Store<V> {
    /// Create a store holding at most `capacity` entries. Zero means
    /// unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SafeMap::new(capacity),
            listen: Listen::new(),
            admit: Mutex::new(()),
        }
    }

    /// Insert `entry`.
    ///
    /// A new key notifies watchers before the map is updated. An existing
    /// key is replaced silently. Adds are serialized, so concurrent first
    /// adds of one key notify once; watchers must not add to the same store.
    pub fn add(&self, entry: Arc<V>) -> Result<(), RegistryError> {
        let key = entry.key();
        let _admit = self.admit.lock();
        if !self.entries.contains(&key) {
            let capacity = self.entries.capacity();
            if capacity > 0 && self.entries.len() >= capacity {
                return Err(RegistryError::Full { capacity });
            }
            self.listen.arrive(&key, &entry);
        }
        self.entries.set(key, entry)
    }

    /// Refresh the mutable fields of the stored entry with the same key.
    ///
    /// Absent keys are ignored.
    pub fn update(&self, entry: &V) {
        self.entries.with(&entry.key(), |current| current.refresh(entry));
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entries.get(key)
    }

    /// Remove `key` and notify watchers. Absent keys are ignored.
    pub fn del(&self, key: &str) -> Option<Arc<V>> {
        let removed = self.entries.del(key);
        if removed.is_some() {
            self.listen.depart(key);
        }
        removed
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Snapshot of every entry.
    pub fn list(&self) -> std::vec::IntoIter<Arc<V>> {
        self.entries.list()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, notifying watchers of each departure.
    pub fn clear(&self) {
        for key in self.entries.keys() {
            self.del(&key);
        }
    }

    /// Observer sub-registry.
    pub fn listen(&self) -> &Listen<V> {
        &self.listen
    }
}

impl<V: Entry> Default for Store<V> {
    fn default() -> Self {
        Self::new(0)
    }
}
