//! Observer sub-registry of a typed store.

use std::sync::Arc;

use tracing::{debug, warn};

use super::safemap::SafeMap;
use crate::core::{HookError, LISTEN_CAPACITY};

/// Observer of first-seen and last-seen transitions.
pub trait Watcher<V>: Send + Sync {
    /// A new key entered the store. Called before the store is updated.
    fn on_arrive(&self, key: &str, value: &Arc<V>) -> Result<(), HookError>;

    /// A key left the store.
    fn on_depart(&self, key: &str) -> Result<(), HookError> {
        let _ = key;
        Ok(())
    }
}

/// Named set of watchers.
pub struct Listen<V> {
    watchers: SafeMap<Arc<dyn Watcher<V>>>,
}

impl<V> Default for Listen<V> {
    fn default() -> Self {
        Self {
            watchers: SafeMap::new(LISTEN_CAPACITY),
        }
    }
}

impl<V> Listen<V> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `watcher` under `name`, replacing any previous one.
    ///
    /// A new name is refused once the set is full.
    pub fn subscribe(&self, name: impl Into<String>, watcher: Arc<dyn Watcher<V>>) -> bool {
        let name = name.into();
        match self.watchers.set(name.as_str(), watcher) {
            Ok(()) => true,
            Err(e) => {
                warn!("Watcher {} not subscribed: {}", name, e);
                false
            }
        }
    }

    /// Remove the watcher registered under `name`.
    pub fn unsubscribe(&self, name: &str) {
        self.watchers.del(name);
    }

    /// Number of watchers.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether no watcher is registered.
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Notify every watcher of an arrival.
    pub fn arrive(&self, key: &str, value: &Arc<V>) {
        for (name, watcher) in self.watchers.snapshot() {
            if let Err(e) = watcher.on_arrive(key, value) {
                debug!("Watcher {} on_arrive({}) failed: {}", name, key, e);
            }
        }
    }

    /// Notify every watcher of a departure.
    pub fn depart(&self, key: &str) {
        for (name, watcher) in self.watchers.snapshot() {
            if let Err(e) = watcher.on_depart(key) {
                debug!("Watcher {} on_depart({}) failed: {}", name, key, e);
            }
        }
    }
}
