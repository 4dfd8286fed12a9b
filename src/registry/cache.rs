//! Optional mirroring of registries into an external key/value cache.
//!
//! The cache holds one hash per entry under `"{prefix}:{key}"`. Missing
//! keys and fields are never errors.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::store::{Entry, Store};
use crate::core::CacheError;

/// Hash-oriented key/value cache.
pub trait KvCache: Send + Sync {
    /// Merge `fields` into the hash at `key`.
    fn set(&self, key: &str, fields: HashMap<String, String>) -> Result<(), CacheError>;

    /// Read one field. Missing key or field yields `Ok(None)`.
    fn get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    /// Delete one field, or the whole hash when `field` is `None`.
    fn delete(&self, key: &str, field: Option<&str>) -> Result<(), CacheError>;
}

/// An entry that can be written to a [`KvCache`].
pub trait Persist {
    /// Field map stored for this entry.
    fn fields(&self) -> HashMap<String, String>;
}

/// In-process [`KvCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hashes.
    pub fn len(&self) -> usize {
        self.hashes.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }
}

impl KvCache for MemoryCache {
    fn set(&self, key: &str, fields: HashMap<String, String>) -> Result<(), CacheError> {
        self.hashes
            .write()
            .entry(key.to_string())
            .or_default()
            .extend(fields);
        Ok(())
    }

    fn get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .hashes
            .read()
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    fn delete(&self, key: &str, field: Option<&str>) -> Result<(), CacheError> {
        let mut hashes = self.hashes.write();
        match field {
            None => {
                hashes.remove(key);
            }
            Some(field) => {
                if let Some(hash) = hashes.get_mut(key) {
                    hash.remove(field);
                    if hash.is_empty() {
                        hashes.remove(key);
                    }
                }
            }
        }
        Ok(())
    }
}

impl<V: Entry + Persist> Store<V> {
    /// Write every entry under `prefix`. Returns the number written.
    pub fn persist(&self, prefix: &str, cache: &dyn KvCache) -> Result<usize, CacheError> {
        let mut written = 0;
        for entry in self.list() {
            cache.set(&format!("{prefix}:{}", entry.key()), entry.fields())?;
            written += 1;
        }
        debug!("Persisted {} entries under {}", written, prefix);
        Ok(written)
    }

    /// Drop the cached hash of `key` under `prefix`.
    pub fn forget(&self, prefix: &str, key: &str, cache: &dyn KvCache) -> Result<(), CacheError> {
        cache.delete(&format!("{prefix}:{key}"), None)
    }
}
