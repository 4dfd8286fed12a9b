//! Bounded concurrent map keyed by string.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::RegistryError;

/// Thread-safe string-keyed map.
///
/// Every operation takes the lock for its own duration only; the lock is
/// never exposed. Iteration works on a snapshot taken under the read lock,
/// so visitors may call back into the map.
#[derive(Debug)]
pub struct SafeMap<V> {
    capacity: usize,
    data: RwLock<HashMap<String, V>>,
}

impl<V> Default for SafeMap<V> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<V> SafeMap<V> {
    /// Create a map holding at most `capacity` keys. Zero means unbounded.
    pub fn new(capacity: usize) -> Self {
        let initial = if capacity == 0 { 16 } else { capacity.min(1024) };
        Self {
            capacity,
            data: RwLock::new(HashMap::with_capacity(initial)),
        }
    }

    /// Maximum number of keys, zero when unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or replace `key`.
    ///
    /// Replacing an existing key always succeeds. A new key fails once the
    /// map is at capacity.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<(), RegistryError> {
        let key = key.into();
        let mut data = self.data.write();
        if self.capacity > 0 && data.len() >= self.capacity && !data.contains_key(&key) {
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }
        data.insert(key, value);
        Ok(())
    }

    /// Remove `key`, returning its value.
    pub fn del(&self, key: &str) -> Option<V> {
        self.data.write().remove(key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Snapshot of the keys.
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Run `f` against the value of `key` under the read lock.
    pub fn with<R>(&self, key: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.data.read().get(key).map(f)
    }
}

impl<V: Clone> SafeMap<V> {
    /// Clone out the value of `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    /// Visit every entry of a snapshot.
    pub fn iter(&self, mut visit: impl FnMut(&str, &V)) {
        for (key, value) in self.snapshot() {
            visit(&key, &value);
        }
    }

    /// One-shot sequence of the values present at call time.
    pub fn list(&self) -> std::vec::IntoIter<V> {
        self.data
            .read()
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> Vec<(String, V)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_get_del() {
        let map = SafeMap::new(0);
        map.set("a", 1).unwrap();
        assert_eq!(map.get("a"), Some(1));

        map.set("a", 2).unwrap();
        assert_eq!(map.get("a"), Some(2));
        assert_eq!(map.len(), 1);

        assert_eq!(map.del("a"), Some(2));
        assert_eq!(map.get("a"), None);
        assert_eq!(map.del("a"), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_list_after_delete() {
        let map = SafeMap::new(0);
        for key in ["a", "b", "c"] {
            map.set(key, key.to_string()).unwrap();
        }
        map.del("b");

        let mut values: Vec<_> = map.list().collect();
        values.sort();
        assert_eq!(values, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_capacity() {
        let map = SafeMap::new(2);
        map.set("a", 1).unwrap();
        map.set("b", 2).unwrap();
        assert_eq!(map.set("c", 3), Err(RegistryError::Full { capacity: 2 }));

        // Replacing an existing key is not growth.
        map.set("b", 20).unwrap();
        assert_eq!(map.get("b"), Some(20));

        map.del("a");
        map.set("c", 3).unwrap();
    }

    #[test]
    fn test_iter_may_reenter() {
        let map = SafeMap::new(0);
        map.set("a", 1).unwrap();
        map.set("b", 2).unwrap();

        let mut seen = 0;
        map.iter(|key, _| {
            map.del(key);
            seen += 1;
        });
        assert_eq!(seen, 2);
        assert!(map.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let map = Arc::new(SafeMap::new(0));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        map.set(format!("{t}-{i}"), i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 800);
        assert_eq!(map.keys().len(), 800);
    }
}
