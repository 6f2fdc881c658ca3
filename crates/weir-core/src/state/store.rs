//! Raw keyed state store.
//!
//! The engine owns all mutation of its partition's state through a single
//! processing actor, so the store needs no transactional surface beyond
//! ordered point and prefix access. External crates can implement the trait
//! to provide different persistence mechanisms.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::error::EngineError;

/// Ordered key-value store with prefix scans.
pub trait StateStore: Send + Sync {
    /// Read the value stored under a key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

    /// Store a value under a key, replacing any previous value.
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), EngineError>;

    /// Remove the value stored under a key.
    fn delete(&self, key: &[u8]) -> Result<(), EngineError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError>;
}

/// In-memory store used by tests and single-node setups.
pub struct MemoryStateStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStateStore {
    /// A fresh empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| EngineError::StateStore(format!("failed to acquire read lock: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), EngineError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| EngineError::StateStore(format!("failed to acquire write lock: {}", e)))?;
        entries.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| EngineError::StateStore(format!("failed to acquire write lock: {}", e)))?;
        entries.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| EngineError::StateStore(format!("failed to acquire read lock: {}", e)))?;

        let range = (Bound::Included(prefix.to_vec()), Bound::Unbounded);
        Ok(entries
            .range::<Vec<u8>, _>(range)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_delete() {
        let store = MemoryStateStore::new();
        assert_eq!(store.get(b"a").unwrap(), None);

        store.put(b"a", b"1".to_vec()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));

        store.put(b"a", b"2".to_vec()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"2".to_vec()));

        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let store = MemoryStateStore::new();
        store.put(b"b\x02", b"late".to_vec()).unwrap();
        store.put(b"a\x01", b"first".to_vec()).unwrap();
        store.put(b"a\x02", b"second".to_vec()).unwrap();
        store.put(b"c\x00", b"other".to_vec()).unwrap();

        let scanned = store.scan_prefix(b"a").unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, b"a\x01".to_vec());
        assert_eq!(scanned[1].0, b"a\x02".to_vec());
    }

    #[test]
    fn test_scan_prefix_on_empty_store() {
        let store = MemoryStateStore::new();
        assert!(store.scan_prefix(b"anything").unwrap().is_empty());
    }
}
