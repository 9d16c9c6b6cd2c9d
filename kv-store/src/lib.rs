//! The node's local key-value map
//!
//! A single mutex around a `HashMap`, independent of every other lock in
//! the process. There is no durability here by design: the store is
//! process-lifetime only.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

/// The node's locally-owned shard of the keyspace
#[derive(Default)]
pub struct KvStore {
    /// The underlying map, behind a single mutex
    data: Mutex<HashMap<String, String>>,
}

impl KvStore {
    /// Construct an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `key = value`, overwriting any existing value
    pub fn put(&self, key: String, value: String) {
        self.data.lock().expect("kv store lock poisoned").insert(key, value);
    }

    /// Read the value for `key`, if present
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.lock().expect("kv store lock poisoned").get(key).cloned()
    }

    /// Remove `key`, returning `true` if it was present
    pub fn delete(&self, key: &str) -> bool {
        self.data.lock().expect("kv store lock poisoned").remove(key).is_some()
    }

    /// Write `key = value` only if `key` is not already present locally
    ///
    /// Used by the anti-entropy syncer, which must never overwrite a
    /// locally-held value (that would risk resurrecting a tombstone for a
    /// key this node just deleted).
    pub fn put_if_absent(&self, key: String, value: String) -> bool {
        let mut data = self.data.lock().expect("kv store lock poisoned");
        if data.contains_key(&key) {
            false
        } else {
            data.insert(key, value);
            true
        }
    }

    /// Whether `key` is present locally
    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().expect("kv store lock poisoned").contains_key(key)
    }

    /// The number of keys stored locally
    pub fn len(&self) -> usize {
        self.data.lock().expect("kv store lock poisoned").len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A full copy of the local map, for `GET_ALL_DATA` and recovery
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.data.lock().expect("kv store lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = KvStore::new();
        store.put("name".into(), "Alice".into());
        assert_eq!(store.get("name"), Some("Alice".into()));
    }

    #[test]
    fn get_missing_key_is_none() {
        let store = KvStore::new();
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn delete_reports_whether_key_existed() {
        let store = KvStore::new();
        assert!(!store.delete("name"));
        store.put("name".into(), "Alice".into());
        assert!(store.delete("name"));
        assert_eq!(store.get("name"), None);
    }

    #[test]
    fn put_if_absent_never_overwrites() {
        let store = KvStore::new();
        assert!(store.put_if_absent("name".into(), "Alice".into()));
        assert!(!store.put_if_absent("name".into(), "Bob".into()));
        assert_eq!(store.get("name"), Some("Alice".into()));
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let store = KvStore::new();
        store.put("a".into(), "1".into());
        store.put("b".into(), "2".into());
        let snap = store.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("a"), Some(&"1".to_string()));
    }
}
