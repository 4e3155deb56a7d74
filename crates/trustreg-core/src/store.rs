//! # Ordered Key-Value Store
//!
//! The registry persists everything through `KvStore`, an ordered byte-key
//! store with prefix scans. The enclosing state machine owns the real
//! engine and its block-boundary commit; this module provides the contract
//! and three implementations:
//!
//! - [`MemStore`]: shared in-memory ordered map.
//! - [`PrefixStore`]: a view scoped to one key prefix.
//! - [`CacheStore`]: a write overlay that commits to its parent atomically
//!   or is discarded.
//!
//! ## Concurrency
//!
//! Store handles are cheap to clone and clones share state. The registry
//! runs one state transition at a time; the locks only make the handles
//! `Send + Sync`, they do not order concurrent transitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// An ordered, prefix-scannable byte-key store.
pub trait KvStore {
    /// Value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether a value is stored under `key`.
    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &[u8], value: Vec<u8>);

    /// Remove `key`. Removing an absent key is a no-op.
    fn delete(&self, key: &[u8]);

    /// All entries whose key starts with `prefix`, in ascending key order.
    ///
    /// Keys are returned in full (including `prefix`).
    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

fn scan_map<V: Clone>(map: &BTreeMap<Vec<u8>, V>, prefix: &[u8]) -> Vec<(Vec<u8>, V)> {
    map.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// MemStore
// ---------------------------------------------------------------------------

/// In-memory ordered store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().get(key).cloned()
    }

    fn has(&self, key: &[u8]) -> bool {
        self.inner.read().contains_key(key)
    }

    fn set(&self, key: &[u8], value: Vec<u8>) {
        self.inner.write().insert(key.to_vec(), value);
    }

    fn delete(&self, key: &[u8]) {
        self.inner.write().remove(key);
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        scan_map(&self.inner.read(), prefix)
    }
}

// ---------------------------------------------------------------------------
// PrefixStore
// ---------------------------------------------------------------------------

/// A view of a store in which every key is implicitly prefixed.
///
/// Scan results have the prefix stripped, so callers see the same keys they
/// wrote.
#[derive(Debug, Clone)]
pub struct PrefixStore<S> {
    inner: S,
    prefix: Vec<u8>,
}

impl<S: KvStore> PrefixStore<S> {
    /// Scope `inner` to `prefix`.
    pub fn new(inner: S, prefix: &[u8]) -> Self {
        Self {
            inner,
            prefix: prefix.to_vec(),
        }
    }

    /// The prefix this view is scoped to.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(key);
        out
    }
}

impl<S: KvStore> KvStore for PrefixStore<S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.get(&self.full_key(key))
    }

    fn has(&self, key: &[u8]) -> bool {
        self.inner.has(&self.full_key(key))
    }

    fn set(&self, key: &[u8], value: Vec<u8>) {
        self.inner.set(&self.full_key(key), value);
    }

    fn delete(&self, key: &[u8]) {
        self.inner.delete(&self.full_key(key));
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let strip = self.prefix.len();
        self.inner
            .prefix_scan(&self.full_key(prefix))
            .into_iter()
            .map(|(k, v)| (k[strip..].to_vec(), v))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// A buffered branch of a parent store.
///
/// Reads see the branch's own writes first and fall through to the parent.
/// Nothing reaches the parent until [`CacheStore::commit`]; dropping the
/// branch (or calling [`CacheStore::discard`]) throws the writes away.
#[derive(Debug, Clone)]
pub struct CacheStore<S> {
    parent: S,
    writes: Arc<RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>>,
}

impl<S: KvStore> CacheStore<S> {
    /// Branch off `parent`.
    pub fn new(parent: S) -> Self {
        Self {
            parent,
            writes: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Flush all buffered writes and deletes into the parent.
    pub fn commit(&self) {
        let pending = std::mem::take(&mut *self.writes.write());
        for (key, value) in pending {
            match value {
                Some(value) => self.parent.set(&key, value),
                None => self.parent.delete(&key),
            }
        }
    }

    /// Drop all buffered writes.
    pub fn discard(&self) {
        self.writes.write().clear();
    }

    /// Number of keys written or deleted since the last commit.
    pub fn pending_writes(&self) -> usize {
        self.writes.read().len()
    }
}

impl<S: KvStore> KvStore for CacheStore<S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(entry) = self.writes.read().get(key) {
            return entry.clone();
        }
        self.parent.get(key)
    }

    fn set(&self, key: &[u8], value: Vec<u8>) {
        self.writes.write().insert(key.to_vec(), Some(value));
    }

    fn delete(&self, key: &[u8]) {
        self.writes.write().insert(key.to_vec(), None);
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.prefix_scan(prefix).into_iter().collect();
        for (key, value) in scan_map(&self.writes.read(), prefix) {
            match value {
                Some(value) => {
                    merged.insert(key, value);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }
        merged.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Record codec
// ---------------------------------------------------------------------------

/// Read and decode the JSON record stored under `key`.
///
/// Returns `Ok(None)` when the key is absent.
pub fn load_record<T: DeserializeOwned>(
    store: &impl KvStore,
    key: &[u8],
) -> Result<Option<T>, CodecError> {
    match store.get(key) {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CodecError::Decode {
                key: hex::encode(key),
                source,
            }),
    }
}

/// Encode `record` as JSON and store it under `key`.
pub fn save_record<T: Serialize>(
    store: &impl KvStore,
    key: &[u8],
    record: &T,
) -> Result<(), CodecError> {
    let bytes = serde_json::to_vec(record).map_err(|source| CodecError::Encode {
        key: hex::encode(key),
        source,
    })?;
    store.set(key, bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_mem_store_roundtrip() {
        let store = MemStore::new();
        store.set(b"a", b"1".to_vec());
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
        assert!(store.has(b"a"));
        store.delete(b"a");
        assert!(!store.has(b"a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemStore::new();
        let other = store.clone();
        other.set(b"k", vec![1]);
        assert_eq!(store.get(b"k"), Some(vec![1]));
    }

    #[test]
    fn test_prefix_scan_ordered_and_bounded() {
        let store = MemStore::new();
        store.set(b"b/2", vec![2]);
        store.set(b"b/1", vec![1]);
        store.set(b"a/9", vec![9]);
        store.set(b"c/0", vec![0]);
        let keys: Vec<_> = store.prefix_scan(b"b/").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"b/1".to_vec(), b"b/2".to_vec()]);
    }

    #[test]
    fn test_prefix_store_scopes_and_strips() {
        let store = MemStore::new();
        let scoped = PrefixStore::new(store.clone(), b"issuer/");
        scoped.set(b"x", vec![7]);
        assert_eq!(store.get(b"issuer/x"), Some(vec![7]));
        assert_eq!(scoped.prefix_scan(b""), vec![(b"x".to_vec(), vec![7])]);
        assert_eq!(scoped.prefix(), b"issuer/");
    }

    #[test]
    fn test_nested_prefix_stores() {
        let store = MemStore::new();
        let outer = PrefixStore::new(store.clone(), b"tree/");
        let inner = PrefixStore::new(outer.clone(), b"sub/");
        inner.set(b"n", vec![1]);
        assert!(store.has(b"tree/sub/n"));
        assert_eq!(outer.prefix_scan(b"sub/").len(), 1);
    }

    #[test]
    fn test_cache_store_isolated_until_commit() {
        let store = MemStore::new();
        store.set(b"keep", vec![1]);
        store.set(b"drop", vec![2]);
        let branch = CacheStore::new(store.clone());
        branch.set(b"new", vec![3]);
        branch.delete(b"drop");

        assert!(!store.has(b"new"));
        assert!(store.has(b"drop"));
        assert!(!branch.has(b"drop"));
        assert_eq!(branch.pending_writes(), 2);

        branch.commit();
        assert_eq!(store.get(b"new"), Some(vec![3]));
        assert!(!store.has(b"drop"));
        assert_eq!(branch.pending_writes(), 0);
    }

    #[test]
    fn test_cache_store_discard() {
        let store = MemStore::new();
        let branch = CacheStore::new(store.clone());
        branch.set(b"x", vec![1]);
        branch.discard();
        branch.commit();
        assert!(store.is_empty());
    }

    #[test]
    fn test_cache_store_scan_merges_overlay() {
        let store = MemStore::new();
        store.set(b"p/1", vec![1]);
        store.set(b"p/2", vec![2]);
        let branch = CacheStore::new(store);
        branch.delete(b"p/1");
        branch.set(b"p/3", vec![3]);
        branch.set(b"p/2", vec![20]);
        let scanned = branch.prefix_scan(b"p/");
        assert_eq!(
            scanned,
            vec![(b"p/2".to_vec(), vec![20]), (b"p/3".to_vec(), vec![3])]
        );
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
    }

    #[test]
    fn test_record_codec() {
        let store = MemStore::new();
        assert!(load_record::<Row>(&store, b"r").unwrap().is_none());
        save_record(&store, b"r", &Row { name: "n".into() }).unwrap();
        let row: Row = load_record(&store, b"r").unwrap().unwrap();
        assert_eq!(row.name, "n");
    }

    #[test]
    fn test_record_decode_failure_names_key() {
        let store = MemStore::new();
        store.set(b"\x01", b"not json".to_vec());
        let err = load_record::<Row>(&store, b"\x01").unwrap_err();
        assert!(err.to_string().contains("0x01"));
    }
}
