//! # Tree Storage Adapter
//!
//! Maps the [`MerkleStorage`] contract onto a region of the registry's
//! key-value store, so one sparse Merkle tree implementation serves every
//! tree the registry keeps.
//!
//! ## Key Layout
//!
//! ```text
//! outer_prefix || internal_prefix || node_hash   -> node bytes
//! outer_prefix || internal_prefix || "root"      -> hex of the root hash
//! ```
//!
//! The outer prefix names the tree (issuance, revocation) and never
//! changes. The internal prefix starts empty and grows through
//! [`MerkleStorage::with_prefix`].
//!
//! ## Root Cache
//!
//! The decoded root is cached on first read and replaced by `set_root`.
//! The cache belongs to one adapter instance; a fresh instance (including
//! one returned by `with_prefix`) starts cold.

use std::ops::ControlFlow;

use trustreg_core::KvStore;
use trustreg_crypto::{MerkleStorage, Node, NodeHash, TreeError};

use crate::keys::TREE_ROOT;

/// A [`MerkleStorage`] over a prefix-scoped region of a [`KvStore`].
#[derive(Debug, Clone)]
pub struct TreeStorage<S> {
    store: S,
    key_prefix: Vec<u8>,
    internal_prefix: Vec<u8>,
    current_root: Option<NodeHash>,
}

impl<S: KvStore + Clone> TreeStorage<S> {
    /// Adapter for the tree stored under `key_prefix`.
    pub fn new(store: S, key_prefix: &[u8]) -> Self {
        Self {
            store,
            key_prefix: key_prefix.to_vec(),
            internal_prefix: Vec::new(),
            current_root: None,
        }
    }

    fn scope(&self) -> Vec<u8> {
        [self.key_prefix.as_slice(), self.internal_prefix.as_slice()].concat()
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        [self.key_prefix.as_slice(), self.internal_prefix.as_slice(), key].concat()
    }

    // Entries under the scope, prefixes stripped, root key skipped.
    fn scan(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let scope = self.scope();
        self.store
            .prefix_scan(&scope)
            .into_iter()
            .map(|(k, v)| (k[scope.len()..].to_vec(), v))
            .filter(|(k, _)| k.as_slice() != TREE_ROOT)
            .collect()
    }
}

impl<S: KvStore + Clone> MerkleStorage for TreeStorage<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Node>, TreeError> {
        self.store
            .get(&self.full_key(key))
            .map(|bytes| Node::from_bytes(&bytes))
            .transpose()
    }

    fn put(&mut self, key: &[u8], node: &Node) -> Result<(), TreeError> {
        self.store.set(&self.full_key(key), node.to_bytes());
        Ok(())
    }

    fn get_root(&mut self) -> Result<Option<NodeHash>, TreeError> {
        if let Some(root) = self.current_root {
            return Ok(Some(root));
        }
        let Some(raw) = self.store.get(&self.full_key(TREE_ROOT)) else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&raw).map_err(|e| TreeError::InvalidRoot(e.to_string()))?;
        let root = NodeHash::from_hex(text)?;
        self.current_root = Some(root);
        Ok(Some(root))
    }

    fn set_root(&mut self, root: NodeHash) -> Result<(), TreeError> {
        self.store
            .set(&self.full_key(TREE_ROOT), root.to_hex().into_bytes());
        self.current_root = Some(root);
        Ok(())
    }

    fn iterate(
        &self,
        visitor: &mut dyn FnMut(&[u8], &Node) -> ControlFlow<()>,
    ) -> Result<(), TreeError> {
        for (key, value) in self.scan() {
            let node = Node::from_bytes(&value)?;
            if visitor(&key, &node).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<(Vec<u8>, Node)>, TreeError> {
        let mut out = Vec::new();
        for (key, value) in self.scan() {
            out.push((key, Node::from_bytes(&value)?));
            if limit > 0 && out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn with_prefix(&self, prefix: &[u8]) -> Self {
        Self {
            store: self.store.clone(),
            key_prefix: self.key_prefix.clone(),
            internal_prefix: [self.internal_prefix.as_slice(), prefix].concat(),
            current_root: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use trustreg_core::MemStore;
    use trustreg_crypto::SparseMerkleTree;

    fn leaf(k: u64) -> Node {
        Node::Leaf {
            key: Fr::from(k),
            value: Fr::from(k),
        }
    }

    #[test]
    fn test_get_missing_is_none() {
        let storage = TreeStorage::new(MemStore::new(), b"tree/");
        assert_eq!(storage.get(b"nothing").unwrap(), None);
    }

    #[test]
    fn test_put_get_under_prefixes() {
        let store = MemStore::new();
        let mut storage = TreeStorage::new(store.clone(), b"tree/");
        storage.put(b"k1", &leaf(1)).unwrap();
        assert_eq!(storage.get(b"k1").unwrap(), Some(leaf(1)));
        assert!(store.get(b"tree/k1").is_some());

        let mut sub = storage.with_prefix(b"sub/");
        sub.put(b"k2", &leaf(2)).unwrap();
        assert!(store.get(b"tree/sub/k2").is_some());
        assert_eq!(sub.get(b"k1").unwrap(), None);
    }

    #[test]
    fn test_root_roundtrip_and_layout() {
        let store = MemStore::new();
        let mut storage = TreeStorage::new(store.clone(), b"tree/");
        assert_eq!(storage.get_root().unwrap(), None);

        let root = NodeHash(Fr::from(77u64));
        storage.set_root(root).unwrap();
        assert_eq!(store.get(b"tree/root"), Some(root.to_hex().into_bytes()));

        let mut fresh = TreeStorage::new(store, b"tree/");
        assert_eq!(fresh.get_root().unwrap(), Some(root));
    }

    #[test]
    fn test_root_cached_per_instance() {
        let store = MemStore::new();
        let mut storage = TreeStorage::new(store.clone(), b"tree/");
        let root = NodeHash(Fr::from(1u64));
        storage.set_root(root).unwrap();
        assert_eq!(storage.get_root().unwrap(), Some(root));

        // A write behind the adapter's back is not observed by the warm cache.
        store.set(b"tree/root", NodeHash(Fr::from(2u64)).to_hex().into_bytes());
        assert_eq!(storage.get_root().unwrap(), Some(root));

        let mut cold = TreeStorage::new(store, b"tree/");
        assert_eq!(cold.get_root().unwrap(), Some(NodeHash(Fr::from(2u64))));
    }

    #[test]
    fn test_with_prefix_starts_cold() {
        let mut storage = TreeStorage::new(MemStore::new(), b"tree/");
        storage.set_root(NodeHash(Fr::from(5u64))).unwrap();
        let mut sub = storage.with_prefix(b"sub/");
        assert_eq!(sub.get_root().unwrap(), None);
    }

    #[test]
    fn test_corrupt_root_is_error() {
        let store = MemStore::new();
        store.set(b"tree/root", b"not-hex".to_vec());
        let mut storage = TreeStorage::new(store, b"tree/");
        assert!(matches!(storage.get_root(), Err(TreeError::InvalidRoot(_))));
    }

    #[test]
    fn test_corrupt_node_is_error() {
        let store = MemStore::new();
        store.set(b"tree/k", vec![9, 9]);
        let storage = TreeStorage::new(store, b"tree/");
        assert!(matches!(storage.get(b"k"), Err(TreeError::InvalidNode(_))));
    }

    #[test]
    fn test_iterate_strips_prefixes_and_stops() {
        let store = MemStore::new();
        let mut storage = TreeStorage::new(store.clone(), b"tree/");
        for i in 1..=5u8 {
            storage.put(&[i], &leaf(u64::from(i))).unwrap();
        }
        storage.set_root(NodeHash(Fr::from(1u64))).unwrap();
        store.set(b"other/x", vec![1]);

        let mut seen = Vec::new();
        storage
            .iterate(&mut |k, _| {
                seen.push(k.to_vec());
                if seen.len() == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(seen, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_list_limit_and_root_skipped() {
        let mut storage = TreeStorage::new(MemStore::new(), b"tree/");
        for i in 1..=4u8 {
            storage.put(&[i], &leaf(u64::from(i))).unwrap();
        }
        storage.set_root(NodeHash(Fr::from(3u64))).unwrap();
        assert_eq!(storage.list(0).unwrap().len(), 4);
        let two = storage.list(2).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].0, vec![1]);
    }

    #[test]
    fn test_backs_a_tree() {
        let store = MemStore::new();
        let mut tree = SparseMerkleTree::new(TreeStorage::new(store.clone(), b"tree/"), 32).unwrap();
        tree.add(Fr::from(3u64), Fr::from(4u64)).unwrap();
        tree.add(Fr::from(8u64), Fr::from(9u64)).unwrap();
        let root = tree.root();

        let reopened = SparseMerkleTree::new(TreeStorage::new(store, b"tree/"), 32).unwrap();
        assert_eq!(reopened.root(), root);
        assert_eq!(reopened.get(Fr::from(8u64)).unwrap(), Some(Fr::from(9u64)));
    }
}
