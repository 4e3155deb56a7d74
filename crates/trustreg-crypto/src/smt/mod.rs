//! # Sparse Merkle Tree
//!
//! Fixed-depth binary Merkle tree over the BN254 scalar field, hashed with
//! MiMC7. The registry keeps two of them (issuance and revocation) and hands
//! out membership and non-membership proofs that credential circuits verify.
//!
//! ## Structure
//!
//! - A leaf sits at the shallowest level where its path no longer collides
//!   with another leaf; empty subtrees hash to zero and are never stored.
//! - The path of a key is its little-endian bit string: bit `i` picks the
//!   right child at level `i`.
//! - Every stored node is addressed by its own hash. The current root is kept
//!   apart, through [`MerkleStorage::get_root`] / [`MerkleStorage::set_root`].
//!
//! ## Storage
//!
//! The tree never touches a database directly. It is generic over
//! [`MerkleStorage`], so one implementation of the algorithm serves every
//! namespaced tree the caller wants to keep.

mod node;
mod proof;

use std::ops::ControlFlow;

use ark_bn254::Fr;
use thiserror::Error;

use crate::field::FieldError;

pub use node::{leaf_hash, path_bits, Node, NodeHash};
pub use proof::{verify_proof, CircomVerifierProof, NodeAux, Proof};

/// Error in tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A leaf with the same key is already in the tree.
    #[error("entry index already exists in the tree")]
    KeyAlreadyExists,

    /// The key's path collides with another leaf down to the last level.
    #[error("reached maximum level of the tree")]
    ReachedMaxLevel,

    /// A node referenced by its parent is missing from storage.
    #[error("node {0} not found in storage")]
    NodeNotFound(String),

    /// Stored node bytes do not decode.
    #[error("invalid node encoding: {0}")]
    InvalidNode(String),

    /// Stored root does not decode.
    #[error("invalid root encoding: {0}")]
    InvalidRoot(String),

    /// A non-membership proof names a leaf carrying the very key it claims
    /// is absent.
    #[error("non-existence proof auxiliary node has the queried key")]
    AuxKeyMatches,

    /// Bytes are not a field element.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Storage contract a [`SparseMerkleTree`] runs on.
///
/// `get` and `get_root` report absence with `Ok(None)`; the tree treats an
/// absent root as the empty tree.
pub trait MerkleStorage {
    /// Node stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Node>, TreeError>;

    /// Store `node` under `key`.
    fn put(&mut self, key: &[u8], node: &Node) -> Result<(), TreeError>;

    /// Current root, if one was ever written.
    fn get_root(&mut self) -> Result<Option<NodeHash>, TreeError>;

    /// Replace the current root.
    fn set_root(&mut self, root: NodeHash) -> Result<(), TreeError>;

    /// Visit stored nodes in key order until the visitor breaks.
    fn iterate(
        &self,
        visitor: &mut dyn FnMut(&[u8], &Node) -> ControlFlow<()>,
    ) -> Result<(), TreeError>;

    /// Up to `limit` stored nodes in key order; `0` means no limit.
    fn list(&self, limit: usize) -> Result<Vec<(Vec<u8>, Node)>, TreeError>;

    /// A storage handle over the same backing store with `prefix` appended
    /// to the internal key prefix.
    fn with_prefix(&self, prefix: &[u8]) -> Self
    where
        Self: Sized;
}

/// A sparse Merkle tree of bounded depth.
#[derive(Debug)]
pub struct SparseMerkleTree<S> {
    storage: S,
    root: NodeHash,
    max_levels: usize,
}

impl<S: MerkleStorage> SparseMerkleTree<S> {
    /// Open the tree persisted in `storage`.
    ///
    /// Opening never writes: a storage without a root is the empty tree
    /// until the first insertion.
    pub fn new(mut storage: S, max_levels: usize) -> Result<Self, TreeError> {
        let root = storage.get_root()?.unwrap_or_else(NodeHash::zero);
        Ok(Self {
            storage,
            root,
            max_levels,
        })
    }

    /// Current root.
    pub fn root(&self) -> NodeHash {
        self.root
    }

    /// Maximum depth.
    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Release the underlying storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Insert `(key, value)`.
    ///
    /// # Errors
    ///
    /// `KeyAlreadyExists` if `key` is present (whatever its value),
    /// `ReachedMaxLevel` if the path collides to the bottom of the tree.
    pub fn add(&mut self, key: Fr, value: Fr) -> Result<(), TreeError> {
        let path = path_bits(&key, self.max_levels);
        let leaf = Node::Leaf { key, value };
        let root = self.add_leaf(leaf, self.root, 0, &path)?;
        self.root = root;
        self.storage.set_root(root)?;
        tracing::debug!(root = %root, "sparse merkle tree leaf added");
        Ok(())
    }

    /// Value stored under `key`, if present.
    pub fn get(&self, key: Fr) -> Result<Option<Fr>, TreeError> {
        let (_, value) = self.generate_proof(key)?;
        Ok(value)
    }

    /// Membership or non-membership proof for `key` against the current root,
    /// with the stored value when the key is present.
    pub fn generate_proof(&self, key: Fr) -> Result<(Proof, Option<Fr>), TreeError> {
        let path = path_bits(&key, self.max_levels);
        let mut siblings = Vec::new();
        let mut next = self.root;
        for going_right in path {
            match self.get_node(&next)? {
                Node::Empty => return Ok((Proof::absent(siblings, None), None)),
                Node::Leaf {
                    key: leaf_key,
                    value,
                } => {
                    if leaf_key == key {
                        return Ok((Proof::present(siblings), Some(value)));
                    }
                    let aux = NodeAux {
                        key: NodeHash(leaf_key),
                        value: NodeHash(value),
                    };
                    return Ok((Proof::absent(siblings, Some(aux)), None));
                }
                Node::Middle { left, right } => {
                    if going_right {
                        siblings.push(left);
                        next = right;
                    } else {
                        siblings.push(right);
                        next = left;
                    }
                }
            }
        }
        Err(TreeError::ReachedMaxLevel)
    }

    /// Proof in the flat layout circom verifiers consume: siblings padded
    /// with zeros to `max_levels + 1`, plus the auxiliary leaf fields.
    ///
    /// `value` is the stored value for membership proofs and the auxiliary
    /// leaf's value for non-membership proofs that end at a leaf.
    pub fn generate_circom_verifier_proof(&self, key: Fr) -> Result<CircomVerifierProof, TreeError> {
        let (proof, value) = self.generate_proof(key)?;
        let mut siblings = proof.siblings.clone();
        siblings.resize(self.max_levels + 1, NodeHash::zero());
        let (old_key, old_value, is_old0) = match proof.node_aux {
            Some(aux) => (aux.key, aux.value, false),
            None => (NodeHash::zero(), NodeHash::zero(), true),
        };
        let value = value.map_or(old_value, NodeHash);
        Ok(CircomVerifierProof {
            root: self.root,
            siblings,
            old_key,
            old_value,
            is_old0,
            key: NodeHash(key),
            value,
            fnc: if proof.existence { 0 } else { 1 },
        })
    }

    fn get_node(&self, hash: &NodeHash) -> Result<Node, TreeError> {
        if hash.is_zero() {
            return Ok(Node::Empty);
        }
        self.storage
            .get(&hash.to_le_bytes())?
            .ok_or_else(|| TreeError::NodeNotFound(hash.to_hex()))
    }

    fn put_node(&mut self, node: &Node) -> Result<NodeHash, TreeError> {
        let hash = node.hash();
        if !matches!(node, Node::Empty) {
            self.storage.put(&hash.to_le_bytes(), node)?;
        }
        Ok(hash)
    }

    fn add_leaf(
        &mut self,
        leaf: Node,
        current: NodeHash,
        level: usize,
        path: &[bool],
    ) -> Result<NodeHash, TreeError> {
        if level >= self.max_levels {
            return Err(TreeError::ReachedMaxLevel);
        }
        match self.get_node(&current)? {
            Node::Empty => self.put_node(&leaf),
            old @ Node::Leaf { key: old_key, .. } => {
                let Node::Leaf { key: new_key, .. } = leaf else {
                    return Err(TreeError::InvalidNode("inserted node is not a leaf".to_string()));
                };
                if old_key == new_key {
                    return Err(TreeError::KeyAlreadyExists);
                }
                let old_path = path_bits(&old_key, self.max_levels);
                self.push_leaf(leaf, old, level, path, &old_path)
            }
            Node::Middle { left, right } => {
                let middle = if path[level] {
                    let right = self.add_leaf(leaf, right, level + 1, path)?;
                    Node::Middle { left, right }
                } else {
                    let left = self.add_leaf(leaf, left, level + 1, path)?;
                    Node::Middle { left, right }
                };
                self.put_node(&middle)
            }
        }
    }

    // Push two colliding leaves down until their paths diverge.
    fn push_leaf(
        &mut self,
        new_leaf: Node,
        old_leaf: Node,
        level: usize,
        new_path: &[bool],
        old_path: &[bool],
    ) -> Result<NodeHash, TreeError> {
        if level + 2 > self.max_levels {
            return Err(TreeError::ReachedMaxLevel);
        }
        if new_path[level] == old_path[level] {
            let below = self.push_leaf(new_leaf, old_leaf, level + 1, new_path, old_path)?;
            let middle = if new_path[level] {
                Node::Middle {
                    left: NodeHash::zero(),
                    right: below,
                }
            } else {
                Node::Middle {
                    left: below,
                    right: NodeHash::zero(),
                }
            };
            return self.put_node(&middle);
        }
        let old_hash = old_leaf.hash();
        let new_hash = self.put_node(&new_leaf)?;
        let middle = if new_path[level] {
            Node::Middle {
                left: old_hash,
                right: new_hash,
            }
        } else {
            Node::Middle {
                left: new_hash,
                right: old_hash,
            }
        };
        self.put_node(&middle)
    }
}
