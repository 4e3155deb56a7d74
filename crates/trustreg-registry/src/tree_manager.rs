//! # Credential Tree Manager
//!
//! Owns the two credential trees:
//!
//! - **Issuance**: every credential hash accepted by the registry.
//! - **Revocation**: every credential hash revoked since. It also holds a
//!   zero leaf from the first issuance onwards, so non-membership proofs
//!   always have a non-empty tree to point into.
//!
//! A credential hash `h` is committed as the leaf `(mimc7([h]), h)`.
//! Proofs are returned in the circom verifier layout.

use ark_bn254::Fr;
use ark_ff::Zero;
use trustreg_core::KvStore;
use trustreg_crypto::{mimc7, CircomVerifierProof, NodeHash, SparseMerkleTree};

use crate::error::RegistryError;
use crate::keys;
use crate::tree_storage::TreeStorage;

/// Which credential tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    /// Accepted credentials.
    Issuance,
    /// Revoked credentials.
    Revocation,
}

impl TreeKind {
    /// Store prefix of the tree.
    pub fn prefix(&self) -> &'static [u8] {
        match self {
            Self::Issuance => keys::ISSUANCE_TREE,
            Self::Revocation => keys::REVOCATION_TREE,
        }
    }
}

impl std::fmt::Display for TreeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issuance => f.write_str("issuance"),
            Self::Revocation => f.write_str("revocation"),
        }
    }
}

/// Leaf key under which credential hash `h` is committed.
pub fn credential_key(credential_hash: Fr) -> Fr {
    mimc7::hash(&[credential_hash], Fr::zero())
}

/// Read and write access to the issuance and revocation trees.
#[derive(Debug, Clone)]
pub struct CredentialTreeManager<S> {
    store: S,
    depth: usize,
}

impl<S: KvStore + Clone> CredentialTreeManager<S> {
    /// Manager over `store` with trees of `depth` levels.
    pub fn new(store: S, depth: usize) -> Self {
        Self { store, depth }
    }

    fn open(&self, kind: TreeKind) -> Result<SparseMerkleTree<TreeStorage<S>>, RegistryError> {
        let storage = TreeStorage::new(self.store.clone(), kind.prefix());
        Ok(SparseMerkleTree::new(storage, self.depth)?)
    }

    /// Current issuance root; zero for an empty tree.
    pub fn issuance_root(&self) -> Result<NodeHash, RegistryError> {
        Ok(self.open(TreeKind::Issuance)?.root())
    }

    /// Current revocation root; zero for an empty tree.
    pub fn revocation_root(&self) -> Result<NodeHash, RegistryError> {
        Ok(self.open(TreeKind::Revocation)?.root())
    }

    /// Membership proof of `credential_hash` in the issuance tree.
    ///
    /// For a credential that was never issued the proof is a valid
    /// non-membership proof (`fnc == 1`).
    pub fn generate_issuance_proof(
        &self,
        credential_hash: Fr,
    ) -> Result<CircomVerifierProof, RegistryError> {
        let tree = self.open(TreeKind::Issuance)?;
        Ok(tree.generate_circom_verifier_proof(credential_key(credential_hash))?)
    }

    /// Non-membership proof of `credential_hash` in the revocation tree.
    pub fn generate_non_revocation_proof(
        &self,
        credential_hash: Fr,
    ) -> Result<CircomVerifierProof, RegistryError> {
        let tree = self.open(TreeKind::Revocation)?;
        Ok(tree.generate_circom_verifier_proof(credential_key(credential_hash))?)
    }

    /// Commit `credential_hash` to the issuance tree.
    ///
    /// Committing the same hash again is a no-op.
    pub fn add_credential_hash_to_issued(&self, credential_hash: Fr) -> Result<(), RegistryError> {
        self.ensure_revocation_zero_leaf()?;

        let mut tree = self.open(TreeKind::Issuance)?;
        let key = credential_key(credential_hash);
        match tree.get(key)? {
            Some(existing) if existing == credential_hash => {
                tracing::debug!(tree = %TreeKind::Issuance, "credential already committed");
                Ok(())
            }
            Some(_) => Err(RegistryError::BadRequest(
                "credential key already committed with a different value".to_string(),
            )),
            None => {
                tree.add(key, credential_hash)?;
                tracing::debug!(tree = %TreeKind::Issuance, root = %tree.root(), "credential committed");
                Ok(())
            }
        }
    }

    /// Commit `credential_hash` to the revocation tree.
    pub fn mark_credential_hash_as_revoked(&self, credential_hash: Fr) -> Result<(), RegistryError> {
        let mut tree = self.open(TreeKind::Revocation)?;
        let key = credential_key(credential_hash);
        if tree.get(key)?.is_some() {
            return Err(RegistryError::InvalidParam(
                "credential is already revoked".to_string(),
            ));
        }
        tree.add(key, credential_hash)?;
        tracing::debug!(tree = %TreeKind::Revocation, root = %tree.root(), "credential revoked");
        Ok(())
    }

    /// Whether `credential_hash` is in the issuance tree.
    pub fn is_included_in_issuance_tree(&self, credential_hash: Fr) -> Result<bool, RegistryError> {
        let tree = self.open(TreeKind::Issuance)?;
        Ok(tree.get(credential_key(credential_hash))?.is_some())
    }

    fn ensure_revocation_zero_leaf(&self) -> Result<(), RegistryError> {
        let mut tree = self.open(TreeKind::Revocation)?;
        if tree.get(Fr::zero())?.is_none() {
            tree.add(Fr::zero(), Fr::zero())?;
        }
        Ok(())
    }
}
