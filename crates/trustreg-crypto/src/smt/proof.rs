//! Membership proofs and their circuit-facing layout.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use super::node::{leaf_hash, path_bits, Node, NodeHash};

/// The leaf found where a missing key's path ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAux {
    /// Key of the leaf occupying the path.
    pub key: NodeHash,
    /// Value of that leaf.
    pub value: NodeHash,
}

/// A membership (`existence`) or non-membership proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Whether the key is in the tree.
    pub existence: bool,
    /// Sibling hashes from the root downwards.
    pub siblings: Vec<NodeHash>,
    /// For non-membership, the leaf that ends the path, if any.
    pub node_aux: Option<NodeAux>,
}

impl Proof {
    pub(crate) fn present(siblings: Vec<NodeHash>) -> Self {
        Self {
            existence: true,
            siblings,
            node_aux: None,
        }
    }

    pub(crate) fn absent(siblings: Vec<NodeHash>, node_aux: Option<NodeAux>) -> Self {
        Self {
            existence: false,
            siblings,
            node_aux,
        }
    }

    /// Fold the siblings over `key`'s path starting from the bottom node
    /// this proof commits to.
    pub fn root_from_proof(&self, key: Fr, value: Fr) -> Option<NodeHash> {
        let mut current = if self.existence {
            leaf_hash(key, value)
        } else {
            match &self.node_aux {
                Some(aux) if aux.key.0 == key => return None,
                Some(aux) => leaf_hash(aux.key.0, aux.value.0),
                None => NodeHash::zero(),
            }
        };
        let path = path_bits(&key, self.siblings.len());
        for (sibling, going_right) in self.siblings.iter().zip(path).rev() {
            let middle = if going_right {
                Node::Middle {
                    left: *sibling,
                    right: current,
                }
            } else {
                Node::Middle {
                    left: current,
                    right: *sibling,
                }
            };
            current = middle.hash();
        }
        Some(current)
    }
}

/// Check `proof` for `(key, value)` against `root`.
///
/// For non-membership proofs `value` is ignored.
pub fn verify_proof(root: NodeHash, proof: &Proof, key: Fr, value: Fr) -> bool {
    proof.root_from_proof(key, value) == Some(root)
}

/// Proof flattened into the signal layout of the circom SMT verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircomVerifierProof {
    /// Root the proof was generated against.
    pub root: NodeHash,
    /// Siblings padded with zeros to `levels + 1`.
    pub siblings: Vec<NodeHash>,
    /// Auxiliary leaf key; zero when `is_old0`.
    pub old_key: NodeHash,
    /// Auxiliary leaf value; zero when `is_old0`.
    pub old_value: NodeHash,
    /// Whether the path ended at an empty node.
    pub is_old0: bool,
    /// Queried key.
    pub key: NodeHash,
    /// Stored value; for non-membership, the auxiliary leaf value or zero.
    pub value: NodeHash,
    /// `0` for membership, `1` for non-membership.
    pub fnc: u8,
}

impl CircomVerifierProof {
    /// Back to a [`Proof`], dropping the zero padding.
    pub fn to_proof(&self) -> Proof {
        let mut siblings = self.siblings.clone();
        while siblings.last().is_some_and(NodeHash::is_zero) {
            siblings.pop();
        }
        if self.fnc == 0 {
            return Proof::present(siblings);
        }
        let node_aux = (!self.is_old0).then_some(NodeAux {
            key: self.old_key,
            value: self.old_value,
        });
        Proof::absent(siblings, node_aux)
    }

    /// Check the proof against its own root.
    pub fn verify(&self) -> bool {
        verify_proof(self.root, &self.to_proof(), self.key.0, self.value.0)
    }
}
