//! Tree nodes, node hashes and their storage encoding.

use std::fmt;

use ark_bn254::Fr;
use ark_ff::{One, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::TreeError;
use crate::field::{fr_from_decimal, fr_from_le_bytes, fr_to_decimal, fr_to_le_bytes};
use crate::mimc7;

const TAG_MIDDLE: u8 = 0;
const TAG_LEAF: u8 = 1;
const TAG_EMPTY: u8 = 2;

/// A field element used as a node hash, leaf key or leaf value.
///
/// Stored as 32 little-endian bytes, displayed as hex of those bytes and
/// serialized as a decimal string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeHash(pub Fr);

impl NodeHash {
    /// The hash of the empty node.
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    /// Whether this is the empty-node hash.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Storage encoding.
    pub fn to_le_bytes(&self) -> [u8; 32] {
        fr_to_le_bytes(&self.0)
    }

    /// Decode the storage encoding.
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Result<Self, TreeError> {
        Ok(Self(fr_from_le_bytes(bytes)?))
    }

    /// Hex of the little-endian bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_le_bytes())
    }

    /// Parse the hex form produced by [`NodeHash::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, TreeError> {
        let bytes = hex::decode(s).map_err(|e| TreeError::InvalidRoot(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| TreeError::InvalidRoot(format!("expected 32 bytes, got {}", b.len())))?;
        Self::from_le_bytes(&bytes)
    }
}

impl From<Fr> for NodeHash {
    fn from(x: Fr) -> Self {
        Self(x)
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", fr_to_decimal(&self.0))
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fr_to_decimal(&self.0))
    }
}

impl Serialize for NodeHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fr_to_decimal(&self.0))
    }
}

impl<'de> Deserialize<'de> for NodeHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        fr_from_decimal(&s).map(Self).map_err(serde::de::Error::custom)
    }
}

/// A sparse Merkle tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Empty subtree.
    Empty,
    /// A single entry.
    Leaf {
        /// Entry index; its bits select the path.
        key: Fr,
        /// Entry value.
        value: Fr,
    },
    /// Internal node with two children.
    Middle {
        /// Hash of the child on the 0-bit side.
        left: NodeHash,
        /// Hash of the child on the 1-bit side.
        right: NodeHash,
    },
}

impl Node {
    /// Node hash: zero for `Empty`, `H(key, value, 1)` for leaves,
    /// `H(left, right)` for middle nodes.
    pub fn hash(&self) -> NodeHash {
        match self {
            Self::Empty => NodeHash::zero(),
            Self::Leaf { key, value } => leaf_hash(*key, *value),
            Self::Middle { left, right } => {
                NodeHash(mimc7::hash(&[left.0, right.0], Fr::zero()))
            }
        }
    }

    /// Storage encoding: a type tag followed by two 32-byte fields.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (tag, a, b) = match self {
            Self::Empty => return vec![TAG_EMPTY],
            Self::Leaf { key, value } => (TAG_LEAF, fr_to_le_bytes(key), fr_to_le_bytes(value)),
            Self::Middle { left, right } => (TAG_MIDDLE, left.to_le_bytes(), right.to_le_bytes()),
        };
        let mut out = Vec::with_capacity(65);
        out.push(tag);
        out.extend_from_slice(&a);
        out.extend_from_slice(&b);
        out
    }

    /// Decode the storage encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeError> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or_else(|| TreeError::InvalidNode("empty node encoding".to_string()))?;
        if tag == TAG_EMPTY {
            return if body.is_empty() {
                Ok(Self::Empty)
            } else {
                Err(TreeError::InvalidNode("empty node with payload".to_string()))
            };
        }
        if body.len() != 64 {
            return Err(TreeError::InvalidNode(format!(
                "expected 64 payload bytes, got {}",
                body.len()
            )));
        }
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a.copy_from_slice(&body[..32]);
        b.copy_from_slice(&body[32..]);
        match tag {
            TAG_LEAF => Ok(Self::Leaf {
                key: fr_from_le_bytes(&a)?,
                value: fr_from_le_bytes(&b)?,
            }),
            TAG_MIDDLE => Ok(Self::Middle {
                left: NodeHash::from_le_bytes(&a)?,
                right: NodeHash::from_le_bytes(&b)?,
            }),
            other => Err(TreeError::InvalidNode(format!("unknown node type {other}"))),
        }
    }
}

/// Hash of a leaf holding `(key, value)`.
pub fn leaf_hash(key: Fr, value: Fr) -> NodeHash {
    NodeHash(mimc7::hash(&[key, value, Fr::one()], Fr::zero()))
}

/// Path bits for `key`: bit `i` of the little-endian key bytes, `true`
/// meaning "go right" at level `i`.
pub fn path_bits(key: &Fr, levels: usize) -> Vec<bool> {
    let bytes = fr_to_le_bytes(key);
    (0..levels)
        .map(|i| bytes.get(i / 8).map_or(false, |b| b & (1 << (i % 8)) != 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_bytes_roundtrip() {
        let nodes = [
            Node::Empty,
            Node::Leaf {
                key: Fr::from(5u64),
                value: Fr::from(9u64),
            },
            Node::Middle {
                left: NodeHash(Fr::from(1u64)),
                right: NodeHash(Fr::from(2u64)),
            },
        ];
        for node in nodes {
            assert_eq!(Node::from_bytes(&node.to_bytes()).unwrap(), node);
        }
    }

    #[test]
    fn test_truncated_node_rejected() {
        let mut bytes = Node::Leaf {
            key: Fr::from(1u64),
            value: Fr::from(1u64),
        }
        .to_bytes();
        bytes.pop();
        assert!(matches!(Node::from_bytes(&bytes), Err(TreeError::InvalidNode(_))));
        assert!(matches!(Node::from_bytes(&[]), Err(TreeError::InvalidNode(_))));
        assert!(matches!(Node::from_bytes(&[7; 65]), Err(TreeError::InvalidNode(_))));
    }

    #[test]
    fn test_empty_hash_is_zero() {
        assert!(Node::Empty.hash().is_zero());
    }

    #[test]
    fn test_leaf_and_middle_hash_differ() {
        let a = Fr::from(3u64);
        let b = Fr::from(4u64);
        let leaf = Node::Leaf { key: a, value: b }.hash();
        let middle = Node::Middle {
            left: NodeHash(a),
            right: NodeHash(b),
        }
        .hash();
        assert_ne!(leaf, middle);
    }

    #[test]
    fn test_path_bits_little_endian() {
        // 0b0000_0110 -> levels 1 and 2 go right.
        let path = path_bits(&Fr::from(6u64), 4);
        assert_eq!(path, vec![false, true, true, false]);
        let path = path_bits(&Fr::from(256u64), 10);
        assert!(path[8]);
        assert_eq!(path.iter().filter(|b| **b).count(), 1);
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = NodeHash(Fr::from(0xabcdu64));
        assert_eq!(h.to_hex().len(), 64);
        assert!(h.to_hex().starts_with("cdab"));
        assert_eq!(NodeHash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(NodeHash::from_hex("zz").is_err());
        assert!(NodeHash::from_hex("00").is_err());
    }

    #[test]
    fn test_serde_decimal() {
        let h = NodeHash(Fr::from(42u64));
        assert_eq!(serde_json::to_string(&h).unwrap(), "\"42\"");
        let back: NodeHash = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(back, h);
    }
}
