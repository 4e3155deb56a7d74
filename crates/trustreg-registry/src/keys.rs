//! Store key layout: one flat namespace, one prefix per entity kind.
//!
//! Keys within a prefix are the raw 20-byte address or the verification id,
//! so iteration order is address/id order.

/// Operator records, keyed by operator address.
pub const OPERATOR_DETAILS: &[u8] = b"operator-details/";
/// Issuer records, keyed by issuer address.
pub const ISSUER_DETAILS: &[u8] = b"issuer-details/";
/// Address records, keyed by account address.
pub const ADDRESS_DETAILS: &[u8] = b"address-details/";
/// Verification records, keyed by verification id.
pub const VERIFICATION_DETAILS: &[u8] = b"verification-details/";
/// Holder public key `x` coordinates, keyed by account address.
pub const HOLDER_PUBLIC_KEYS: &[u8] = b"holder-public-keys/";
/// Verification id to holder address.
pub const VERIFICATION_TO_HOLDER: &[u8] = b"verification-to-holder/";
/// Verification id to holder public key.
pub const VERIFICATION_TO_PUBKEY: &[u8] = b"verification-to-pubkey/";
/// Issuance tree nodes.
pub const ISSUANCE_TREE: &[u8] = b"issuance-tree/";
/// Revocation tree nodes.
pub const REVOCATION_TREE: &[u8] = b"revocation-tree/";
/// Registry parameters.
pub const PARAMS: &[u8] = b"params";

/// Reserved key holding a tree's root, relative to the tree prefix.
pub const TREE_ROOT: &[u8] = b"root";
