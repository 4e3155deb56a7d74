//! # trustreg-crypto — Arithmetic Cryptography
//!
//! Provides the circuit-friendly building blocks behind credential proofs:
//!
//! - **BN254 field** conversions between bytes, decimal strings and `Fr`.
//! - **MiMC7** hashing for credential commitments and tree nodes.
//! - **BabyJubJub** public key decompression for holder keys.
//! - **Sparse Merkle Tree** with membership and non-membership proofs in
//!   the layout circom verifiers consume.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `trustreg-*` crates. Persistence enters
//!   through the [`smt::MerkleStorage`] trait.
//! - Byte-to-field conversions reject out-of-range input instead of
//!   reducing it.
//! - No mocking of cryptographic operations in tests.

pub mod babyjub;
pub mod field;
pub mod mimc7;
pub mod smt;

pub use babyjub::{extract_x_coordinate, PublicKey, PublicKeyError};
pub use field::{fr_from_be_bytes, fr_from_decimal, fr_to_be_bytes, fr_to_decimal, FieldError};
pub use smt::{
    verify_proof, CircomVerifierProof, MerkleStorage, Node, NodeAux, NodeHash, Proof,
    SparseMerkleTree, TreeError,
};

/// The BN254 scalar field element type used throughout the workspace.
pub use ark_bn254::Fr;
