//! # MiMC7 — Arithmetic Hash over BN254
//!
//! The hash used for credential commitments, tree keys and tree nodes. It
//! is cheap to prove inside an arithmetic circuit, which is why the tree
//! uses it instead of keccak or SHA-256.
//!
//! ## Algorithm
//!
//! - 91 rounds; round constant 0 is zero.
//! - Constants: `c = keccak256("mimc")`, then for each round
//!   `c = keccak256(minimal_big_endian(c))` and `cts[i] = c mod q`.
//! - Permutation `mimc7(x, k)`: `t = x + k` in round 0 and
//!   `t = r + k + cts[i]` after, `r = t^7`; output `r + k`.
//! - Multi-input `hash(xs, key)`: `r = key`, then for each `x`,
//!   `r = r + x + mimc7(x, r)`.
//!
//! Constants are derived once per process and cached.

use std::sync::OnceLock;

use alloy_primitives::keccak256;
use ark_bn254::Fr;
use ark_ff::{Field, PrimeField, Zero};

const SEED: &[u8] = b"mimc";

/// Number of rounds of the permutation.
pub const ROUNDS: usize = 91;

fn round_constants() -> &'static [Fr] {
    static CONSTANTS: OnceLock<Vec<Fr>> = OnceLock::new();
    CONSTANTS.get_or_init(|| {
        let mut cts = Vec::with_capacity(ROUNDS);
        cts.push(Fr::zero());
        let mut c = keccak256(SEED);
        for _ in 1..ROUNDS {
            let first_nonzero = c.iter().position(|b| *b != 0).unwrap_or(c.len());
            c = keccak256(&c[first_nonzero..]);
            cts.push(Fr::from_be_bytes_mod_order(c.as_slice()));
        }
        cts
    })
}

/// The MiMC7 permutation of `x` under key `k`.
pub fn mimc7(x: Fr, k: Fr) -> Fr {
    let mut r = Fr::zero();
    for (i, c) in round_constants().iter().enumerate() {
        let t = if i == 0 { x + k } else { r + k + c };
        let t2 = t.square();
        let t4 = t2.square();
        r = t4 * t2 * t;
    }
    r + k
}

/// Hash a sequence of field elements under `key`.
///
/// Order-sensitive: `hash([a, b])` and `hash([b, a])` differ.
pub fn hash(inputs: &[Fr], key: Fr) -> Fr {
    inputs
        .iter()
        .fold(key, |r, x| r + x + mimc7(*x, r))
}
