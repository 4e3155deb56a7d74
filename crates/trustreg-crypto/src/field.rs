//! # BN254 Scalar Field Helpers
//!
//! Conversions between byte strings, decimal strings and elements of the
//! BN254 scalar field `Fr`, the field every arithmetic hash and tree node in
//! this crate lives in.
//!
//! Conversions are strict: a byte string that encodes an integer at or above
//! the field modulus is rejected instead of silently reduced. Credential
//! hashes, issuer addresses and holder keys all enter the field through
//! these functions.

use ark_bn254::Fr;
use ark_ff::{BigInt, BigInteger, PrimeField};
use thiserror::Error;

/// Error converting into a field element.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Input longer than 32 bytes.
    #[error("expected at most 32 bytes, got {0}")]
    TooLong(usize),

    /// Integer is not below the BN254 scalar field modulus.
    #[error("value is not below the BN254 scalar field modulus")]
    OutOfField,

    /// String is not a base-10 unsigned integer.
    #[error("invalid decimal field element: {0:?}")]
    InvalidDecimal(String),
}

/// Parse 32 little-endian bytes, rejecting values `>= q`.
pub fn fr_from_le_bytes(bytes: &[u8; 32]) -> Result<Fr, FieldError> {
    let mut limbs = [0u64; 4];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *limb = u64::from_le_bytes(buf);
    }
    Fr::from_bigint(BigInt::new(limbs)).ok_or(FieldError::OutOfField)
}

/// Parse up to 32 big-endian bytes, rejecting values `>= q`.
///
/// Shorter inputs are left-padded, so a 20-byte address maps to the same
/// integer it represents.
pub fn fr_from_be_bytes(bytes: &[u8]) -> Result<Fr, FieldError> {
    if bytes.len() > 32 {
        return Err(FieldError::TooLong(bytes.len()));
    }
    let mut le = [0u8; 32];
    for (dst, src) in le.iter_mut().zip(bytes.iter().rev()) {
        *dst = *src;
    }
    fr_from_le_bytes(&le)
}

/// Canonical 32-byte little-endian encoding.
pub fn fr_to_le_bytes(x: &Fr) -> [u8; 32] {
    let bytes = x.into_bigint().to_bytes_le();
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(&bytes);
    out
}

/// Canonical 32-byte big-endian encoding.
pub fn fr_to_be_bytes(x: &Fr) -> [u8; 32] {
    let mut out = fr_to_le_bytes(x);
    out.reverse();
    out
}

/// Base-10 representation, the format circuit inputs are exchanged in.
pub fn fr_to_decimal(x: &Fr) -> String {
    let mut limbs = x.into_bigint().0;
    if limbs.iter().all(|l| *l == 0) {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while limbs.iter().any(|l| *l != 0) {
        let mut rem: u128 = 0;
        for limb in limbs.iter_mut().rev() {
            let cur = (rem << 64) | u128::from(*limb);
            *limb = (cur / 10) as u64;
            rem = cur % 10;
        }
        digits.push(b'0' + rem as u8);
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Parse a base-10 string, rejecting values `>= q`.
pub fn fr_from_decimal(s: &str) -> Result<Fr, FieldError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::InvalidDecimal(s.to_string()));
    }
    let mut limbs = [0u64; 4];
    for digit in s.bytes().map(|b| u128::from(b - b'0')) {
        let mut carry = digit;
        for limb in limbs.iter_mut() {
            let cur = u128::from(*limb) * 10 + carry;
            *limb = cur as u64;
            carry = cur >> 64;
        }
        if carry != 0 {
            return Err(FieldError::OutOfField);
        }
    }
    Fr::from_bigint(BigInt::new(limbs)).ok_or(FieldError::OutOfField)
}

/// Serde adapter encoding `Fr` as a decimal string.
pub mod serde_decimal {
    use ark_bn254::Fr;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as a decimal string.
    pub fn serialize<S: Serializer>(x: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::fr_to_decimal(x))
    }

    /// Deserialize from a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::fr_from_decimal(&s).map_err(serde::de::Error::custom)
    }
}
