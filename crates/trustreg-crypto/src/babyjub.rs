//! # BabyJubJub Public Keys
//!
//! Holders register an EdDSA public key on the BabyJubJub twisted Edwards
//! curve (`168700·x² + y² = 1 + 168696·x²·y²` over the BN254 scalar field).
//! Keys arrive in the 32-byte compressed form: little-endian `y` with the
//! top bit set when `x` lies in the upper half of the field.
//!
//! Curve arithmetic and point recovery come from `ark-babyjubjub`, whose
//! compressed encoding uses the same layout; [`PublicKey`] only adds the
//! registry's error reporting on top of it.
//!
//! The registry never stores the compressed form. It decompresses the key,
//! which proves the point is on the curve, and keeps the `x` coordinate: the
//! value credential circuits take as the holder identifier.

use ark_babyjubjub::EdwardsAffine;
use ark_bn254::Fr;
use ark_ff::Zero;
use ark_serialize::CanonicalDeserialize;
use thiserror::Error;

use crate::field::{fr_from_le_bytes, fr_to_be_bytes, fr_to_le_bytes};

const SIGN_BIT: u8 = 0x80;

/// Error parsing a compressed public key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyError {
    /// Compressed keys are exactly 32 bytes.
    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    /// The encoded `y` coordinate is not a field element.
    #[error("invalid public key: y coordinate is not below the field modulus")]
    YOutOfField,

    /// No curve point has the encoded coordinates.
    #[error("invalid public key: point is not on the curve")]
    NotOnCurve,
}

/// A BabyJubJub point in affine form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(EdwardsAffine);

impl PublicKey {
    /// Point from affine coordinates; rejects coordinates off the curve.
    pub fn from_coordinates(x: Fr, y: Fr) -> Result<Self, PublicKeyError> {
        let point = EdwardsAffine::new_unchecked(x, y);
        if !point.is_on_curve() {
            return Err(PublicKeyError::NotOnCurve);
        }
        Ok(Self(point))
    }

    /// Decompress a 32-byte key.
    pub fn decompress(compressed: &[u8]) -> Result<Self, PublicKeyError> {
        let bytes: [u8; 32] = compressed
            .try_into()
            .map_err(|_| PublicKeyError::InvalidLength(compressed.len()))?;

        let mut y_bytes = bytes;
        y_bytes[31] &= !SIGN_BIT;
        fr_from_le_bytes(&y_bytes).map_err(|_| PublicKeyError::YOutOfField)?;

        let point = EdwardsAffine::deserialize_compressed_unchecked(&bytes[..])
            .map_err(|_| PublicKeyError::NotOnCurve)?;
        // x = 0 has no negative counterpart; a set sign bit is a bad encoding.
        if !point.is_on_curve() || (point.x.is_zero() && bytes[31] & SIGN_BIT != 0) {
            return Err(PublicKeyError::NotOnCurve);
        }
        Ok(Self(point))
    }

    /// The 32-byte compressed encoding.
    pub fn compress(&self) -> [u8; 32] {
        let mut out = fr_to_le_bytes(&self.0.y);
        if self.0.x > -self.0.x {
            out[31] |= SIGN_BIT;
        }
        out
    }

    /// Affine `x` coordinate.
    pub fn x(&self) -> Fr {
        self.0.x
    }

    /// Affine `y` coordinate.
    pub fn y(&self) -> Fr {
        self.0.y
    }

    /// The underlying curve point.
    pub fn point(&self) -> &EdwardsAffine {
        &self.0
    }
}

/// Validate a compressed key and return its `x` coordinate as 32
/// big-endian bytes.
pub fn extract_x_coordinate(compressed: &[u8]) -> Result<[u8; 32], PublicKeyError> {
    PublicKey::decompress(compressed).map(|pk| fr_to_be_bytes(&pk.x()))
}
