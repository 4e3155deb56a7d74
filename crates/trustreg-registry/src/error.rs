//! # Registry Errors
//!
//! Every registry failure carries one of the module's registered error
//! classes with a stable numeric code, so the host can surface it to
//! clients unchanged. Code 1 is reserved for internal errors.

use thiserror::Error;
use trustreg_core::{CanonicalizationError, CodecError, ConfigError};
use trustreg_crypto::{FieldError, TreeError};

/// Broad category of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input; rejected before any state is read.
    Validation,
    /// The request is well formed but conflicts with current state.
    Invariant,
    /// Storage or cryptographic plumbing failed.
    Internal,
}

/// Error returned by keeper, message and query operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Request conflicts with stored links or tree contents.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Signature does not verify.
    #[error("invalid signature detected: {0}")]
    InvalidSignature(String),

    /// Signature is required but missing.
    #[error("signature is required but not found: {0}")]
    SignatureNotFound(String),

    /// Input failed syntactic validation.
    #[error("basic validation failed: {0}")]
    BasicValidation(String),

    /// A parameter is out of range or conflicts with state.
    #[error("invalid param provided: {0}")]
    InvalidParam(String),

    /// Signer lacks the required role.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Operator is unknown or of the wrong kind.
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// Signer is neither an operator nor the issuer's operator.
    #[error("signer is not operator or issuer creator: {0}")]
    NotOperatorOrIssuerCreator(String),

    /// Issuer is unknown or not verified.
    #[error("invalid issuer: {0}")]
    InvalidIssuer(String),

    /// A stored key has an unexpected shape.
    #[error("internal error: {0}")]
    Internal(String),

    /// Record encode/decode failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Canonical serialization failure.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    /// Invalid registry parameters.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sparse Merkle tree failure.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Value does not fit the BN254 scalar field.
    #[error(transparent)]
    Field(#[from] FieldError),
}

impl RegistryError {
    /// Registered numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::BadRequest(_) => 2,
            Self::InvalidSignature(_) => 3,
            Self::SignatureNotFound(_) => 4,
            Self::BasicValidation(_) => 5,
            Self::InvalidParam(_) => 6,
            Self::NotAuthorized(_) => 7,
            Self::InvalidOperator(_) => 8,
            Self::NotOperatorOrIssuerCreator(_) => 9,
            Self::InvalidIssuer(_) => 10,
            Self::Internal(_)
            | Self::Codec(_)
            | Self::Canonicalization(_)
            | Self::Config(_)
            | Self::Tree(_)
            | Self::Field(_) => 1,
        }
    }

    /// Category of the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BasicValidation(_) | Self::InvalidSignature(_) | Self::SignatureNotFound(_) => {
                ErrorClass::Validation
            }
            Self::BadRequest(_)
            | Self::InvalidParam(_)
            | Self::NotAuthorized(_)
            | Self::InvalidOperator(_)
            | Self::NotOperatorOrIssuerCreator(_)
            | Self::InvalidIssuer(_) => ErrorClass::Invariant,
            _ => ErrorClass::Internal,
        }
    }
}

/// Genesis import failure. The host treats it as fatal: a snapshot that
/// does not import is corrupt.
#[derive(Error, Debug)]
#[error("invalid genesis {section}[{index}]: {source}")]
pub struct GenesisError {
    /// Snapshot section that failed.
    pub section: &'static str,
    /// Position of the failing entry within its section.
    pub index: usize,
    /// Underlying error.
    #[source]
    pub source: RegistryError,
}

impl GenesisError {
    pub(crate) fn at(section: &'static str, index: usize) -> impl FnOnce(RegistryError) -> Self {
        move |source| Self {
            section,
            index,
            source,
        }
    }
}
