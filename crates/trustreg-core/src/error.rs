//! # Error Types
//!
//! Low-level error types shared by every crate in the workspace. Registry
//! semantics (bad request, invalid issuer, ...) live in `trustreg-registry`;
//! the errors here describe failures of the plumbing underneath.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// A persisted record could not be encoded or decoded.
///
/// Decoding failures are never retried: a record that does not parse means
/// the store holds data this version of the registry cannot interpret.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Serializing a record for storage failed.
    #[error("failed to encode record under key 0x{key}: {source}")]
    Encode {
        /// Hex encoding of the store key.
        key: String,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// Bytes under a key are not a valid record.
    #[error("failed to decode record under key 0x{key}: {source}")]
    Decode {
        /// Hex encoding of the store key.
        key: String,
        /// Underlying deserializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Error loading or validating registry configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// YAML document could not be parsed.
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON document could not be parsed.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A parameter is outside its allowed range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParam {
        /// Parameter name as it appears in the configuration file.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
