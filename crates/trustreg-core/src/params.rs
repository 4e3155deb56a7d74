//! # Registry Parameters
//!
//! Tunable limits of the registry. Parameters ship inside the genesis
//! snapshot and can also be loaded from a YAML or JSON document; every
//! field falls back to its default when omitted.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Registry-wide limits and tree geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryParams {
    /// Depth of the issuance and revocation sparse Merkle trees.
    #[serde(default = "default_tree_depth")]
    pub tree_depth: usize,
    /// Maximum length of an issuer-assigned verification id.
    #[serde(default = "default_max_issuer_verification_id_size")]
    pub max_issuer_verification_id_size: usize,
    /// Maximum length of `original_data` and `proof`.
    #[serde(default = "default_max_proof_data_size")]
    pub max_proof_data_size: usize,
    /// Maximum length of the schema reference.
    #[serde(default = "default_max_schema_size")]
    pub max_schema_size: usize,
    /// Maximum length of the origin chain name.
    #[serde(default = "default_max_origin_chain_size")]
    pub max_origin_chain_size: usize,
    /// Maximum length of a registry verification id.
    #[serde(default = "default_max_verification_id_size")]
    pub max_verification_id_size: usize,
}

fn default_tree_depth() -> usize {
    32
}

fn default_max_issuer_verification_id_size() -> usize {
    256
}

fn default_max_proof_data_size() -> usize {
    4096
}

fn default_max_schema_size() -> usize {
    1028
}

fn default_max_origin_chain_size() -> usize {
    96
}

fn default_max_verification_id_size() -> usize {
    256
}

impl Default for RegistryParams {
    fn default() -> Self {
        Self {
            tree_depth: default_tree_depth(),
            max_issuer_verification_id_size: default_max_issuer_verification_id_size(),
            max_proof_data_size: default_max_proof_data_size(),
            max_schema_size: default_max_schema_size(),
            max_origin_chain_size: default_max_origin_chain_size(),
            max_verification_id_size: default_max_verification_id_size(),
        }
    }
}

impl RegistryParams {
    /// Parse and validate parameters from YAML.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_yaml::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    /// Parse and validate parameters from JSON.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    /// Check that every parameter is usable.
    ///
    /// The tree depth is bounded by 64 because a leaf path is read from the
    /// key's low bits and proofs carry one sibling per level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree_depth == 0 || self.tree_depth > 64 {
            return Err(ConfigError::InvalidParam {
                name: "tree_depth",
                reason: format!("must be in 1..=64, got {}", self.tree_depth),
            });
        }
        let limits = [
            (
                "max_issuer_verification_id_size",
                self.max_issuer_verification_id_size,
            ),
            ("max_proof_data_size", self.max_proof_data_size),
            ("max_schema_size", self.max_schema_size),
            ("max_origin_chain_size", self.max_origin_chain_size),
            ("max_verification_id_size", self.max_verification_id_size),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::InvalidParam {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}
