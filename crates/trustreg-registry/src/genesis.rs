//! # Genesis Import and Export
//!
//! A [`GenesisState`] is a complete snapshot of registry state. Import
//! replays every section through the keeper, re-validating invariants;
//! any failure is fatal and names the section and entry that caused it.
//! Export walks the store and is the inverse of import up to list order.
//!
//! Tree contents are not part of the snapshot. Import rebuilds both trees
//! from the verification records and the holder keys they resolve to.
//!
//! ## Import Order
//!
//! 1. params
//! 2. operators
//! 3. issuers
//! 4. verification → public key links
//! 5. holder public keys
//! 6. verification details (holder taken from the address section)
//! 7. address details

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use trustreg_core::{KvStore, RegistryParams};

use crate::error::{GenesisError, RegistryError};
use crate::keeper::Keeper;
use crate::types::{
    hex_bytes, parse_address, AddressDetails, IssuerDetails, OperatorDetails, VerificationDetails,
};
use crate::verification::validate_timestamps;

/// An issuer row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisIssuer {
    /// Issuer address, `0x` hex.
    pub address: String,
    /// Issuer profile.
    pub details: IssuerDetails,
}

/// An address row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisAddressDetails {
    /// Account address, `0x` hex.
    pub address: String,
    /// Flags and verification pointers.
    pub details: AddressDetails,
}

/// A verification row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisVerificationDetails {
    /// Verification id.
    #[serde(with = "hex_bytes")]
    pub id: Vec<u8>,
    /// Verification record.
    pub details: VerificationDetails,
}

/// A holder public key row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisHolderPublicKey {
    /// Holder address, `0x` hex.
    pub address: String,
    /// Public key `x` coordinate.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// A verification → public key link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisLinkToPublicKey {
    /// Verification id.
    #[serde(with = "hex_bytes")]
    pub verification_id: Vec<u8>,
    /// Public key `x` coordinate.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// Complete registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    /// Registry parameters.
    pub params: RegistryParams,
    /// Operators.
    pub operators: Vec<OperatorDetails>,
    /// Issuers.
    pub issuer_details: Vec<GenesisIssuer>,
    /// Address records.
    pub address_details: Vec<GenesisAddressDetails>,
    /// Verification records.
    pub verification_details: Vec<GenesisVerificationDetails>,
    /// Holder public keys.
    pub public_keys: Vec<GenesisHolderPublicKey>,
    /// Verification → public key links.
    pub links_to_public_key: Vec<GenesisLinkToPublicKey>,
}

impl GenesisState {
    /// Structural checks that need no store: parameters, address syntax
    /// and uniqueness within each section.
    pub fn validate(&self) -> Result<(), GenesisError> {
        self.params
            .validate()
            .map_err(|e| GenesisError::at("params", 0)(e.into()))?;

        unique_entries("operators", &self.operators, |operator| {
            let key = address_key(&operator.operator)?;
            if !operator.operator_type.is_valid() {
                return Err(RegistryError::InvalidParam("invalid operator type".to_string()));
            }
            Ok(key)
        })?;
        unique_entries("issuers", &self.issuer_details, |issuer| {
            parse_address(&issuer.details.operator)?;
            address_key(&issuer.address)
        })?;
        unique_entries("address_details", &self.address_details, |entry| {
            address_key(&entry.address)
        })?;
        unique_entries("verification_details", &self.verification_details, |entry| {
            if entry.id.is_empty() {
                return Err(RegistryError::BasicValidation("empty verification id".to_string()));
            }
            Ok(entry.id.clone())
        })?;
        unique_entries("public_keys", &self.public_keys, |entry| address_key(&entry.address))
    }
}

// Checks every entry of a section and rejects repeated keys.
fn unique_entries<T>(
    section: &'static str,
    entries: &[T],
    key: impl Fn(&T) -> Result<Vec<u8>, RegistryError>,
) -> Result<(), GenesisError> {
    let mut seen = HashSet::new();
    for (i, entry) in entries.iter().enumerate() {
        let key = key(entry).map_err(GenesisError::at(section, i))?;
        if seen.contains(&key) {
            return Err(GenesisError::at(section, i)(RegistryError::BasicValidation(format!(
                "duplicate entry 0x{}",
                hex::encode(&key)
            ))));
        }
        seen.insert(key);
    }
    Ok(())
}

fn address_key(s: &str) -> Result<Vec<u8>, RegistryError> {
    Ok(parse_address(s)?.to_vec())
}

fn require_issuer<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    issuer: Address,
) -> Result<(), RegistryError> {
    if !keeper.issuer_exists(issuer)? {
        return Err(RegistryError::InvalidIssuer(format!("issuer {issuer} does not exist")));
    }
    Ok(())
}

/// Load `state` into an empty store.
pub fn init_genesis<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    state: &GenesisState,
) -> Result<(), GenesisError> {
    keeper
        .set_params(&state.params)
        .map_err(GenesisError::at("params", 0))?;

    for (i, operator) in state.operators.iter().enumerate() {
        import_operator(keeper, operator).map_err(GenesisError::at("operators", i))?;
    }
    for (i, issuer) in state.issuer_details.iter().enumerate() {
        import_issuer(keeper, issuer).map_err(GenesisError::at("issuers", i))?;
    }
    for (i, link) in state.links_to_public_key.iter().enumerate() {
        import_link(keeper, link).map_err(GenesisError::at("links_to_public_key", i))?;
    }
    for (i, entry) in state.public_keys.iter().enumerate() {
        import_public_key(keeper, entry).map_err(GenesisError::at("public_keys", i))?;
    }

    let holders = holders_by_verification(state).map_err(GenesisError::at("address_details", 0))?;
    for (i, entry) in state.verification_details.iter().enumerate() {
        import_verification(keeper, &holders, entry)
            .map_err(GenesisError::at("verification_details", i))?;
    }
    for (i, entry) in state.address_details.iter().enumerate() {
        import_address_details(keeper, entry).map_err(GenesisError::at("address_details", i))?;
    }

    tracing::info!(
        operators = state.operators.len(),
        issuers = state.issuer_details.len(),
        addresses = state.address_details.len(),
        verifications = state.verification_details.len(),
        "genesis imported"
    );
    Ok(())
}

fn import_operator<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    operator: &OperatorDetails,
) -> Result<(), RegistryError> {
    let address = parse_address(&operator.operator)?;
    keeper.add_operator(address, operator.operator_type)
}

fn import_issuer<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    issuer: &GenesisIssuer,
) -> Result<(), RegistryError> {
    let address = parse_address(&issuer.address)?;
    keeper.write_issuer_details(address, &issuer.details)
}

fn import_link<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    link: &GenesisLinkToPublicKey,
) -> Result<(), RegistryError> {
    if link.verification_id.is_empty() || link.public_key.is_empty() {
        return Err(RegistryError::InvalidParam(
            "empty verification id or public key".to_string(),
        ));
    }
    keeper.link_verification_id_to_pub_key(&link.public_key, &link.verification_id)
}

fn import_public_key<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    entry: &GenesisHolderPublicKey,
) -> Result<(), RegistryError> {
    let address = parse_address(&entry.address)?;
    if entry.public_key.is_empty() {
        return Err(RegistryError::InvalidParam("empty public key".to_string()));
    }
    keeper.set_holder_public_key_bytes(address, &entry.public_key);
    Ok(())
}

fn import_verification<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    holders: &HashMap<&[u8], Address>,
    entry: &GenesisVerificationDetails,
) -> Result<(), RegistryError> {
    let details = &entry.details;
    require_issuer(keeper, details.issuer_address)?;
    validate_timestamps(details)?;
    if details.original_data.is_empty() {
        return Err(RegistryError::InvalidParam("empty proof data".to_string()));
    }
    let holder = holders.get(entry.id.as_slice()).ok_or_else(|| {
        RegistryError::InvalidParam("verification is not referenced by any address".to_string())
    })?;
    keeper.set_verification_details(*holder, &entry.id, details)?;
    if details.is_revoked {
        keeper.mark_verification_details_as_revoked(&entry.id)?;
    }
    Ok(())
}

fn import_address_details<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    entry: &GenesisAddressDetails,
) -> Result<(), RegistryError> {
    let address = parse_address(&entry.address)?;
    for verification in &entry.details.verifications {
        require_issuer(keeper, verification.issuer_address)?;
        if verification.verification_id.is_empty() {
            return Err(RegistryError::InvalidParam("empty verification id".to_string()));
        }
        if !verification.verification_type.is_valid() {
            return Err(RegistryError::InvalidParam("invalid verification type".to_string()));
        }
        if keeper
            .get_raw_verification_details(&verification.verification_id)?
            .is_empty()
        {
            return Err(RegistryError::InvalidParam(format!(
                "verification 0x{} has no details",
                hex::encode(&verification.verification_id)
            )));
        }
    }
    keeper.set_address_details(address, &entry.details)
}

// Holder of each verification id, as listed by the address section.
fn holders_by_verification(
    state: &GenesisState,
) -> Result<HashMap<&[u8], Address>, RegistryError> {
    let mut holders = HashMap::new();
    for entry in &state.address_details {
        let address = parse_address(&entry.address)?;
        for verification in &entry.details.verifications {
            holders.insert(verification.verification_id.as_slice(), address);
        }
    }
    Ok(holders)
}

/// Snapshot the registry.
///
/// Rows that only exist physically because their issuer was removed are
/// left out: verification records of removed issuers, pointers to them and
/// their public key links.
pub fn export_genesis<S: KvStore + Clone>(
    keeper: &Keeper<S>,
) -> Result<GenesisState, RegistryError> {
    let mut state = GenesisState {
        params: keeper.get_params()?,
        ..Default::default()
    };

    keeper.iterate_operators(|_, details| {
        state.operators.push(details);
        ControlFlow::Continue(())
    })?;

    let mut issuers = HashSet::new();
    keeper.iterate_issuers(|address, details| {
        if details.exists() {
            issuers.insert(address);
            state.issuer_details.push(GenesisIssuer {
                address: address.to_string(),
                details,
            });
        }
        ControlFlow::Continue(())
    })?;

    keeper.iterate_address_details(|address, mut details| {
        details
            .verifications
            .retain(|v| issuers.contains(&v.issuer_address));
        state.address_details.push(GenesisAddressDetails {
            address: address.to_string(),
            details,
        });
        ControlFlow::Continue(())
    })?;

    let mut exported = HashSet::new();
    keeper.iterate_verification_details(|id, details| {
        if issuers.contains(&details.issuer_address) {
            exported.insert(id.to_vec());
            state.verification_details.push(GenesisVerificationDetails {
                id: id.to_vec(),
                details,
            });
        }
        ControlFlow::Continue(())
    })?;

    keeper.iterate_holder_public_keys(|address, public_key| {
        state.public_keys.push(GenesisHolderPublicKey {
            address: address.to_string(),
            public_key,
        });
        ControlFlow::Continue(())
    })?;

    keeper.iterate_links_to_public_key(|id, public_key| {
        if exported.contains(id) {
            state.links_to_public_key.push(GenesisLinkToPublicKey {
                verification_id: id.to_vec(),
                public_key,
            });
        }
        ControlFlow::Continue(())
    })?;

    Ok(state)
}
