//! Ordered iteration over every record kind.
//!
//! Visitors return [`ControlFlow::Break`] to stop early. Records come back
//! exactly as stored; address keys that are not 20 bytes wide are reported
//! as `Internal` errors.

use std::ops::ControlFlow;

use alloy_primitives::Address;
use serde::de::DeserializeOwned;
use trustreg_core::{CodecError, KvStore};

use crate::error::RegistryError;
use crate::keeper::Keeper;
use crate::keys;
use crate::types::{AddressDetails, IssuerDetails, OperatorDetails, VerificationDetails};

impl<S: KvStore + Clone> Keeper<S> {
    /// Visit every operator record.
    pub fn iterate_operators(
        &self,
        mut visitor: impl FnMut(Address, OperatorDetails) -> ControlFlow<()>,
    ) -> Result<(), RegistryError> {
        self.iterate_records(keys::OPERATOR_DETAILS, |key, record| {
            Ok(visitor(address_key(key)?, record))
        })
    }

    /// Visit every issuer record.
    pub fn iterate_issuers(
        &self,
        mut visitor: impl FnMut(Address, IssuerDetails) -> ControlFlow<()>,
    ) -> Result<(), RegistryError> {
        self.iterate_records(keys::ISSUER_DETAILS, |key, record| {
            Ok(visitor(address_key(key)?, record))
        })
    }

    /// Visit every address record, unfiltered.
    pub fn iterate_address_details(
        &self,
        mut visitor: impl FnMut(Address, AddressDetails) -> ControlFlow<()>,
    ) -> Result<(), RegistryError> {
        self.iterate_records(keys::ADDRESS_DETAILS, |key, record| {
            Ok(visitor(address_key(key)?, record))
        })
    }

    /// Visit every verification record with its id.
    pub fn iterate_verification_details(
        &self,
        mut visitor: impl FnMut(&[u8], VerificationDetails) -> ControlFlow<()>,
    ) -> Result<(), RegistryError> {
        self.iterate_records(keys::VERIFICATION_DETAILS, |key, record| {
            Ok(visitor(key, record))
        })
    }

    /// Visit every registered holder public key.
    pub fn iterate_holder_public_keys(
        &self,
        mut visitor: impl FnMut(Address, Vec<u8>) -> ControlFlow<()>,
    ) -> Result<(), RegistryError> {
        for (key, value) in self.prefixed(keys::HOLDER_PUBLIC_KEYS).prefix_scan(b"") {
            if visitor(address_key(&key)?, value).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Visit every verification-to-holder link.
    pub fn iterate_links_to_holder(
        &self,
        mut visitor: impl FnMut(&[u8], Address) -> ControlFlow<()>,
    ) -> Result<(), RegistryError> {
        for (key, value) in self.prefixed(keys::VERIFICATION_TO_HOLDER).prefix_scan(b"") {
            if visitor(&key, address_key(&value)?).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Visit every verification-to-public-key link.
    pub fn iterate_links_to_public_key(
        &self,
        mut visitor: impl FnMut(&[u8], Vec<u8>) -> ControlFlow<()>,
    ) -> Result<(), RegistryError> {
        for (key, value) in self.prefixed(keys::VERIFICATION_TO_PUBKEY).prefix_scan(b"") {
            if visitor(&key, value).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn iterate_records<T: DeserializeOwned>(
        &self,
        prefix: &[u8],
        mut visitor: impl FnMut(&[u8], T) -> Result<ControlFlow<()>, RegistryError>,
    ) -> Result<(), RegistryError> {
        for (key, value) in self.prefixed(prefix).prefix_scan(b"") {
            let record: T =
                serde_json::from_slice(&value).map_err(|source| CodecError::Decode {
                    key: hex::encode(&key),
                    source,
                })?;
            if visitor(&key, record)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}

fn address_key(raw: &[u8]) -> Result<Address, RegistryError> {
    Address::try_from(raw).map_err(|_| {
        RegistryError::Internal(format!("corrupt address key 0x{}", hex::encode(raw)))
    })
}
