//! # Query Server
//!
//! Read-only endpoints over the keeper. Request fields arrive as text;
//! malformed input is a `BasicValidation` error, while a missing entity is
//! answered with its zero value.
//!
//! Credential hashes travel as 32-byte big-endian hex. Tree roots and proof
//! elements use the decimal encoding of [`NodeHash`].

use std::ops::ControlFlow;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use trustreg_core::KvStore;
use trustreg_crypto::{fr_from_be_bytes, fr_to_be_bytes, CircomVerifierProof, NodeHash};

use crate::error::RegistryError;
use crate::keeper::Keeper;
use crate::types::{
    parse_address, parse_hex, AddressDetails, IssuerDetails, OperatorDetails, VerificationDetails,
    VerificationType,
};
use crate::verification::credential_hash;

/// Default page size of list queries.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Offset/limit page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    /// Entries to skip.
    pub offset: usize,
    /// Page size; 0 selects [`DEFAULT_PAGE_LIMIT`].
    pub limit: usize,
}

impl PageRequest {
    fn limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            self.limit
        }
    }
}

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Entries of the page, in key order.
    pub items: Vec<T>,
    /// Offset of the next page, if there is one.
    pub next_offset: Option<usize>,
}

/// An issuer with its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerEntry {
    /// Issuer address.
    pub issuer_address: String,
    /// Issuer profile.
    pub details: IssuerDetails,
}

/// An address record with its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    /// Account address.
    pub address: String,
    /// Address record, unfiltered.
    pub details: AddressDetails,
}

/// A verification record with its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEntry {
    /// Verification id, hex.
    pub verification_id: String,
    /// Verification record.
    pub details: VerificationDetails,
}

/// Read-only access to registry state.
#[derive(Debug, Clone)]
pub struct QueryServer<S> {
    keeper: Keeper<S>,
}

impl<S: KvStore + Clone> QueryServer<S> {
    /// Server over `keeper`.
    pub fn new(keeper: Keeper<S>) -> Self {
        Self { keeper }
    }

    /// Operator record.
    pub fn operator_details(&self, operator: &str) -> Result<OperatorDetails, RegistryError> {
        self.keeper.get_operator_details(parse_address(operator)?)
    }

    /// Issuer record.
    pub fn issuer_details(&self, issuer: &str) -> Result<IssuerDetails, RegistryError> {
        self.keeper.get_issuer_details(parse_address(issuer)?)
    }

    /// Page of issuers in address order.
    pub fn issuers_details(&self, page: PageRequest) -> Result<Page<IssuerEntry>, RegistryError> {
        let mut rows = Vec::new();
        {
            let mut visit = pager(page, &mut rows);
            self.keeper.iterate_issuers(|address, details| {
                visit(IssuerEntry {
                    issuer_address: address.to_string(),
                    details,
                })
            })?;
        }
        Ok(finish(page, rows))
    }

    /// Address record, filtered to existing issuers when
    /// `only_with_existing_issuer` is set.
    pub fn address_details(
        &self,
        address: &str,
        only_with_existing_issuer: bool,
    ) -> Result<AddressDetails, RegistryError> {
        let address = parse_address(address)?;
        if only_with_existing_issuer {
            self.keeper.get_address_details(address)
        } else {
            self.keeper.get_full_address_details(address)
        }
    }

    /// Page of address records in address order, unfiltered.
    pub fn addresses_details(&self, page: PageRequest) -> Result<Page<AddressEntry>, RegistryError> {
        let mut rows = Vec::new();
        {
            let mut visit = pager(page, &mut rows);
            self.keeper.iterate_address_details(|address, details| {
                visit(AddressEntry {
                    address: address.to_string(),
                    details,
                })
            })?;
        }
        Ok(finish(page, rows))
    }

    /// Verification record; zero value if unknown or its issuer is gone.
    pub fn verification_details(&self, id: &str) -> Result<VerificationDetails, RegistryError> {
        self.keeper
            .get_verification_details(&parse_hex("verification id", id)?)
    }

    /// Page of verification records in id order, as stored.
    pub fn verifications_details(
        &self,
        page: PageRequest,
    ) -> Result<Page<VerificationEntry>, RegistryError> {
        let mut rows = Vec::new();
        {
            let mut visit = pager(page, &mut rows);
            self.keeper.iterate_verification_details(|id, details| {
                visit(VerificationEntry {
                    verification_id: hex::encode(id),
                    details,
                })
            })?;
        }
        Ok(finish(page, rows))
    }

    /// Records of `address`'s verifications behind each pointer, as stored.
    pub fn all_verification_details_by_address(
        &self,
        address: &str,
        only_with_existing_issuer: bool,
    ) -> Result<Vec<VerificationEntry>, RegistryError> {
        let details = self.address_details(address, only_with_existing_issuer)?;
        details
            .verifications
            .into_iter()
            .map(|v| {
                Ok(VerificationEntry {
                    details: self.keeper.get_raw_verification_details(&v.verification_id)?,
                    verification_id: hex::encode(v.verification_id),
                })
            })
            .collect()
    }

    /// Records of `address`'s verifications of one type, optionally
    /// restricted to `issuers`.
    pub fn verifications_of_type(
        &self,
        address: &str,
        verification_type: VerificationType,
        issuers: &[String],
    ) -> Result<Vec<VerificationDetails>, RegistryError> {
        let address = parse_address(address)?;
        let issuers = issuers
            .iter()
            .map(|s| parse_address(s))
            .collect::<Result<Vec<_>, _>>()?;
        self.keeper
            .get_verifications_of_type(address, verification_type, &issuers)
    }

    /// Registered public key `x` coordinate of `address`, hex; empty when
    /// none.
    pub fn holder_public_key(&self, address: &str) -> Result<String, RegistryError> {
        let key = self.keeper.get_holder_public_key(parse_address(address)?)?;
        Ok(key.map(hex::encode).unwrap_or_default())
    }

    /// Holder of verification `id`; empty when unlinked.
    pub fn verification_holder(&self, id: &str) -> Result<String, RegistryError> {
        let id = parse_hex("verification id", id)?;
        Ok(self
            .keeper
            .get_holder_by_verification_id(&id)?
            .map(|a| a.to_string())
            .unwrap_or_default())
    }

    /// Credential hash behind verification `id`, hex.
    pub fn credential_hash(&self, id: &str) -> Result<String, RegistryError> {
        let id = parse_hex("verification id", id)?;
        let hash = self.keeper.get_credential_hash_by_verification_id(&id)?;
        Ok(hex::encode(fr_to_be_bytes(&hash)))
    }

    /// Whether verification `id`, held under `address`'s registered key, is
    /// committed to the issuance tree.
    pub fn is_suitable_for_zk(&self, address: &str, id: &str) -> Result<bool, RegistryError> {
        let address = parse_address(address)?;
        let id = parse_hex("verification id", id)?;
        let details = self.keeper.get_verification_details(&id)?;
        let Some(public_key) = self.keeper.get_holder_public_key(address)? else {
            return Ok(false);
        };
        if details.is_empty() {
            return Ok(false);
        }
        let hash = credential_hash(&details, &public_key)?;
        self.keeper.trees()?.is_included_in_issuance_tree(hash)
    }

    /// Current issuance tree root.
    pub fn issuance_tree_root(&self) -> Result<NodeHash, RegistryError> {
        self.keeper.trees()?.issuance_root()
    }

    /// Current revocation tree root.
    pub fn revocation_tree_root(&self) -> Result<NodeHash, RegistryError> {
        self.keeper.trees()?.revocation_root()
    }

    /// Issuance proof of a credential hash, JSON-encoded.
    pub fn issuance_proof(&self, credential_hash: &str) -> Result<String, RegistryError> {
        let hash = parse_credential_hash(credential_hash)?;
        encode_proof(&self.keeper.trees()?.generate_issuance_proof(hash)?)
    }

    /// Non-revocation proof of a credential hash, JSON-encoded.
    pub fn revocation_proof(&self, credential_hash: &str) -> Result<String, RegistryError> {
        let hash = parse_credential_hash(credential_hash)?;
        encode_proof(&self.keeper.trees()?.generate_non_revocation_proof(hash)?)
    }
}

fn parse_credential_hash(s: &str) -> Result<Fr, RegistryError> {
    let bytes = parse_hex("credential hash", s)?;
    if bytes.len() != 32 {
        return Err(RegistryError::BasicValidation(format!(
            "credential hash must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    fr_from_be_bytes(&bytes).map_err(|e| RegistryError::BasicValidation(e.to_string()))
}

fn encode_proof(proof: &CircomVerifierProof) -> Result<String, RegistryError> {
    serde_json::to_string(proof)
        .map_err(|e| RegistryError::Internal(format!("cannot encode proof: {e}")))
}

// Visitor that skips `offset` rows and stops one past `limit`, so the
// caller can tell whether another page exists.
fn pager<T>(page: PageRequest, rows: &mut Vec<T>) -> impl FnMut(T) -> ControlFlow<()> + '_ {
    let mut skipped = 0;
    let limit = page.limit();
    move |row| {
        if skipped < page.offset {
            skipped += 1;
            return ControlFlow::Continue(());
        }
        rows.push(row);
        if rows.len() > limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

fn finish<T>(page: PageRequest, mut rows: Vec<T>) -> Page<T> {
    let limit = page.limit();
    let next_offset = if rows.len() > limit {
        rows.truncate(limit);
        Some(page.offset + limit)
    } else {
        None
    };
    Page {
        items: rows,
        next_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperatorType;
    use alloy_primitives::Address;
    use trustreg_core::MemStore;

    const OPERATOR: Address = Address::repeat_byte(0x01);

    fn server_with_issuers(n: u8) -> QueryServer<MemStore> {
        let keeper = Keeper::new(MemStore::new());
        keeper.add_operator(OPERATOR, OperatorType::Initial).unwrap();
        for b in 0..n {
            let details = IssuerDetails {
                name: format!("Issuer {b}"),
                operator: OPERATOR.to_string(),
                ..Default::default()
            };
            keeper
                .set_issuer_details(OPERATOR, Address::repeat_byte(0x10 + b), &details)
                .unwrap();
        }
        QueryServer::new(keeper)
    }

    #[test]
    fn test_malformed_input_is_basic_validation() {
        let q = server_with_issuers(0);
        assert!(matches!(q.issuer_details("xyz"), Err(RegistryError::BasicValidation(_))));
        assert!(matches!(
            q.verification_details("0xzz"),
            Err(RegistryError::BasicValidation(_))
        ));
        assert!(matches!(
            q.issuance_proof("0x1234"),
            Err(RegistryError::BasicValidation(_))
        ));
    }

    #[test]
    fn test_missing_entities_are_zero() {
        let q = server_with_issuers(0);
        let nobody = Address::repeat_byte(0x77).to_string();
        assert_eq!(q.issuer_details(&nobody).unwrap(), IssuerDetails::default());
        assert_eq!(q.address_details(&nobody, true).unwrap(), AddressDetails::default());
        assert!(q.verification_details("00ff").unwrap().is_empty());
        assert_eq!(q.holder_public_key(&nobody).unwrap(), "");
        assert_eq!(q.verification_holder("00ff").unwrap(), "");
    }

    #[test]
    fn test_issuer_pages() {
        let q = server_with_issuers(5);
        let first = q
            .issuers_details(PageRequest { offset: 0, limit: 2 })
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_offset, Some(2));
        assert_eq!(first.items[0].details.name, "Issuer 0");

        let last = q
            .issuers_details(PageRequest { offset: 4, limit: 2 })
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.next_offset, None);

        let all = q.issuers_details(PageRequest::default()).unwrap();
        assert_eq!(all.items.len(), 5);
    }

    #[test]
    fn test_empty_tree_roots_and_proofs() {
        let q = server_with_issuers(0);
        assert!(q.issuance_tree_root().unwrap().is_zero());
        assert!(q.revocation_tree_root().unwrap().is_zero());

        let proof = q.revocation_proof(&"00".repeat(32)).unwrap();
        let decoded: CircomVerifierProof = serde_json::from_str(&proof).unwrap();
        assert_eq!(decoded.fnc, 1);
        assert!(decoded.verify());
    }
}
