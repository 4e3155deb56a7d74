//! # Trust Registry Keeper
//!
//! Owns every registry record and enforces the invariants between them.
//! This module holds the keeper itself plus operator, issuer and address
//! state; verifications, holder keys, iteration and export live in sibling
//! modules as further `impl Keeper` blocks.
//!
//! ## Lazy Revocation
//!
//! Removing an issuer deletes only the issuer's own rows. Verifications it
//! issued stay in the store untouched; every read path re-resolves the
//! issuer and treats a verification whose issuer is gone as absent. Removal
//! is O(1) and each read pays one extra lookup per verification.
//!
//! ## Atomicity
//!
//! Each public method runs to completion within one state transition and
//! leaves rollback of a failed transition to the host store. Multi-step
//! routines that must not leave partial writes behind even on success of the
//! surrounding transition (proposal execution, migrations) run through
//! [`Keeper::atomically`].

use alloy_primitives::Address;
use trustreg_core::{load_record, save_record, CacheStore, KvStore, PrefixStore, RegistryParams};

use crate::error::RegistryError;
use crate::events::EventManager;
use crate::keys;
use crate::tree_manager::CredentialTreeManager;
use crate::types::{AddressDetails, IssuerDetails, OperatorDetails, OperatorType};

/// The registry state machine over a key-value store.
#[derive(Debug, Clone)]
pub struct Keeper<S> {
    store: S,
    events: EventManager,
}

impl<S: KvStore + Clone> Keeper<S> {
    /// Keeper over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: EventManager::new(),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Events emitted through this keeper.
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub(crate) fn prefixed(&self, prefix: &[u8]) -> PrefixStore<S> {
        PrefixStore::new(self.store.clone(), prefix)
    }

    /// Run `f` against a buffered branch of the store.
    ///
    /// Writes and events reach this keeper only if `f` succeeds; on error
    /// the branch is dropped and state is left as it was.
    pub fn atomically<T>(
        &self,
        f: impl FnOnce(&Keeper<CacheStore<S>>) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let branch = Keeper::new(CacheStore::new(self.store.clone()));
        let out = f(&branch)?;
        branch.store.commit();
        for event in branch.events.drain() {
            self.events.emit(event);
        }
        Ok(out)
    }

    // ─── Params ──────────────────────────────────────────────────────

    /// Stored parameters, or the defaults before genesis.
    pub fn get_params(&self) -> Result<RegistryParams, RegistryError> {
        Ok(load_record(&self.store, keys::PARAMS)?.unwrap_or_default())
    }

    /// Validate and store parameters.
    pub fn set_params(&self, params: &RegistryParams) -> Result<(), RegistryError> {
        params.validate()?;
        save_record(&self.store, keys::PARAMS, params)?;
        Ok(())
    }

    /// The issuance and revocation trees.
    pub fn trees(&self) -> Result<CredentialTreeManager<S>, RegistryError> {
        let depth = self.get_params()?.tree_depth;
        Ok(CredentialTreeManager::new(self.store.clone(), depth))
    }

    // ─── Operators ───────────────────────────────────────────────────

    /// Operator record; the zero value when absent.
    pub fn get_operator_details(&self, operator: Address) -> Result<OperatorDetails, RegistryError> {
        let store = self.prefixed(keys::OPERATOR_DETAILS);
        Ok(load_record(&store, operator.as_slice())?.unwrap_or_default())
    }

    /// Whether `operator` is a registered operator.
    pub fn operator_exists(&self, operator: Address) -> Result<bool, RegistryError> {
        Ok(self.get_operator_details(operator)?.exists())
    }

    /// Register `operator` with the given role.
    pub fn add_operator(
        &self,
        operator: Address,
        operator_type: OperatorType,
    ) -> Result<(), RegistryError> {
        if !operator_type.is_valid() {
            return Err(RegistryError::InvalidParam("invalid operator type".to_string()));
        }
        let details = OperatorDetails {
            operator: operator.to_string(),
            operator_type,
        };
        save_record(&self.prefixed(keys::OPERATOR_DETAILS), operator.as_slice(), &details)?;
        tracing::info!(operator = %operator, operator_type = ?operator_type, "operator added");
        Ok(())
    }

    /// Remove a regular operator. Initial operators are permanent.
    pub fn remove_regular_operator(&self, operator: Address) -> Result<(), RegistryError> {
        let details = self.get_operator_details(operator)?;
        if !details.exists() {
            return Err(RegistryError::InvalidOperator("operator not exists".to_string()));
        }
        if details.operator_type != OperatorType::Regular {
            return Err(RegistryError::NotAuthorized(
                "operator not a regular type".to_string(),
            ));
        }
        self.prefixed(keys::OPERATOR_DETAILS).delete(operator.as_slice());
        tracing::info!(operator = %operator, "operator removed");
        Ok(())
    }

    // ─── Issuers ─────────────────────────────────────────────────────

    /// Issuer record; the zero value when absent.
    pub fn get_issuer_details(&self, issuer: Address) -> Result<IssuerDetails, RegistryError> {
        let store = self.prefixed(keys::ISSUER_DETAILS);
        Ok(load_record(&store, issuer.as_slice())?.unwrap_or_default())
    }

    /// Whether an issuer exists at `issuer`, judged by the operator field.
    pub fn issuer_exists(&self, issuer: Address) -> Result<bool, RegistryError> {
        Ok(self.get_issuer_details(issuer)?.exists())
    }

    /// Store issuer details without any checks. Used by genesis import.
    pub fn write_issuer_details(
        &self,
        issuer: Address,
        details: &IssuerDetails,
    ) -> Result<(), RegistryError> {
        save_record(&self.prefixed(keys::ISSUER_DETAILS), issuer.as_slice(), details)?;
        Ok(())
    }

    /// Create an issuer managed by `signer`. New issuers start unverified.
    pub fn set_issuer_details(
        &self,
        signer: Address,
        issuer: Address,
        details: &IssuerDetails,
    ) -> Result<(), RegistryError> {
        if self.issuer_exists(issuer)? {
            return Err(RegistryError::InvalidParam("issuer already exists".to_string()));
        }
        if operator_of(details)? != signer {
            return Err(RegistryError::InvalidParam("operator address mismatch".to_string()));
        }
        self.write_issuer_details(issuer, details)?;
        self.set_address_verification_status(issuer, false)?;
        tracing::info!(issuer = %issuer, operator = %signer, "issuer registered");
        Ok(())
    }

    /// Details of `issuer`, provided it exists and `signer` is its operator.
    pub fn issuer_managed_by(
        &self,
        signer: Address,
        issuer: Address,
    ) -> Result<IssuerDetails, RegistryError> {
        let current = self.get_issuer_details(issuer)?;
        if !current.exists() {
            return Err(RegistryError::InvalidIssuer(format!("issuer {issuer} does not exist")));
        }
        if operator_of(&current)? != signer {
            return Err(RegistryError::NotOperatorOrIssuerCreator(
                "signer is not the issuer's operator".to_string(),
            ));
        }
        Ok(current)
    }

    /// Replace an issuer's details, possibly handing it to another
    /// operator. Any change drops the issuer back to unverified.
    pub fn update_issuer_details(
        &self,
        signer: Address,
        issuer: Address,
        details: &IssuerDetails,
    ) -> Result<(), RegistryError> {
        self.issuer_managed_by(signer, issuer)?;
        let new_operator = operator_of(details)?;
        self.write_issuer_details(issuer, details)?;
        self.set_address_verification_status(issuer, false)?;
        tracing::info!(issuer = %issuer, operator = %new_operator, "issuer updated");
        Ok(())
    }

    /// Remove an issuer managed by `signer`.
    pub fn remove_issuer(&self, signer: Address, issuer: Address) -> Result<(), RegistryError> {
        self.issuer_managed_by(signer, issuer)?;
        self.delete_issuer(issuer);
        Ok(())
    }

    /// Delete the issuer record and the issuer's own address record.
    ///
    /// Verifications it issued are left in place and filtered on read.
    pub fn delete_issuer(&self, issuer: Address) {
        self.prefixed(keys::ISSUER_DETAILS).delete(issuer.as_slice());
        self.remove_address_details(issuer);
        tracing::info!(issuer = %issuer, "issuer removed");
    }

    // ─── Address details ─────────────────────────────────────────────

    /// Address record with verifications from removed issuers filtered out.
    pub fn get_address_details(&self, address: Address) -> Result<AddressDetails, RegistryError> {
        let mut details = self.get_full_address_details(address)?;
        let before = details.verifications.len();
        let mut kept = Vec::with_capacity(before);
        for verification in details.verifications {
            if self.issuer_exists(verification.issuer_address)? {
                kept.push(verification);
            }
        }
        if kept.len() != before {
            tracing::debug!(
                address = %address,
                dropped = before - kept.len(),
                "verifications of removed issuers filtered"
            );
        }
        details.verifications = kept;
        Ok(details)
    }

    /// Address record exactly as stored.
    pub fn get_full_address_details(
        &self,
        address: Address,
    ) -> Result<AddressDetails, RegistryError> {
        let store = self.prefixed(keys::ADDRESS_DETAILS);
        Ok(load_record(&store, address.as_slice())?.unwrap_or_default())
    }

    /// Store an address record.
    pub fn set_address_details(
        &self,
        address: Address,
        details: &AddressDetails,
    ) -> Result<(), RegistryError> {
        save_record(&self.prefixed(keys::ADDRESS_DETAILS), address.as_slice(), details)?;
        Ok(())
    }

    /// Delete an address record.
    pub fn remove_address_details(&self, address: Address) {
        self.prefixed(keys::ADDRESS_DETAILS).delete(address.as_slice());
    }

    /// Whether `address` is flagged verified.
    pub fn is_address_verified(&self, address: Address) -> Result<bool, RegistryError> {
        Ok(self.get_full_address_details(address)?.is_verified)
    }

    /// Set the verified flag. Writes nothing if the flag already matches.
    pub fn set_address_verification_status(
        &self,
        address: Address,
        is_verified: bool,
    ) -> Result<(), RegistryError> {
        let mut details = self.get_full_address_details(address)?;
        if details.is_verified == is_verified {
            return Ok(());
        }
        details.is_verified = is_verified;
        self.set_address_details(address, &details)?;
        tracing::info!(address = %address, is_verified, "address verification status changed");
        Ok(())
    }

    /// Set the revoked flag. Writes nothing if the flag already matches.
    pub fn set_address_revocation_status(
        &self,
        address: Address,
        is_revoked: bool,
    ) -> Result<(), RegistryError> {
        let mut details = self.get_full_address_details(address)?;
        if details.is_revoked == is_revoked {
            return Ok(());
        }
        details.is_revoked = is_revoked;
        self.set_address_details(address, &details)?;
        tracing::info!(address = %address, is_revoked, "address revocation status changed");
        Ok(())
    }
}

/// Operator address named in an issuer record.
pub(crate) fn operator_of(details: &IssuerDetails) -> Result<Address, RegistryError> {
    details
        .operator
        .parse::<Address>()
        .map_err(|e| RegistryError::InvalidParam(format!("invalid issuer operator: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustreg_core::MemStore;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn issuer_details(operator: Address) -> IssuerDetails {
        IssuerDetails {
            name: "Issuer".into(),
            description: "test issuer".into(),
            url: "https://issuer.example".into(),
            logo: String::new(),
            legal_entity: "Issuer AG".into(),
            operator: operator.to_string(),
        }
    }

    fn keeper() -> Keeper<MemStore> {
        Keeper::new(MemStore::new())
    }

    #[test]
    fn test_operator_lifecycle() {
        let k = keeper();
        assert!(!k.operator_exists(addr(1)).unwrap());
        k.add_operator(addr(1), OperatorType::Regular).unwrap();
        assert!(k.operator_exists(addr(1)).unwrap());
        assert_eq!(
            k.get_operator_details(addr(1)).unwrap().operator_type,
            OperatorType::Regular
        );
        k.remove_regular_operator(addr(1)).unwrap();
        assert!(!k.operator_exists(addr(1)).unwrap());
    }

    #[test]
    fn test_operator_type_validated() {
        let k = keeper();
        assert!(matches!(
            k.add_operator(addr(1), OperatorType::Unspecified),
            Err(RegistryError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_initial_operator_not_removable() {
        let k = keeper();
        k.add_operator(addr(1), OperatorType::Initial).unwrap();
        assert!(matches!(
            k.remove_regular_operator(addr(1)),
            Err(RegistryError::NotAuthorized(_))
        ));
        assert!(matches!(
            k.remove_regular_operator(addr(2)),
            Err(RegistryError::InvalidOperator(_))
        ));
    }

    #[test]
    fn test_create_issuer_starts_unverified() {
        let k = keeper();
        k.set_address_verification_status(addr(9), true).unwrap();
        k.set_issuer_details(addr(1), addr(9), &issuer_details(addr(1))).unwrap();
        assert!(k.issuer_exists(addr(9)).unwrap());
        assert!(!k.is_address_verified(addr(9)).unwrap());
    }

    #[test]
    fn test_create_issuer_twice_rejected() {
        let k = keeper();
        k.set_issuer_details(addr(1), addr(9), &issuer_details(addr(1))).unwrap();
        assert!(matches!(
            k.set_issuer_details(addr(1), addr(9), &issuer_details(addr(1))),
            Err(RegistryError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_create_issuer_operator_mismatch() {
        let k = keeper();
        assert!(matches!(
            k.set_issuer_details(addr(1), addr(9), &issuer_details(addr(2))),
            Err(RegistryError::InvalidParam(_))
        ));
        assert!(!k.issuer_exists(addr(9)).unwrap());
    }

    #[test]
    fn test_update_issuer_resets_verification_and_reassigns() {
        let k = keeper();
        k.set_issuer_details(addr(1), addr(9), &issuer_details(addr(1))).unwrap();
        k.set_address_verification_status(addr(9), true).unwrap();

        let mut updated = issuer_details(addr(2));
        updated.name = "Renamed".into();
        k.update_issuer_details(addr(1), addr(9), &updated).unwrap();
        assert!(!k.is_address_verified(addr(9)).unwrap());
        assert_eq!(k.get_issuer_details(addr(9)).unwrap(), updated);

        // Former operator lost control.
        assert!(matches!(
            k.update_issuer_details(addr(1), addr(9), &issuer_details(addr(1))),
            Err(RegistryError::NotOperatorOrIssuerCreator(_))
        ));
    }

    #[test]
    fn test_issuer_managed_by() {
        let k = keeper();
        assert!(matches!(
            k.issuer_managed_by(addr(1), addr(9)),
            Err(RegistryError::InvalidIssuer(_))
        ));
        k.set_issuer_details(addr(1), addr(9), &issuer_details(addr(1))).unwrap();
        assert_eq!(k.issuer_managed_by(addr(1), addr(9)).unwrap(), issuer_details(addr(1)));
        assert!(matches!(
            k.issuer_managed_by(addr(2), addr(9)),
            Err(RegistryError::NotOperatorOrIssuerCreator(_))
        ));
    }

    #[test]
    fn test_update_missing_issuer() {
        let k = keeper();
        assert!(matches!(
            k.update_issuer_details(addr(1), addr(9), &issuer_details(addr(1))),
            Err(RegistryError::InvalidIssuer(_))
        ));
    }

    #[test]
    fn test_remove_issuer_clears_address_details() {
        let k = keeper();
        k.set_issuer_details(addr(1), addr(9), &issuer_details(addr(1))).unwrap();
        k.set_address_verification_status(addr(9), true).unwrap();
        assert!(matches!(
            k.remove_issuer(addr(2), addr(9)),
            Err(RegistryError::NotOperatorOrIssuerCreator(_))
        ));
        k.remove_issuer(addr(1), addr(9)).unwrap();
        assert!(!k.issuer_exists(addr(9)).unwrap());
        assert_eq!(k.get_issuer_details(addr(9)).unwrap(), IssuerDetails::default());
        assert!(!k.is_address_verified(addr(9)).unwrap());
        assert!(matches!(
            k.remove_issuer(addr(1), addr(9)),
            Err(RegistryError::InvalidIssuer(_))
        ));
    }

    #[test]
    fn test_existence_follows_operator_field() {
        let k = keeper();
        let mut details = issuer_details(addr(1));
        details.operator.clear();
        k.write_issuer_details(addr(9), &details).unwrap();
        assert!(!k.issuer_exists(addr(9)).unwrap());
    }

    #[test]
    fn test_verification_status_noop_when_unchanged() {
        let k = keeper();
        k.set_address_verification_status(addr(3), false).unwrap();
        assert!(k.store().is_empty());
        k.set_address_verification_status(addr(3), true).unwrap();
        assert!(k.is_address_verified(addr(3)).unwrap());
    }

    #[test]
    fn test_atomically_discards_on_error() {
        let k = keeper();
        let result: Result<(), RegistryError> = k.atomically(|branch| {
            branch.add_operator(addr(1), OperatorType::Initial)?;
            Err(RegistryError::BadRequest("abort".into()))
        });
        assert!(result.is_err());
        assert!(!k.operator_exists(addr(1)).unwrap());

        k.atomically(|branch| branch.add_operator(addr(1), OperatorType::Initial))
            .unwrap();
        assert!(k.operator_exists(addr(1)).unwrap());
    }

    #[test]
    fn test_params_default_then_stored() {
        let k = keeper();
        assert_eq!(k.get_params().unwrap(), RegistryParams::default());
        let params = RegistryParams {
            tree_depth: 20,
            ..Default::default()
        };
        k.set_params(&params).unwrap();
        assert_eq!(k.get_params().unwrap().tree_depth, 20);

        let bad = RegistryParams {
            tree_depth: 0,
            ..Default::default()
        };
        assert!(matches!(k.set_params(&bad), Err(RegistryError::Config(_))));
    }
}
