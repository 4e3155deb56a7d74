//! # Verifications
//!
//! Issuers attach verifications to addresses. The attested data lives once
//! under its verification id; the address keeps a pointer
//! `(type, id, issuer)`. Credentials of holders with a registered public
//! key are also committed to the issuance tree so they can be proven in
//! zero knowledge.
//!
//! The id is `keccak256(user || type_le_u32 || canonical_json(details))`,
//! so resubmitting identical data for the same user is detected as a
//! duplicate.

use alloy_primitives::{keccak256, Address};
use ark_bn254::Fr;
use trustreg_core::{load_record, save_record, CanonicalBytes, KvStore};
use trustreg_crypto::extract_x_coordinate;

use crate::error::RegistryError;
use crate::keeper::Keeper;
use crate::keys;
use crate::types::{Verification, VerificationDetails, VerificationType, ZkCredential};

impl<S: KvStore + Clone> Keeper<S> {
    /// Record a verification of `user` by the issuer named in `details`.
    ///
    /// The credential is committed to the issuance tree only when the user
    /// already registered a public key. Returns the verification id.
    ///
    /// # Errors
    ///
    /// `InvalidParam` for oversized fields, an invalid type, bad timestamps,
    /// empty proof data or a duplicate; `InvalidIssuer` when the issuer is
    /// absent or not verified.
    pub fn add_verification_details(
        &self,
        user: Address,
        verification_type: VerificationType,
        details: &VerificationDetails,
    ) -> Result<Vec<u8>, RegistryError> {
        let (id, details) = self.add_verification_details_internal(user, verification_type, details)?;

        if let Some(public_key) = self.get_holder_public_key(user)? {
            self.commit_issued_credential(&id, &details, &public_key)?;
        }
        Ok(id)
    }

    /// Like [`Keeper::add_verification_details`], but always commits the
    /// credential under the supplied compressed public key.
    pub fn add_verification_details_with_public_key(
        &self,
        user: Address,
        verification_type: VerificationType,
        details: &VerificationDetails,
        compressed_public_key: &[u8],
    ) -> Result<Vec<u8>, RegistryError> {
        let (id, details) = self.add_verification_details_internal(user, verification_type, details)?;

        let public_key = extract_x_coordinate(compressed_public_key)
            .map_err(|e| RegistryError::BadRequest(e.to_string()))?;
        self.commit_issued_credential(&id, &details, &public_key)?;
        Ok(id)
    }

    // Link `id` to `public_key` and add its credential to the issuance tree.
    fn commit_issued_credential(
        &self,
        id: &[u8],
        details: &VerificationDetails,
        public_key: &[u8],
    ) -> Result<(), RegistryError> {
        self.link_verification_id_to_pub_key(public_key, id)?;
        let hash = credential_hash(details, public_key)
            .map_err(|e| RegistryError::BadRequest(e.to_string()))?;
        self.trees()?
            .add_credential_hash_to_issued(hash)
            .map_err(|e| RegistryError::BadRequest(e.to_string()))
    }

    fn add_verification_details_internal(
        &self,
        user: Address,
        verification_type: VerificationType,
        details: &VerificationDetails,
    ) -> Result<(Vec<u8>, VerificationDetails), RegistryError> {
        self.validate_size(details)?;

        if !self.is_address_verified(details.issuer_address)?
            || !self.issuer_exists(details.issuer_address)?
        {
            return Err(RegistryError::InvalidIssuer("issuer not verified".to_string()));
        }
        if !verification_type.is_valid() {
            return Err(RegistryError::InvalidParam("invalid verification type".to_string()));
        }
        validate_timestamps(details)?;
        if details.original_data.is_empty() {
            return Err(RegistryError::InvalidParam("empty proof data".to_string()));
        }

        let mut details = details.clone();
        details.verification_type = verification_type;
        details.is_revoked = false;

        let id = verification_id(user, verification_type, &details)?;
        let store = self.prefixed(keys::VERIFICATION_DETAILS);
        if store.has(&id) {
            return Err(RegistryError::InvalidParam(format!(
                "provided verification details already in storage. Verification ID: (0x{})",
                hex::encode(&id)
            )));
        }
        save_record(&store, &id, &details)?;

        let pointer = Verification {
            verification_type,
            verification_id: id.clone(),
            issuer_address: details.issuer_address,
        };
        let mut address_details = self.get_full_address_details(user)?;
        if address_details.verifications.contains(&pointer) {
            return Err(RegistryError::InvalidParam(
                "such verification already associated with user address".to_string(),
            ));
        }
        address_details.verifications.push(pointer);
        self.set_address_details(user, &address_details)?;
        self.link_verification_to_holder(user, &id)?;

        tracing::info!(
            user = %user,
            issuer = %details.issuer_address,
            verification_type = ?verification_type,
            id = %hex::encode(&id),
            "verification added"
        );
        Ok((id, details))
    }

    /// Store a verification under a known id. Used by genesis import.
    ///
    /// Links the verification to `user` and commits its credential when a
    /// public key is linked to the id or registered by the user.
    pub fn set_verification_details(
        &self,
        user: Address,
        id: &[u8],
        details: &VerificationDetails,
    ) -> Result<(), RegistryError> {
        self.validate_size(details)?;
        let store = self.prefixed(keys::VERIFICATION_DETAILS);
        if store.has(id) {
            return Err(RegistryError::InvalidParam(
                "provided verification details already in storage".to_string(),
            ));
        }
        save_record(&store, id, details)?;
        self.link_verification_to_holder(user, id)?;

        if let Some(public_key) = self.resolve_public_key(id, Some(user))? {
            self.link_verification_id_to_pub_key(&public_key, id)?;
            self.trees()?
                .add_credential_hash_to_issued(credential_hash(details, &public_key)?)?;
        }
        Ok(())
    }

    /// Revoke verification `id` on behalf of its issuer.
    pub fn revoke_verification(&self, id: &[u8], issuer: Address) -> Result<(), RegistryError> {
        let details = self.get_verification_details(id)?;
        if details.is_revoked {
            return Err(RegistryError::InvalidParam(
                "verification was already revoked".to_string(),
            ));
        }
        if details.is_empty() || details.issuer_address != issuer {
            return Err(RegistryError::InvalidParam(
                "caller is not verification issuer".to_string(),
            ));
        }
        self.mark_verification_details_as_revoked(id)
    }

    /// Flag verification `id` revoked and commit its credential to the
    /// revocation tree if the holder has a public key.
    pub fn mark_verification_details_as_revoked(&self, id: &[u8]) -> Result<(), RegistryError> {
        let store = self.prefixed(keys::VERIFICATION_DETAILS);
        let mut details: VerificationDetails = load_record(&store, id)?.ok_or_else(|| {
            RegistryError::InvalidParam("there is no such verification with provided ID".to_string())
        })?;
        details.is_revoked = true;
        save_record(&store, id, &details)?;

        let holder = self.get_holder_by_verification_id(id)?.ok_or_else(|| {
            RegistryError::BadRequest("cannot find associated user address".to_string())
        })?;
        tracing::info!(id = %hex::encode(id), holder = %holder, "verification revoked");

        if let Some(public_key) = self.resolve_public_key(id, Some(holder))? {
            self.trees()?
                .mark_credential_hash_as_revoked(credential_hash(&details, &public_key)?)?;
        }
        Ok(())
    }

    /// Verification record, or the zero value when the id is unknown or its
    /// issuer has been removed.
    pub fn get_verification_details(&self, id: &[u8]) -> Result<VerificationDetails, RegistryError> {
        let details = self.get_raw_verification_details(id)?;
        if details.is_empty() {
            return Ok(VerificationDetails::default());
        }
        if !self.issuer_exists(details.issuer_address)? {
            tracing::debug!(
                id = %hex::encode(id),
                issuer = %details.issuer_address,
                "verification hidden: issuer removed"
            );
            return Ok(VerificationDetails::default());
        }
        Ok(details)
    }

    /// Verification record exactly as stored.
    pub fn get_raw_verification_details(
        &self,
        id: &[u8],
    ) -> Result<VerificationDetails, RegistryError> {
        let store = self.prefixed(keys::VERIFICATION_DETAILS);
        Ok(load_record(&store, id)?.unwrap_or_default())
    }

    /// Pointers and records of `user`'s verifications by `issuer`.
    pub fn get_verification_details_by_issuer(
        &self,
        user: Address,
        issuer: Address,
    ) -> Result<Vec<(Verification, VerificationDetails)>, RegistryError> {
        self.get_address_details(user)?
            .verifications
            .into_iter()
            .filter(|v| v.issuer_address == issuer)
            .map(|v| {
                let details = self.get_verification_details(&v.verification_id)?;
                Ok((v, details))
            })
            .collect()
    }

    /// Whether `user` holds a verification of `verification_type` from one
    /// of `issuers` (any issuer when empty) that is still valid at
    /// `expiration_timestamp` (0 asks for "valid forever").
    pub fn has_verification_of_type(
        &self,
        user: Address,
        verification_type: VerificationType,
        expiration_timestamp: u32,
        issuers: &[Address],
    ) -> Result<bool, RegistryError> {
        let at = if expiration_timestamp == 0 {
            u32::MAX
        } else {
            expiration_timestamp
        };

        for verification in self.pointers_of_type(user, verification_type, issuers)? {
            let details = self.get_verification_details(&verification.verification_id)?;
            if details.is_empty() {
                continue;
            }
            if details.expiration_timestamp > 0 && at > details.expiration_timestamp {
                continue;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Records of `user`'s verifications of `verification_type` from one of
    /// `issuers` (any issuer when empty).
    pub fn get_verifications_of_type(
        &self,
        user: Address,
        verification_type: VerificationType,
        issuers: &[Address],
    ) -> Result<Vec<VerificationDetails>, RegistryError> {
        self.pointers_of_type(user, verification_type, issuers)?
            .iter()
            .map(|v| self.get_verification_details(&v.verification_id))
            .collect()
    }

    fn pointers_of_type(
        &self,
        user: Address,
        verification_type: VerificationType,
        issuers: &[Address],
    ) -> Result<Vec<Verification>, RegistryError> {
        let mut pointers = self.get_address_details(user)?.verifications;
        pointers.retain(|v| {
            v.verification_type == verification_type
                && (issuers.is_empty() || issuers.contains(&v.issuer_address))
        });
        Ok(pointers)
    }

    /// Whether verification `id` no longer counts: revoked itself, or its
    /// issuer is removed, revoked or unverified.
    pub fn is_verification_revoked(&self, id: &[u8]) -> Result<bool, RegistryError> {
        let details = self.get_verification_details(id)?;
        if details.is_revoked {
            return Ok(true);
        }
        let issuer = self.get_full_address_details(details.issuer_address)?;
        Ok(details.is_empty() || issuer.is_revoked || !issuer.is_verified)
    }

    /// Hash of the credential behind verification `id`.
    pub fn get_credential_hash_by_verification_id(&self, id: &[u8]) -> Result<Fr, RegistryError> {
        let details = self.get_verification_details(id)?;
        if details.is_empty() {
            return Err(RegistryError::InvalidParam(
                "verification with provided ID does not exist".to_string(),
            ));
        }
        let holder = self.get_holder_by_verification_id(id)?;
        let public_key = self.resolve_public_key(id, holder)?.ok_or_else(|| {
            RegistryError::InvalidParam(
                "verification with provided ID has no public key to attach".to_string(),
            )
        })?;
        Ok(credential_hash(&details, &public_key)?)
    }

    // Public key linked to the verification, else the holder's own key.
    pub(crate) fn resolve_public_key(
        &self,
        id: &[u8],
        holder: Option<Address>,
    ) -> Result<Option<Vec<u8>>, RegistryError> {
        if let Some(key) = self.get_pub_key_by_verification_id(id)? {
            return Ok(Some(key));
        }
        match holder {
            Some(holder) => self.get_holder_public_key(holder),
            None => Ok(None),
        }
    }

    fn validate_size(&self, details: &VerificationDetails) -> Result<(), RegistryError> {
        let params = self.get_params()?;
        let checks = [
            (details.origin_chain.len(), params.max_origin_chain_size, "origin chain"),
            (
                details.issuer_verification_id.len(),
                params.max_issuer_verification_id_size,
                "issuer verification id",
            ),
            (details.original_data.len(), params.max_proof_data_size, "original data"),
            (details.proof.len(), params.max_proof_data_size, "proof"),
            (details.schema.len(), params.max_schema_size, "schema"),
        ];
        for (len, max, what) in checks {
            if len > max {
                return Err(RegistryError::InvalidParam(format!(
                    "{what} too long: {len} > {max}"
                )));
            }
        }
        Ok(())
    }
}

/// Verification id of `details` issued to `user`.
pub fn verification_id(
    user: Address,
    verification_type: VerificationType,
    details: &VerificationDetails,
) -> Result<Vec<u8>, RegistryError> {
    let canonical = CanonicalBytes::new(details)?;
    let mut preimage = Vec::with_capacity(20 + 4 + canonical.len());
    preimage.extend_from_slice(user.as_slice());
    preimage.extend_from_slice(&verification_type.to_le_bytes());
    preimage.extend_from_slice(canonical.as_bytes());
    Ok(keccak256(&preimage).to_vec())
}

/// Credential hash of `details` held under `public_key`.
pub fn credential_hash(
    details: &VerificationDetails,
    public_key: &[u8],
) -> Result<Fr, RegistryError> {
    Ok(ZkCredential::new(details, public_key).hash()?)
}

pub(crate) fn validate_timestamps(details: &VerificationDetails) -> Result<(), RegistryError> {
    if details.issuance_timestamp < 1
        || (details.expiration_timestamp > 0
            && details.issuance_timestamp >= details.expiration_timestamp)
    {
        return Err(RegistryError::InvalidParam(
            "invalid issuance timestamp. Should be less than expiration timestamp.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IssuerDetails, OperatorType};
    use trustreg_core::{MemStore, RegistryParams};

    const OPERATOR: Address = Address::repeat_byte(0x01);
    const ISSUER: Address = Address::repeat_byte(0x0a);
    const USER: Address = Address::repeat_byte(0xaa);

    fn setup(verified: bool) -> Keeper<MemStore> {
        let k = Keeper::new(MemStore::new());
        k.add_operator(OPERATOR, OperatorType::Initial).unwrap();
        let details = IssuerDetails {
            name: "Issuer".into(),
            operator: OPERATOR.to_string(),
            ..Default::default()
        };
        k.set_issuer_details(OPERATOR, ISSUER, &details).unwrap();
        if verified {
            k.set_address_verification_status(ISSUER, true).unwrap();
        }
        k
    }

    fn details(issuance: u32, expiration: u32) -> VerificationDetails {
        VerificationDetails {
            issuer_address: ISSUER,
            origin_chain: "test-chain".into(),
            issuance_timestamp: issuance,
            expiration_timestamp: expiration,
            original_data: b"proof".to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unverified_issuer_rejected() {
        let k = setup(false);
        let err = k
            .add_verification_details(USER, VerificationType::Kyc, &details(1, 0))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidIssuer(_)));
        assert!(err.to_string().contains("issuer not verified"));
        assert!(k.get_full_address_details(USER).unwrap().verifications.is_empty());
    }

    #[test]
    fn test_add_and_read_back() {
        let k = setup(true);
        let id = k
            .add_verification_details(USER, VerificationType::Kyc, &details(10, 20))
            .unwrap();
        assert_eq!(id.len(), 32);

        let stored = k.get_verification_details(&id).unwrap();
        assert_eq!(stored.verification_type, VerificationType::Kyc);
        assert_eq!(stored.issuer_address, ISSUER);

        let address = k.get_address_details(USER).unwrap();
        assert_eq!(address.verifications.len(), 1);
        assert_eq!(address.verifications[0].verification_id, id);
        assert_eq!(k.get_holder_by_verification_id(&id).unwrap(), Some(USER));
    }

    #[test]
    fn test_validation_order_and_errors() {
        let k = setup(true);
        assert!(matches!(
            k.add_verification_details(USER, VerificationType::Unspecified, &details(1, 0)),
            Err(RegistryError::InvalidParam(_))
        ));
        assert!(matches!(
            k.add_verification_details(USER, VerificationType::Kyc, &details(0, 0)),
            Err(RegistryError::InvalidParam(_))
        ));
        assert!(matches!(
            k.add_verification_details(USER, VerificationType::Kyc, &details(5, 5)),
            Err(RegistryError::InvalidParam(_))
        ));
        let mut empty = details(1, 0);
        empty.original_data.clear();
        assert!(matches!(
            k.add_verification_details(USER, VerificationType::Kyc, &empty),
            Err(RegistryError::InvalidParam(_))
        ));
        let mut oversized = details(1, 0);
        oversized.original_data = vec![0; RegistryParams::default().max_proof_data_size + 1];
        assert!(matches!(
            k.add_verification_details(USER, VerificationType::Kyc, &oversized),
            Err(RegistryError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let k = setup(true);
        k.add_verification_details(USER, VerificationType::Kyc, &details(1, 0))
            .unwrap();
        assert!(matches!(
            k.add_verification_details(USER, VerificationType::Kyc, &details(1, 0)),
            Err(RegistryError::InvalidParam(_))
        ));
        // Same data under another type is a different verification.
        k.add_verification_details(USER, VerificationType::Aml, &details(1, 0))
            .unwrap();
    }

    #[test]
    fn test_id_depends_on_user_and_type() {
        let d = details(1, 0);
        let a = verification_id(USER, VerificationType::Kyc, &d).unwrap();
        let b = verification_id(ISSUER, VerificationType::Kyc, &d).unwrap();
        let c = verification_id(USER, VerificationType::Kyb, &d).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, verification_id(USER, VerificationType::Kyc, &d).unwrap());
    }

    #[test]
    fn test_has_verification_of_type_filters() {
        let k = setup(true);
        k.add_verification_details(USER, VerificationType::Kyc, &details(10, 100))
            .unwrap();
        let other = Address::repeat_byte(0x0b);

        assert!(!k.has_verification_of_type(USER, VerificationType::Kyc, 0, &[]).unwrap());
        assert!(k.has_verification_of_type(USER, VerificationType::Kyc, 50, &[]).unwrap());
        assert!(k.has_verification_of_type(USER, VerificationType::Kyc, 100, &[ISSUER]).unwrap());
        assert!(!k.has_verification_of_type(USER, VerificationType::Kyc, 101, &[]).unwrap());
        assert!(!k.has_verification_of_type(USER, VerificationType::Kyc, 50, &[other]).unwrap());
        assert!(!k.has_verification_of_type(USER, VerificationType::Aml, 50, &[]).unwrap());
    }

    #[test]
    fn test_never_expiring_verification_matches_forever_query() {
        let k = setup(true);
        k.add_verification_details(USER, VerificationType::Kyc, &details(10, 0))
            .unwrap();
        assert!(k.has_verification_of_type(USER, VerificationType::Kyc, 0, &[]).unwrap());
    }

    #[test]
    fn test_get_verifications_of_type() {
        let k = setup(true);
        k.add_verification_details(USER, VerificationType::Kyc, &details(1, 0))
            .unwrap();
        k.add_verification_details(USER, VerificationType::Kyc, &details(2, 0))
            .unwrap();
        k.add_verification_details(USER, VerificationType::Aml, &details(3, 0))
            .unwrap();
        assert_eq!(
            k.get_verifications_of_type(USER, VerificationType::Kyc, &[])
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            k.get_verifications_of_type(USER, VerificationType::Kyc, &[Address::ZERO])
                .unwrap()
                .len(),
            0
        );
        assert_eq!(
            k.get_verification_details_by_issuer(USER, ISSUER).unwrap().len(),
            3
        );
    }

    #[test]
    fn test_revoke_verification() {
        let k = setup(true);
        let id = k
            .add_verification_details(USER, VerificationType::Kyc, &details(1, 0))
            .unwrap();
        assert!(!k.is_verification_revoked(&id).unwrap());

        assert!(matches!(
            k.revoke_verification(&id, USER),
            Err(RegistryError::InvalidParam(_))
        ));
        k.revoke_verification(&id, ISSUER).unwrap();
        assert!(k.is_verification_revoked(&id).unwrap());
        assert!(matches!(
            k.revoke_verification(&id, ISSUER),
            Err(RegistryError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_issuer_suspension_revokes_reads() {
        let k = setup(true);
        let id = k
            .add_verification_details(USER, VerificationType::Kyc, &details(1, 0))
            .unwrap();
        k.set_address_revocation_status(ISSUER, true).unwrap();
        assert!(k.is_verification_revoked(&id).unwrap());
        k.set_address_revocation_status(ISSUER, false).unwrap();
        k.set_address_verification_status(ISSUER, false).unwrap();
        assert!(k.is_verification_revoked(&id).unwrap());
    }

    #[test]
    fn test_unknown_id_reads_as_zero() {
        let k = setup(true);
        assert!(k.get_verification_details(b"missing").unwrap().is_empty());
        assert!(k.is_verification_revoked(b"missing").unwrap());
        assert!(matches!(
            k.get_credential_hash_by_verification_id(b"missing"),
            Err(RegistryError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_supplied_key_links_and_commits() {
        let k = setup(true);
        let key = trustreg_crypto::PublicKey::from_coordinates(
            trustreg_crypto::fr_from_decimal(
                "5299619240641551281634865583518297030282874472190772894086521144482721001553",
            )
            .unwrap(),
            trustreg_crypto::fr_from_decimal(
                "16950150798460657717958625567821834550301663161624707787222815936182638968203",
            )
            .unwrap(),
        )
        .unwrap();
        let id = k
            .add_verification_details_with_public_key(
                USER,
                VerificationType::Kyc,
                &details(1, 0),
                &key.compress(),
            )
            .unwrap();
        let x = extract_x_coordinate(&key.compress()).unwrap();
        assert_eq!(k.get_pub_key_by_verification_id(&id).unwrap(), Some(x.to_vec()));

        let hash = k.get_credential_hash_by_verification_id(&id).unwrap();
        assert!(k.trees().unwrap().is_included_in_issuance_tree(hash).unwrap());
    }

    #[test]
    fn test_credential_hash_requires_public_key() {
        let k = setup(true);
        let id = k
            .add_verification_details(USER, VerificationType::Kyc, &details(1, 0))
            .unwrap();
        assert!(matches!(
            k.get_credential_hash_by_verification_id(&id),
            Err(RegistryError::InvalidParam(_))
        ));
    }
}
