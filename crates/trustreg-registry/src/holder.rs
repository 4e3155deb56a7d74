//! # Holders
//!
//! A holder registers one BabyJubJub public key, stored as its `x`
//! coordinate. Each verification is linked to the address it was issued to
//! and, once a key is known, to that key. Links are write-once: relinking
//! to the same target is accepted, relinking elsewhere is refused.

use alloy_primitives::Address;
use trustreg_core::KvStore;
use trustreg_crypto::extract_x_coordinate;

use crate::error::RegistryError;
use crate::keeper::Keeper;
use crate::keys;
use crate::verification::credential_hash;

impl<S: KvStore + Clone> Keeper<S> {
    /// Register `user`'s compressed public key.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if the user already has a key or the key does not
    /// decode to a curve point.
    pub fn set_holder_public_key(
        &self,
        user: Address,
        compressed_public_key: &[u8],
    ) -> Result<(), RegistryError> {
        if self.get_holder_public_key(user)?.is_some() {
            return Err(RegistryError::InvalidParam(
                "public key already set for this user".to_string(),
            ));
        }
        let x = extract_x_coordinate(compressed_public_key)
            .map_err(|e| RegistryError::InvalidParam(format!("cannot parse public key: {e}")))?;
        self.set_holder_public_key_bytes(user, &x);
        tracing::info!(user = %user, "holder public key registered");
        Ok(())
    }

    /// Store an already extracted `x` coordinate. Used by genesis import.
    pub fn set_holder_public_key_bytes(&self, user: Address, public_key: &[u8]) {
        self.prefixed(keys::HOLDER_PUBLIC_KEYS)
            .set(user.as_slice(), public_key.to_vec());
    }

    /// The `x` coordinate registered by `user`.
    pub fn get_holder_public_key(&self, user: Address) -> Result<Option<Vec<u8>>, RegistryError> {
        Ok(self
            .prefixed(keys::HOLDER_PUBLIC_KEYS)
            .get(user.as_slice())
            .filter(|key| !key.is_empty()))
    }

    /// Link verification `id` to the address it was issued to.
    pub fn link_verification_to_holder(&self, user: Address, id: &[u8]) -> Result<(), RegistryError> {
        match self.get_holder_by_verification_id(id)? {
            Some(holder) if holder == user => Ok(()),
            Some(holder) => Err(RegistryError::BadRequest(format!(
                "verification already linked to holder {holder}"
            ))),
            None => {
                self.prefixed(keys::VERIFICATION_TO_HOLDER)
                    .set(id, user.as_slice().to_vec());
                Ok(())
            }
        }
    }

    /// Address verification `id` was issued to.
    pub fn get_holder_by_verification_id(&self, id: &[u8]) -> Result<Option<Address>, RegistryError> {
        let Some(raw) = self.prefixed(keys::VERIFICATION_TO_HOLDER).get(id) else {
            return Ok(None);
        };
        Address::try_from(raw.as_slice())
            .map(Some)
            .map_err(|_| {
                RegistryError::Internal(format!(
                    "corrupt holder link for verification 0x{}",
                    hex::encode(id)
                ))
            })
    }

    /// Link verification `id` to a holder public key.
    pub fn link_verification_id_to_pub_key(
        &self,
        public_key: &[u8],
        id: &[u8],
    ) -> Result<(), RegistryError> {
        match self.get_pub_key_by_verification_id(id)? {
            Some(existing) if existing == public_key => Ok(()),
            Some(_) => Err(RegistryError::BadRequest(
                "verification already linked to another public key".to_string(),
            )),
            None => {
                self.prefixed(keys::VERIFICATION_TO_PUBKEY)
                    .set(id, public_key.to_vec());
                Ok(())
            }
        }
    }

    /// Public key verification `id` is linked to.
    pub fn get_pub_key_by_verification_id(
        &self,
        id: &[u8],
    ) -> Result<Option<Vec<u8>>, RegistryError> {
        Ok(self
            .prefixed(keys::VERIFICATION_TO_PUBKEY)
            .get(id)
            .filter(|key| !key.is_empty()))
    }

    /// Commit an existing verification to the issuance tree on behalf of
    /// its holder.
    ///
    /// Covers verifications issued before the holder registered a key. The
    /// holder's registered key wins over `compressed_public_key`, which is
    /// only consulted when none is registered.
    pub fn convert_credential(
        &self,
        caller: Address,
        id: &[u8],
        compressed_public_key: Option<&[u8]>,
    ) -> Result<(), RegistryError> {
        let details = self.get_verification_details(id)?;
        if details.is_empty() {
            return Err(RegistryError::InvalidParam(
                "verification with provided ID does not exist".to_string(),
            ));
        }
        let holder = self.get_holder_by_verification_id(id)?;
        if holder != Some(caller) {
            return Err(RegistryError::BadRequest(
                "caller is not the verification holder".to_string(),
            ));
        }

        let public_key = match self.get_holder_public_key(caller)? {
            Some(key) => key,
            None => {
                let compressed = compressed_public_key.unwrap_or_default();
                extract_x_coordinate(compressed)
                    .map_err(|e| {
                        RegistryError::InvalidParam(format!("cannot parse public key: {e}"))
                    })?
                    .to_vec()
            }
        };
        self.link_verification_id_to_pub_key(&public_key, id)?;

        if details.is_revoked {
            return Err(RegistryError::BadRequest("credential was revoked".to_string()));
        }
        let hash = credential_hash(&details, &public_key)?;
        let trees = self.trees()?;
        if trees.is_included_in_issuance_tree(hash)? {
            return Err(RegistryError::BadRequest(
                "credential already included in issuance tree".to_string(),
            ));
        }
        trees.add_credential_hash_to_issued(hash)?;
        tracing::info!(id = %hex::encode(id), holder = %caller, "credential converted");
        Ok(())
    }
}
