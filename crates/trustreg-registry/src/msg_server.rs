//! # Message Server
//!
//! Transaction messages and their handlers. Messages arrive decoded, with
//! the signer already authenticated; addresses and byte fields are still in
//! their textual form. `validate_basic` parses them, the handler passes the
//! parsed values to the keeper for the stateful checks, then emits its
//! module event.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use trustreg_core::KvStore;

use crate::error::RegistryError;
use crate::events::{
    Event, ATTR_HOLDER, ATTR_ISSUER, ATTR_ISSUER_DETAILS, ATTR_OPERATOR, ATTR_REVOCATION_STATUS,
    ATTR_VERIFICATION_ID, ATTR_VERIFICATION_STATUS, EVENT_ADD_ISSUER, EVENT_ADD_OPERATOR,
    EVENT_ADD_VERIFICATION, EVENT_ATTACH_PUBLIC_KEY, EVENT_CONVERT_CREDENTIAL,
    EVENT_REMOVE_ISSUER, EVENT_REMOVE_OPERATOR, EVENT_REVOKE_VERIFICATION, EVENT_UPDATE_ISSUER,
    EVENT_VERIFY_ISSUER,
};
use crate::keeper::Keeper;
use crate::types::{
    hex_bytes, parse_address, parse_hex, IssuerDetails, OperatorType, VerificationDetails,
    VerificationType,
};

// ─── Messages ────────────────────────────────────────────────────────

/// Register a regular operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddOperator {
    /// Existing operator.
    pub signer: String,
    /// Operator to add.
    pub operator: String,
}

impl MsgAddOperator {
    /// Stateless checks; returns the signer and the new operator.
    pub fn validate_basic(&self) -> Result<(Address, Address), RegistryError> {
        address_pair(&self.signer, &self.operator)
    }
}

/// Remove a regular operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRemoveOperator {
    /// Existing operator.
    pub signer: String,
    /// Operator to remove.
    pub operator: String,
}

impl MsgRemoveOperator {
    /// Stateless checks; returns the signer and the operator to remove.
    pub fn validate_basic(&self) -> Result<(Address, Address), RegistryError> {
        address_pair(&self.signer, &self.operator)
    }
}

/// Create an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetIssuerDetails {
    /// Operator creating the issuer.
    pub signer: String,
    /// Address of the new issuer.
    pub issuer_address: String,
    /// Issuer profile; `operator` must be the signer.
    pub details: IssuerDetails,
}

impl MsgSetIssuerDetails {
    /// Stateless checks; returns the signer and the issuer.
    pub fn validate_basic(&self) -> Result<(Address, Address), RegistryError> {
        validate_issuer_details(&self.details)?;
        address_pair(&self.signer, &self.issuer_address)
    }
}

/// Replace an issuer's details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateIssuerDetails {
    /// Current operator of the issuer.
    pub signer: String,
    /// Issuer to update.
    pub issuer_address: String,
    /// New profile; `operator` may name a different operator.
    pub details: IssuerDetails,
}

impl MsgUpdateIssuerDetails {
    /// Stateless checks; returns the signer, the issuer and the new
    /// operator.
    pub fn validate_basic(&self) -> Result<(Address, Address, Address), RegistryError> {
        let new_operator = validate_issuer_details(&self.details)?;
        let (signer, issuer) = address_pair(&self.signer, &self.issuer_address)?;
        Ok((signer, issuer, new_operator))
    }
}

/// Remove an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRemoveIssuer {
    /// Operator of the issuer.
    pub signer: String,
    /// Issuer to remove.
    pub issuer_address: String,
}

impl MsgRemoveIssuer {
    /// Stateless checks; returns the signer and the issuer.
    pub fn validate_basic(&self) -> Result<(Address, Address), RegistryError> {
        address_pair(&self.signer, &self.issuer_address)
    }
}

/// Set the verified and revoked flags of an issuer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetAddressInfo {
    /// Operator of the issuer.
    pub signer: String,
    /// Issuer address.
    pub user_address: String,
    /// New verified flag.
    pub is_verified: bool,
    /// New revoked flag.
    pub is_revoked: bool,
}

impl MsgSetAddressInfo {
    /// Stateless checks; returns the signer and the issuer.
    pub fn validate_basic(&self) -> Result<(Address, Address), RegistryError> {
        address_pair(&self.signer, &self.user_address)
    }
}

/// Attach a verification to a user, signed by the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsgSetVerificationData {
    /// Issuer.
    pub signer: String,
    /// Verified user.
    pub user_address: String,
    /// Verification kind.
    pub verification_type: VerificationType,
    /// Chain the verification was performed for.
    pub origin_chain: String,
    /// Unix seconds.
    pub issuance_timestamp: u32,
    /// Unix seconds, 0 for never.
    pub expiration_timestamp: u32,
    /// Proof material.
    #[serde(with = "hex_bytes")]
    pub original_data: Vec<u8>,
    /// Optional supplementary proof.
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
    /// Schema reference.
    pub schema: String,
    /// Issuer-side id.
    pub issuer_verification_id: String,
    /// Format version.
    pub version: u32,
    /// Compressed holder public key, hex. When set the credential is
    /// committed under this key.
    pub holder_public_key: Option<String>,
}

impl MsgSetVerificationData {
    /// Stateless checks; returns the issuer, the user and the decoded
    /// holder key if one was supplied.
    pub fn validate_basic(&self) -> Result<(Address, Address, Option<Vec<u8>>), RegistryError> {
        let (issuer, user) = address_pair(&self.signer, &self.user_address)?;
        let key = optional_hex("holder public key", self.holder_public_key.as_deref())?;
        Ok((issuer, user, key))
    }

    fn details(&self, issuer: Address) -> VerificationDetails {
        VerificationDetails {
            verification_type: self.verification_type,
            issuer_address: issuer,
            origin_chain: self.origin_chain.clone(),
            issuance_timestamp: self.issuance_timestamp,
            expiration_timestamp: self.expiration_timestamp,
            original_data: self.original_data.clone(),
            proof: self.proof.clone(),
            schema: self.schema.clone(),
            issuer_verification_id: self.issuer_verification_id.clone(),
            version: self.version,
            is_revoked: false,
        }
    }
}

/// Response to [`MsgSetVerificationData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetVerificationDataResponse {
    /// Id of the new verification.
    #[serde(with = "hex_bytes")]
    pub verification_id: Vec<u8>,
}

/// Revoke a verification, signed by its issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRevokeVerification {
    /// Issuer.
    pub signer: String,
    /// Verification id, hex.
    pub verification_id: String,
}

impl MsgRevokeVerification {
    /// Stateless checks; returns the issuer and the verification id.
    pub fn validate_basic(&self) -> Result<(Address, Vec<u8>), RegistryError> {
        Ok((
            parse_address(&self.signer)?,
            non_empty_hex("verification id", &self.verification_id)?,
        ))
    }
}

/// Register the signer's holder public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAttachHolderPublicKey {
    /// Holder.
    pub signer: String,
    /// Compressed public key, hex.
    pub holder_public_key: String,
}

impl MsgAttachHolderPublicKey {
    /// Stateless checks; returns the holder and the decoded key.
    pub fn validate_basic(&self) -> Result<(Address, Vec<u8>), RegistryError> {
        Ok((
            parse_address(&self.signer)?,
            non_empty_hex("holder public key", &self.holder_public_key)?,
        ))
    }
}

/// Commit an existing verification to the issuance tree, signed by its
/// holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgConvertCredential {
    /// Holder.
    pub signer: String,
    /// Verification id, hex.
    pub verification_id: String,
    /// Compressed public key, hex; used when the holder has none
    /// registered.
    pub holder_public_key: Option<String>,
}

impl MsgConvertCredential {
    /// Stateless checks; returns the holder, the verification id and the
    /// decoded key if one was supplied.
    pub fn validate_basic(&self) -> Result<(Address, Vec<u8>, Option<Vec<u8>>), RegistryError> {
        Ok((
            parse_address(&self.signer)?,
            non_empty_hex("verification id", &self.verification_id)?,
            optional_hex("holder public key", self.holder_public_key.as_deref())?,
        ))
    }
}

fn address_pair(signer: &str, other: &str) -> Result<(Address, Address), RegistryError> {
    Ok((parse_address(signer)?, parse_address(other)?))
}

/// Checks the name and returns the parsed operator.
fn validate_issuer_details(details: &IssuerDetails) -> Result<Address, RegistryError> {
    if details.name.trim().is_empty() {
        return Err(RegistryError::BasicValidation("issuer name is empty".to_string()));
    }
    parse_address(&details.operator)
}

fn non_empty_hex(field: &str, s: &str) -> Result<Vec<u8>, RegistryError> {
    let bytes = parse_hex(field, s)?;
    if bytes.is_empty() {
        return Err(RegistryError::BasicValidation(format!("{field} is empty")));
    }
    Ok(bytes)
}

fn optional_hex(field: &str, s: Option<&str>) -> Result<Option<Vec<u8>>, RegistryError> {
    s.map(|s| parse_hex(field, s)).transpose()
}

// ─── Handlers ────────────────────────────────────────────────────────

/// Handles transaction messages against a [`Keeper`].
#[derive(Debug, Clone)]
pub struct MsgServer<S> {
    keeper: Keeper<S>,
}

impl<S: KvStore + Clone> MsgServer<S> {
    /// Server over `keeper`. Events go to the keeper's event manager.
    pub fn new(keeper: Keeper<S>) -> Self {
        Self { keeper }
    }

    /// The underlying keeper.
    pub fn keeper(&self) -> &Keeper<S> {
        &self.keeper
    }

    fn emit(&self, event: Event) {
        self.keeper.events().emit(event);
    }

    fn require_operator(&self, signer: Address) -> Result<(), RegistryError> {
        if !self.keeper.operator_exists(signer)? {
            return Err(RegistryError::NotAuthorized(format!(
                "signer {signer} is not an operator"
            )));
        }
        Ok(())
    }

    /// Handle [`MsgAddOperator`].
    pub fn add_operator(&self, msg: &MsgAddOperator) -> Result<(), RegistryError> {
        let (signer, operator) = msg.validate_basic()?;
        self.require_operator(signer)?;
        if self.keeper.operator_exists(operator)? {
            return Err(RegistryError::InvalidParam("operator already exists".to_string()));
        }
        self.keeper.add_operator(operator, OperatorType::Regular)?;
        self.emit(Event::new(EVENT_ADD_OPERATOR).attr(ATTR_OPERATOR, operator));
        Ok(())
    }

    /// Handle [`MsgRemoveOperator`].
    pub fn remove_operator(&self, msg: &MsgRemoveOperator) -> Result<(), RegistryError> {
        let (signer, operator) = msg.validate_basic()?;
        self.require_operator(signer)?;
        self.keeper.remove_regular_operator(operator)?;
        self.emit(Event::new(EVENT_REMOVE_OPERATOR).attr(ATTR_OPERATOR, operator));
        Ok(())
    }

    /// Handle [`MsgSetIssuerDetails`].
    pub fn set_issuer_details(&self, msg: &MsgSetIssuerDetails) -> Result<(), RegistryError> {
        let (signer, issuer) = msg.validate_basic()?;
        self.require_operator(signer)?;
        self.keeper.set_issuer_details(signer, issuer, &msg.details)?;
        self.emit(
            Event::new(EVENT_ADD_ISSUER)
                .attr(ATTR_ISSUER, issuer)
                .attr(ATTR_ISSUER_DETAILS, details_json(&msg.details)?),
        );
        Ok(())
    }

    /// Handle [`MsgUpdateIssuerDetails`].
    pub fn update_issuer_details(&self, msg: &MsgUpdateIssuerDetails) -> Result<(), RegistryError> {
        let (signer, issuer, new_operator) = msg.validate_basic()?;
        if !self.keeper.operator_exists(new_operator)? {
            return Err(RegistryError::InvalidOperator(format!(
                "{new_operator} is not an operator"
            )));
        }
        self.keeper.update_issuer_details(signer, issuer, &msg.details)?;
        self.emit(
            Event::new(EVENT_UPDATE_ISSUER)
                .attr(ATTR_ISSUER, issuer)
                .attr(ATTR_ISSUER_DETAILS, details_json(&msg.details)?),
        );
        Ok(())
    }

    /// Handle [`MsgRemoveIssuer`].
    pub fn remove_issuer(&self, msg: &MsgRemoveIssuer) -> Result<(), RegistryError> {
        let (signer, issuer) = msg.validate_basic()?;
        self.keeper.remove_issuer(signer, issuer)?;
        self.emit(Event::new(EVENT_REMOVE_ISSUER).attr(ATTR_ISSUER, issuer));
        Ok(())
    }

    /// Handle [`MsgSetAddressInfo`].
    pub fn set_address_info(&self, msg: &MsgSetAddressInfo) -> Result<(), RegistryError> {
        let (signer, issuer) = msg.validate_basic()?;
        self.require_operator(signer)?;
        self.keeper.issuer_managed_by(signer, issuer)?;
        self.keeper
            .set_address_verification_status(issuer, msg.is_verified)?;
        self.keeper
            .set_address_revocation_status(issuer, msg.is_revoked)?;
        self.emit(
            Event::new(EVENT_VERIFY_ISSUER)
                .attr(ATTR_ISSUER, issuer)
                .attr(ATTR_VERIFICATION_STATUS, msg.is_verified)
                .attr(ATTR_REVOCATION_STATUS, msg.is_revoked),
        );
        Ok(())
    }

    /// Handle [`MsgSetVerificationData`].
    pub fn set_verification_data(
        &self,
        msg: &MsgSetVerificationData,
    ) -> Result<MsgSetVerificationDataResponse, RegistryError> {
        let (issuer, user, key) = msg.validate_basic()?;
        let details = msg.details(issuer);
        let verification_id = match key {
            Some(key) => self.keeper.add_verification_details_with_public_key(
                user,
                msg.verification_type,
                &details,
                &key,
            )?,
            None => self
                .keeper
                .add_verification_details(user, msg.verification_type, &details)?,
        };
        self.emit(
            Event::new(EVENT_ADD_VERIFICATION)
                .attr(ATTR_ISSUER, issuer)
                .attr(ATTR_HOLDER, user)
                .attr(ATTR_VERIFICATION_ID, hex::encode(&verification_id)),
        );
        Ok(MsgSetVerificationDataResponse { verification_id })
    }

    /// Handle [`MsgRevokeVerification`].
    pub fn revoke_verification(&self, msg: &MsgRevokeVerification) -> Result<(), RegistryError> {
        let (issuer, id) = msg.validate_basic()?;
        self.keeper.revoke_verification(&id, issuer)?;
        self.emit(
            Event::new(EVENT_REVOKE_VERIFICATION)
                .attr(ATTR_ISSUER, issuer)
                .attr(ATTR_VERIFICATION_ID, hex::encode(&id)),
        );
        Ok(())
    }

    /// Handle [`MsgAttachHolderPublicKey`].
    pub fn attach_holder_public_key(
        &self,
        msg: &MsgAttachHolderPublicKey,
    ) -> Result<(), RegistryError> {
        let (holder, key) = msg.validate_basic()?;
        self.keeper.set_holder_public_key(holder, &key)?;
        self.emit(Event::new(EVENT_ATTACH_PUBLIC_KEY).attr(ATTR_HOLDER, holder));
        Ok(())
    }

    /// Handle [`MsgConvertCredential`].
    pub fn convert_credential(&self, msg: &MsgConvertCredential) -> Result<(), RegistryError> {
        let (holder, id, key) = msg.validate_basic()?;
        self.keeper.convert_credential(holder, &id, key.as_deref())?;
        self.emit(
            Event::new(EVENT_CONVERT_CREDENTIAL)
                .attr(ATTR_HOLDER, holder)
                .attr(ATTR_VERIFICATION_ID, hex::encode(&id)),
        );
        Ok(())
    }
}

fn details_json(details: &IssuerDetails) -> Result<String, RegistryError> {
    serde_json::to_string(details)
        .map_err(|e| RegistryError::Internal(format!("cannot encode issuer details: {e}")))
}
