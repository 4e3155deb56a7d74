//! # Governance-Gated Issuer Verification
//!
//! A [`VerifyIssuerProposal`] asks governance to mark an issuer verified.
//! The proposal freezes the issuer's details when it is submitted. When the
//! vote passes, [`handle_proposal`] re-reads the issuer and applies the
//! approval only if the issuer still exists and its details still match the
//! frozen copy, so an approval never lands on details nobody voted on.
//!
//! Details are compared by the keccak-256 digest of their canonical JSON.
//! Execution runs in a buffered branch: on any failure nothing is written
//! and no event is emitted.

use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use trustreg_core::{CanonicalBytes, KvStore};

use crate::error::RegistryError;
use crate::events::{Event, ATTR_ISSUER, ATTR_VERIFICATION_STATUS, EVENT_VERIFY_ISSUER};
use crate::keeper::Keeper;
use crate::types::{parse_address, IssuerDetails};

/// Proposal type name registered with the governance router.
pub const PROPOSAL_TYPE_VERIFY_ISSUER: &str = "VerifyIssuer";

/// Governance proposal to verify an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyIssuerProposal {
    /// Proposal title.
    pub title: String,
    /// Proposal description.
    pub description: String,
    /// Issuer to verify, `0x` hex.
    pub issuer_address: String,
    /// Issuer details as they were when the proposal was submitted.
    pub issuer_details: IssuerDetails,
}

impl VerifyIssuerProposal {
    /// Build a proposal for `issuer`, freezing its current details.
    ///
    /// # Errors
    ///
    /// `InvalidIssuer` if the issuer does not exist or is not currently
    /// verified.
    pub fn submit<S: KvStore + Clone>(
        keeper: &Keeper<S>,
        title: impl Into<String>,
        description: impl Into<String>,
        issuer: Address,
    ) -> Result<Self, RegistryError> {
        let issuer_details = keeper.get_issuer_details(issuer)?;
        if !issuer_details.exists() {
            return Err(RegistryError::InvalidIssuer(format!(
                "issuer {issuer} does not exist"
            )));
        }
        if !keeper.is_address_verified(issuer)? {
            return Err(RegistryError::InvalidIssuer(format!(
                "issuer {issuer} is not verified"
            )));
        }
        let proposal = Self {
            title: title.into(),
            description: description.into(),
            issuer_address: issuer.to_string(),
            issuer_details,
        };
        proposal.validate_basic()?;
        Ok(proposal)
    }

    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), RegistryError> {
        if self.title.trim().is_empty() {
            return Err(RegistryError::BasicValidation("proposal title is empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(RegistryError::BasicValidation(
                "proposal description is empty".to_string(),
            ));
        }
        parse_address(&self.issuer_address)?;
        if !self.issuer_details.exists() {
            return Err(RegistryError::BasicValidation(
                "proposal carries no issuer details".to_string(),
            ));
        }
        Ok(())
    }

    /// Digest of the frozen issuer details.
    pub fn snapshot_digest(&self) -> Result<B256, RegistryError> {
        details_digest(&self.issuer_details)
    }

    /// The proposal type name.
    pub fn proposal_type(&self) -> &'static str {
        PROPOSAL_TYPE_VERIFY_ISSUER
    }
}

fn details_digest(details: &IssuerDetails) -> Result<B256, RegistryError> {
    Ok(keccak256(CanonicalBytes::new(details)?))
}

/// Execute a passed [`VerifyIssuerProposal`].
///
/// Runs on a store branch; nothing is written unless the issuer ends up
/// verified.
///
/// # Errors
///
/// `BasicValidation` for a malformed proposal. `InvalidIssuer` when the
/// issuer no longer matches the approved one: it was removed, or its
/// details changed after submission.
pub fn handle_proposal<S: KvStore + Clone>(
    keeper: &Keeper<S>,
    proposal: &VerifyIssuerProposal,
) -> Result<(), RegistryError> {
    proposal.validate_basic()?;
    let issuer = parse_address(&proposal.issuer_address)?;
    let expected = proposal.snapshot_digest()?;

    keeper.atomically(|branch| {
        let current = branch.get_issuer_details(issuer)?;
        if !current.exists() {
            return Err(RegistryError::InvalidIssuer(format!(
                "issuer {issuer} no longer exists"
            )));
        }
        if details_digest(&current)? != expected {
            return Err(RegistryError::InvalidIssuer(
                "issuer details changed since the proposal was submitted".to_string(),
            ));
        }
        branch.set_address_verification_status(issuer, true)?;
        branch.events().emit(
            Event::new(EVENT_VERIFY_ISSUER)
                .attr(ATTR_ISSUER, issuer)
                .attr(ATTR_VERIFICATION_STATUS, true),
        );
        Ok(())
    })?;

    tracing::info!(issuer = %issuer, title = %proposal.title, "verify issuer proposal executed");
    Ok(())
}
