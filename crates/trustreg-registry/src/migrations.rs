//! # Store Migrations
//!
//! Forward-only upgrades between consensus versions. The host calls
//! [`Migrator::migrate`] once per version bump with the version it is
//! leaving. Each routine runs in a buffered branch and commits only if it
//! completes, so a failed migration leaves the store as it found it.

use trustreg_core::KvStore;

use crate::error::RegistryError;
use crate::keeper::Keeper;

/// Consensus version of the current store layout.
pub const CONSENSUS_VERSION: u64 = 2;

/// Dispatches migrations by source version.
#[derive(Debug)]
pub struct Migrator<'a, S> {
    keeper: &'a Keeper<S>,
}

impl<'a, S: KvStore + Clone> Migrator<'a, S> {
    /// Migrator over `keeper`.
    pub fn new(keeper: &'a Keeper<S>) -> Self {
        Self { keeper }
    }

    /// Upgrade the store from `from_version` to `from_version + 1`.
    pub fn migrate(&self, from_version: u64) -> Result<(), RegistryError> {
        match from_version {
            1 => v1_0_7::migrate_store(self.keeper),
            other => Err(RegistryError::Internal(format!(
                "no migration registered from consensus version {other}"
            ))),
        }
    }
}

/// Derive the verification → holder index from address records.
pub mod v1_0_7 {
    use std::ops::ControlFlow;

    use alloy_primitives::Address;
    use trustreg_core::KvStore;

    use crate::error::RegistryError;
    use crate::keeper::Keeper;

    /// Link every verification pointer to the address holding it.
    ///
    /// Pointers are read unfiltered, so verifications of removed issuers are
    /// linked too. Running the migration again changes nothing.
    pub fn migrate_store<S: KvStore + Clone>(keeper: &Keeper<S>) -> Result<(), RegistryError> {
        keeper.atomically(|branch| {
            let mut pointers: Vec<(Address, Vec<u8>)> = Vec::new();
            branch.iterate_address_details(|address, details| {
                for verification in details.verifications {
                    pointers.push((address, verification.verification_id));
                }
                ControlFlow::Continue(())
            })?;

            for (address, id) in &pointers {
                branch.link_verification_to_holder(*address, id)?;
            }
            tracing::info!(links = pointers.len(), "verification holder links derived");
            Ok(())
        })
    }
}
