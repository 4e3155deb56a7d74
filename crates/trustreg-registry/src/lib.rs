//! # trustreg-registry — Compliance Trust Registry
//!
//! Operators appoint issuers; issuers, once verified through governance or
//! by their operator, attach verifications to addresses; any caller can ask
//! whether an address holds a live verification of a given type from an
//! acceptable issuer. Holders who register a BabyJubJub key get their
//! credentials committed to an issuance tree, and revocations to a
//! revocation tree, for consumption by external zero-knowledge circuits.
//!
//! ## Components
//!
//! - **Tree storage** (`tree_storage.rs`): the sparse Merkle tree storage
//!   contract over a prefix of the key-value store.
//!
//! - **Credential trees** (`tree_manager.rs`): the issuance and revocation
//!   trees, their write path and circom-layout proofs.
//!
//! - **Keeper** (`keeper.rs`, `verification.rs`, `holder.rs`,
//!   `iterators.rs`): records, invariants and lazy revocation.
//!
//! - **Genesis** (`genesis.rs`): snapshot import and export.
//!
//! - **Governance** (`governance.rs`): the verify-issuer proposal.
//!
//! - **Migrations** (`migrations.rs`): consensus version upgrades.
//!
//! - **Message and query servers** (`msg_server.rs`, `query.rs`): the
//!   transaction and read surfaces.
//!
//! ## Lazy Revocation
//!
//! Removing an issuer deletes two rows. Everything it issued stays stored
//! and is hidden on read by re-resolving the issuer, so removal cost does
//! not grow with the number of verifications.

pub mod error;
pub mod events;
pub mod genesis;
pub mod governance;
pub mod holder;
pub mod iterators;
pub mod keeper;
pub mod keys;
pub mod migrations;
pub mod msg_server;
pub mod query;
pub mod tree_manager;
pub mod tree_storage;
pub mod types;
pub mod verification;

// ─── Keeper re-exports ──────────────────────────────────────────────

pub use error::{ErrorClass, GenesisError, RegistryError};
pub use events::{Event, EventManager};
pub use keeper::Keeper;
pub use types::{
    AddressDetails, IssuerDetails, OperatorDetails, OperatorType, Verification,
    VerificationDetails, VerificationType, ZkCredential,
};
pub use verification::{credential_hash, verification_id};

// ─── Tree re-exports ────────────────────────────────────────────────

pub use tree_manager::{credential_key, CredentialTreeManager, TreeKind};
pub use tree_storage::TreeStorage;

// ─── Surface re-exports ─────────────────────────────────────────────

pub use genesis::{export_genesis, init_genesis, GenesisState};
pub use governance::{handle_proposal, VerifyIssuerProposal};
pub use migrations::{Migrator, CONSENSUS_VERSION};
pub use msg_server::MsgServer;
pub use query::{PageRequest, QueryServer};
