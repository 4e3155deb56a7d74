//! # trustreg-core — Foundational Types for the Trust Registry
//!
//! Leaf crate of the workspace. Everything the registry persists flows
//! through the primitives defined here.
//!
//! ## Key Design Principles
//!
//! 1. **One store contract.** `KvStore` is the only view of persistence the
//!    registry has: get, set, delete and ordered prefix scans. The host's
//!    transactional store implements it; `MemStore` implements it for tests
//!    and tooling.
//!
//! 2. **Namespaces by composition.** `PrefixStore` scopes a store to one
//!    entity kind, `CacheStore` branches a store so a multi-step operation
//!    either commits every write or none of them.
//!
//! 3. **`CanonicalBytes` for content identifiers.** Identifiers derived from
//!    record content are computed over RFC 8785 canonical JSON, never over
//!    an ad-hoc `serde_json::to_vec()`.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `trustreg-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod error;
pub mod params;
pub mod store;

// ─── Re-exports ─────────────────────────────────────────────────────

pub use canonical::CanonicalBytes;
pub use error::{CanonicalizationError, CodecError, ConfigError};
pub use params::RegistryParams;
pub use store::{load_record, save_record, CacheStore, KvStore, MemStore, PrefixStore};
