//! # Module Events
//!
//! Typed events emitted by message handlers and the governance hook. The
//! keeper collects them in its [`EventManager`]; the host drains the
//! manager after each transition and forwards the events.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Operator added.
pub const EVENT_ADD_OPERATOR: &str = "add_operator";
/// Operator removed.
pub const EVENT_REMOVE_OPERATOR: &str = "remove_operator";
/// Issuer created.
pub const EVENT_ADD_ISSUER: &str = "add_issuer";
/// Issuer details replaced.
pub const EVENT_UPDATE_ISSUER: &str = "update_issuer";
/// Issuer removed.
pub const EVENT_REMOVE_ISSUER: &str = "remove_issuer";
/// Issuer verification status changed.
pub const EVENT_VERIFY_ISSUER: &str = "verify_issuer";
/// Verification attached to an address.
pub const EVENT_ADD_VERIFICATION: &str = "add_verification";
/// Verification revoked by its issuer.
pub const EVENT_REVOKE_VERIFICATION: &str = "revoke_verification";
/// Holder public key registered.
pub const EVENT_ATTACH_PUBLIC_KEY: &str = "attach_public_key";
/// Existing verification committed to the issuance tree.
pub const EVENT_CONVERT_CREDENTIAL: &str = "convert_credential";

/// Attribute: operator address.
pub const ATTR_OPERATOR: &str = "operator";
/// Attribute: issuer address.
pub const ATTR_ISSUER: &str = "issuer";
/// Attribute: issuer details as JSON.
pub const ATTR_ISSUER_DETAILS: &str = "issuer_details";
/// Attribute: new verification status.
pub const ATTR_VERIFICATION_STATUS: &str = "verification_status";
/// Attribute: new revocation status.
pub const ATTR_REVOCATION_STATUS: &str = "revocation_status";
/// Attribute: verification id, hex.
pub const ATTR_VERIFICATION_ID: &str = "verification_id";
/// Attribute: holder address.
pub const ATTR_HOLDER: &str = "holder";

/// A module event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, one of the `EVENT_*` constants.
    pub kind: String,
    /// Ordered key/value attributes.
    pub attributes: Vec<(String, String)>,
}

impl Event {
    /// Event of type `kind` with no attributes.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            attributes: Vec::new(),
        }
    }

    /// Append an attribute.
    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    /// Value of the first attribute named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Collects events in emission order. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    pub fn emit(&self, event: Event) {
        tracing::debug!(kind = %event.kind, "module event emitted");
        self.events.lock().push(event);
    }

    /// Events emitted so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Take all events, leaving the manager empty.
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }
}
