//! Instance Scoping Traits
//!
//! Target identities and planned operations always live in exactly one
//! target instance. Keys are only comparable within the same instance.
//!
//! # Example
//!
//! ```
//! use usersync_core::{IdentityKey, IdentityType, InstanceId, InstanceScoped};
//!
//! struct Account {
//!     instance: InstanceId,
//!     key: IdentityKey,
//! }
//!
//! impl InstanceScoped for Account {
//!     fn instance(&self) -> &InstanceId {
//!         &self.instance
//!     }
//!
//!     fn identity_key(&self) -> &IdentityKey {
//!         &self.key
//!     }
//! }
//!
//! let a = Account {
//!     instance: InstanceId::Primary,
//!     key: IdentityKey::new(IdentityType::FederatedId, "alice", Some("example.com")),
//! };
//! let b = Account {
//!     instance: InstanceId::named("secondary"),
//!     key: IdentityKey::new(IdentityType::FederatedId, "alice", Some("example.com")),
//! };
//! assert!(!a.same_identity(&b));
//! ```

use crate::ids::{IdentityKey, InstanceId};

/// Trait for values scoped to one `(instance, identity key)` pair.
///
/// This trait is object-safe.
pub trait InstanceScoped {
    /// The target instance this value belongs to.
    fn instance(&self) -> &InstanceId;

    /// The identity key within that instance.
    fn identity_key(&self) -> &IdentityKey;

    /// Whether both values address the same identity.
    fn same_identity(&self, other: &dyn InstanceScoped) -> bool {
        self.instance() == other.instance() && self.identity_key() == other.identity_key()
    }
}
