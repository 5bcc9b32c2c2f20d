//! usersync Core Library
//!
//! Shared identity types for usersync.
//!
//! # Modules
//!
//! - [`ids`] - Identity keys, identity types and target instance identifiers
//! - [`traits`] - Instance scoping trait (InstanceScoped)
//! - [`error`] - Standardized error types (UserSyncError)
//!
//! # Example
//!
//! ```
//! use usersync_core::{IdentityKey, IdentityType, InstanceId};
//!
//! let key = IdentityKey::new(IdentityType::FederatedId, "Alice@Example.com", Some("example.com"));
//! assert_eq!(key.to_string(), "federatedID,alice@example.com,example.com");
//!
//! let parsed: IdentityKey = "federatedID,alice@example.com,example.com".parse().unwrap();
//! assert_eq!(parsed, key);
//!
//! assert!(InstanceId::from_column(None).is_primary());
//! ```

pub mod error;
pub mod ids;
pub mod traits;

pub use error::{Result, UserSyncError};
pub use ids::{IdentityKey, IdentityType, InstanceId};
pub use traits::InstanceScoped;
