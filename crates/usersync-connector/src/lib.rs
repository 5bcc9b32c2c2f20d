//! # Connector Boundary
//!
//! Types and capability traits at the edge of the reconciliation engine.
//!
//! The engine never talks to a directory or a target system directly. It
//! consumes normalized identities produced through a [`DirectorySource`]
//! and snapshots produced by a [`TargetClient`], and hands planned
//! [`ReconciliationOp`] values back to the same client.
//!
//! ## Crate Organization
//!
//! - [`error`] - Error types with transient/permanent classification
//! - [`identity`] - `SourceIdentity` / `TargetIdentity`
//! - [`record`] - Raw directory rows and their normalization
//! - [`operation`] - Planned operations
//! - [`traits`] - `DirectorySource` and `TargetClient`
//! - [`csv_source`] - CSV directory backend
//! - [`memory`] - In-memory directory and target backends
//!
//! ## Example
//!
//! ```
//! use usersync_connector::prelude::*;
//!
//! let record = SourceRecord {
//!     email: Some("alice@example.com".to_string()),
//!     groups: vec!["eng".to_string()],
//!     ..SourceRecord::default()
//! };
//! let identity = RecordNormalizer::default().normalize(&record).unwrap();
//! assert_eq!(identity.key().to_string(), "federatedID,alice@example.com,example.com");
//! ```

pub mod csv_source;
pub mod error;
pub mod identity;
pub mod memory;
pub mod operation;
pub mod record;
pub mod traits;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::csv_source::CsvDirectorySource;
    pub use crate::error::{ConnectorError, ConnectorResult, RecordError};
    pub use crate::identity::{IdentityAttributes, SourceIdentity, TargetIdentity, TargetStatus};
    pub use crate::memory::{InMemoryDirectory, InMemoryTarget};
    pub use crate::operation::{AttributeMap, NoOpReason, OpKind, ReconciliationOp};
    pub use crate::record::{normalize_records, RecordNormalizer, SourceBatch, SourceRecord};
    pub use crate::traits::{DirectorySource, TargetClient};
    pub use usersync_core::{IdentityKey, IdentityType, InstanceId, InstanceScoped};
}

pub use error::{ConnectorError, ConnectorResult, RecordError};
pub use identity::{IdentityAttributes, SourceIdentity, TargetIdentity, TargetStatus};
pub use operation::{AttributeMap, NoOpReason, OpKind, ReconciliationOp};
pub use record::{RecordNormalizer, SourceBatch, SourceRecord};
pub use traits::{DirectorySource, TargetClient};

// Re-export async_trait for backend implementors
pub use async_trait::async_trait;
