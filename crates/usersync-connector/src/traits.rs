//! Capability traits for the systems around the rule engine.
//!
//! A [`DirectorySource`] supplies the authoritative records; a
//! [`TargetClient`] supplies target snapshots and executes planned ops.
//! The engine is agnostic to which backend implements either side.

use async_trait::async_trait;
use usersync_core::InstanceId;

use crate::error::ConnectorResult;
use crate::identity::TargetIdentity;
use crate::operation::ReconciliationOp;
use crate::record::{normalize_records, RecordNormalizer, SourceBatch, SourceRecord};

/// Authoritative directory feed (LDAP, CSV export, roster API, ...).
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Get the display name for this source.
    fn display_name(&self) -> &str;

    /// Fetch every raw record from scratch.
    ///
    /// The result is finite and restartable: calling again re-reads the feed.
    async fn fetch_records(&self) -> ConnectorResult<Vec<SourceRecord>>;

    /// Fetch and normalize the full source set.
    ///
    /// Malformed rows are quarantined in the returned batch, not raised.
    async fn produce(&self, normalizer: &RecordNormalizer) -> ConnectorResult<SourceBatch> {
        let records = self.fetch_records().await?;
        Ok(normalize_records(&records, normalizer))
    }
}

/// Client of the remote identity-management system.
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Get the display name for this client.
    fn display_name(&self) -> &str;

    /// Full identity listing of one target instance.
    ///
    /// Must return the complete set or an error; a partial listing would
    /// make unfetched identities look like strays.
    async fn snapshot(&self, instance: &InstanceId) -> ConnectorResult<Vec<TargetIdentity>>;

    /// Apply one planned op.
    async fn apply(&self, op: &ReconciliationOp) -> ConnectorResult<()>;
}
