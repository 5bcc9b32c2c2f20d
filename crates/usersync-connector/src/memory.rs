//! In-memory directory and target backends.
//!
//! Used for dry runs against captured data and for tests. The target applies
//! ops to its own state, so a second pass over the same directory converges.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use usersync_core::{IdentityKey, InstanceId};

use crate::error::{ConnectorError, ConnectorResult};
use crate::identity::{
    TargetIdentity, ATTR_COUNTRY, ATTR_EMAIL, ATTR_FIRSTNAME, ATTR_LASTNAME,
};
use crate::operation::{AttributeMap, OpKind, ReconciliationOp};
use crate::record::SourceRecord;
use crate::traits::{DirectorySource, TargetClient};

/// Directory source serving a fixed set of records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    name: String,
    records: Vec<SourceRecord>,
}

impl InMemoryDirectory {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            name: "memory".to_string(),
            records,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl DirectorySource for InMemoryDirectory {
    fn display_name(&self) -> &str {
        &self.name
    }

    async fn fetch_records(&self) -> ConnectorResult<Vec<SourceRecord>> {
        Ok(self.records.clone())
    }
}

type InstanceState = BTreeMap<IdentityKey, TargetIdentity>;

/// Target system held in memory, one identity table per instance.
#[derive(Debug, Default)]
pub struct InMemoryTarget {
    instances: Mutex<BTreeMap<InstanceId, InstanceState>>,
    applied: Mutex<Vec<ReconciliationOp>>,
    failing_keys: HashSet<IdentityKey>,
}

impl InMemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an instance with identities. The instance exists even when empty.
    #[must_use]
    pub fn with_instance(mut self, instance: InstanceId, identities: Vec<TargetIdentity>) -> Self {
        let mut table = InstanceState::new();
        for mut identity in identities {
            identity.instance = instance.clone();
            table.insert(identity.key(), identity);
        }
        self.instances.get_mut().insert(instance, table);
        self
    }

    /// Make every op addressed to `key` fail with a permanent error.
    #[must_use]
    pub fn failing_on(mut self, key: IdentityKey) -> Self {
        self.failing_keys.insert(key);
        self
    }

    /// Ops successfully applied so far, in application order.
    pub async fn applied(&self) -> Vec<ReconciliationOp> {
        self.applied.lock().await.clone()
    }

    /// Current identity in an instance, if present.
    pub async fn identity(&self, instance: &InstanceId, key: &IdentityKey) -> Option<TargetIdentity> {
        self.instances
            .lock()
            .await
            .get(instance)
            .and_then(|table| table.get(key))
            .cloned()
    }
}

fn set_attributes(identity: &mut TargetIdentity, attributes: &AttributeMap) {
    for (name, value) in attributes {
        let value = Some(value.clone());
        match name.as_str() {
            ATTR_EMAIL => identity.email = value,
            ATTR_FIRSTNAME => identity.firstname = value,
            ATTR_LASTNAME => identity.lastname = value,
            ATTR_COUNTRY => identity.country = value,
            other => {
                identity.extended.insert(other.to_string(), value.unwrap_or_default());
            }
        }
    }
}

#[async_trait]
impl TargetClient for InMemoryTarget {
    fn display_name(&self) -> &str {
        "memory"
    }

    async fn snapshot(&self, instance: &InstanceId) -> ConnectorResult<Vec<TargetIdentity>> {
        let instances = self.instances.lock().await;
        let table = instances
            .get(instance)
            .ok_or_else(|| ConnectorError::unknown_instance(instance))?;
        Ok(table.values().cloned().collect())
    }

    async fn apply(&self, op: &ReconciliationOp) -> ConnectorResult<()> {
        if self.failing_keys.contains(&op.key) {
            return Err(ConnectorError::operation_failed(format!(
                "{} rejected for {}",
                op.kind, op.key
            )));
        }

        let mut instances = self.instances.lock().await;
        let table = instances
            .get_mut(&op.instance)
            .ok_or_else(|| ConnectorError::unknown_instance(&op.instance))?;
        let not_found = || ConnectorError::ObjectNotFound {
            identifier: op.key.to_string(),
        };

        match &op.kind {
            OpKind::Create {
                identity_type,
                attributes,
            } => {
                if table.contains_key(&op.key) {
                    return Err(ConnectorError::ObjectAlreadyExists {
                        identifier: op.key.to_string(),
                    });
                }
                let mut identity =
                    TargetIdentity::new(op.instance.clone(), *identity_type, op.key.username());
                if !op.key.domain().is_empty() {
                    identity.domain = Some(op.key.domain().to_string());
                }
                set_attributes(&mut identity, attributes);
                table.insert(op.key.clone(), identity);
            }
            OpKind::UpdateAttributes { diff } => {
                let identity = table.get_mut(&op.key).ok_or_else(not_found)?;
                set_attributes(identity, diff);
            }
            OpKind::AddToGroups { groups } => {
                let identity = table.get_mut(&op.key).ok_or_else(not_found)?;
                identity.groups.extend(groups.iter().cloned());
            }
            OpKind::RemoveFromGroups { groups } => {
                let identity = table.get_mut(&op.key).ok_or_else(not_found)?;
                identity.groups.retain(|g| !groups.contains(g));
            }
            OpKind::RemoveUser => {
                table.remove(&op.key).ok_or_else(not_found)?;
            }
            OpKind::Disentitle => {
                let identity = table.get_mut(&op.key).ok_or_else(not_found)?;
                identity.groups.clear();
            }
            OpKind::NoOp { .. } => {}
        }
        drop(instances);

        debug!(op = %op, "Applied op in memory");
        self.applied.lock().await.push(op.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use usersync_core::IdentityType;

    fn alice() -> TargetIdentity {
        TargetIdentity::new(InstanceId::Primary, IdentityType::FederatedId, "alice")
            .with_domain("example.com")
            .with_group("Engineering")
    }

    #[tokio::test]
    async fn test_snapshot_unknown_instance() {
        let target = InMemoryTarget::new().with_instance(InstanceId::Primary, vec![]);
        assert!(target.snapshot(&InstanceId::Primary).await.unwrap().is_empty());
        let err = target
            .snapshot(&InstanceId::named("secondary"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_INSTANCE");
    }

    #[tokio::test]
    async fn test_create_then_add_groups() {
        let target = InMemoryTarget::new().with_instance(InstanceId::Primary, vec![]);
        let key = IdentityKey::new(IdentityType::FederatedId, "bob", Some("example.com"));

        let create = ReconciliationOp::new(
            InstanceId::Primary,
            key.clone(),
            OpKind::Create {
                identity_type: IdentityType::FederatedId,
                attributes: AttributeMap::from([("email".to_string(), "bob@example.com".to_string())]),
            },
        );
        let add = ReconciliationOp::new(
            InstanceId::Primary,
            key.clone(),
            OpKind::AddToGroups {
                groups: BTreeSet::from(["Engineering".to_string()]),
            },
        );
        target.apply(&create).await.unwrap();
        target.apply(&add).await.unwrap();

        let stored = target.identity(&InstanceId::Primary, &key).await.unwrap();
        assert_eq!(stored.email.as_deref(), Some("bob@example.com"));
        assert!(stored.groups.contains("Engineering"));
        assert_eq!(target.applied().await.len(), 2);

        let err = target.apply(&create).await.unwrap_err();
        assert_eq!(err.error_code(), "OBJECT_EXISTS");
    }

    #[tokio::test]
    async fn test_remove_and_disentitle() {
        let target = InMemoryTarget::new().with_instance(InstanceId::Primary, vec![alice()]);
        let key = alice().key();

        let disentitle = ReconciliationOp::new(InstanceId::Primary, key.clone(), OpKind::Disentitle);
        target.apply(&disentitle).await.unwrap();
        let stored = target.identity(&InstanceId::Primary, &key).await.unwrap();
        assert!(stored.groups.is_empty());

        let remove = ReconciliationOp::new(InstanceId::Primary, key.clone(), OpKind::RemoveUser);
        target.apply(&remove).await.unwrap();
        assert!(target.identity(&InstanceId::Primary, &key).await.is_none());
        assert!(target.apply(&remove).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_key() {
        let key = alice().key();
        let target = InMemoryTarget::new()
            .with_instance(InstanceId::Primary, vec![alice()])
            .failing_on(key.clone());
        let op = ReconciliationOp::new(InstanceId::Primary, key, OpKind::RemoveUser);
        let err = target.apply(&op).await.unwrap_err();
        assert!(err.is_permanent());
        assert!(target.applied().await.is_empty());
    }
}
