//! Planned reconciliation operations.
//!
//! A [`ReconciliationOp`] is always scoped to one `(instance, key)` pair.
//! Ops are produced by the rule engine, never mutated, and consumed once by a
//! [`TargetClient`](crate::traits::TargetClient).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use usersync_core::{IdentityKey, IdentityType, InstanceId, InstanceScoped};

/// Attribute name to value.
pub type AttributeMap = BTreeMap<String, String>;

/// Why nothing is done for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    /// Matched identity already matches the directory.
    InSync,
    /// Stray kept by the `preserve` disposal action.
    StrayPreserved,
    /// Stray whose managed groups are already empty, or group processing is off.
    NothingToStrip,
}

impl NoOpReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NoOpReason::InSync => "in_sync",
            NoOpReason::StrayPreserved => "stray_preserved",
            NoOpReason::NothingToStrip => "nothing_to_strip",
        }
    }
}

/// What to do to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpKind {
    /// Create the identity with its initial attributes.
    Create {
        identity_type: IdentityType,
        attributes: AttributeMap,
    },
    /// Set the listed attributes to the given values.
    UpdateAttributes { diff: AttributeMap },
    AddToGroups { groups: BTreeSet<String> },
    RemoveFromGroups { groups: BTreeSet<String> },
    /// Delete the identity from the target instance.
    RemoveUser,
    /// Remove all product access but keep the account.
    Disentitle,
    NoOp { reason: NoOpReason },
}

impl OpKind {
    /// Short stable name, used for statistics and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Create { .. } => "create",
            OpKind::UpdateAttributes { .. } => "update_attributes",
            OpKind::AddToGroups { .. } => "add_to_groups",
            OpKind::RemoveFromGroups { .. } => "remove_from_groups",
            OpKind::RemoveUser => "remove_user",
            OpKind::Disentitle => "disentitle",
            OpKind::NoOp { .. } => "no_op",
        }
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One planned action against one identity in one target instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOp {
    pub instance: InstanceId,
    pub key: IdentityKey,
    #[serde(flatten)]
    pub kind: OpKind,
}

impl ReconciliationOp {
    pub fn new(instance: InstanceId, key: IdentityKey, kind: OpKind) -> Self {
        Self {
            instance,
            key,
            kind,
        }
    }

    /// Whether this op removes access from an existing identity.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(
            self.kind,
            OpKind::RemoveUser | OpKind::Disentitle | OpKind::RemoveFromGroups { .. }
        )
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self.kind, OpKind::NoOp { .. })
    }
}

impl InstanceScoped for ReconciliationOp {
    fn instance(&self) -> &InstanceId {
        &self.instance
    }

    fn identity_key(&self) -> &IdentityKey {
        &self.key
    }
}

impl Display for ReconciliationOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} in {}", self.kind, self.key, self.instance)
    }
}
