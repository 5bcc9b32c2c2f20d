//! Plan statistics.
//!
//! Counts gathered while a plan is built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use usersync_connector::{AttributeMap, OpKind};
use usersync_core::InstanceId;

/// Count of mismatches for an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMismatchCount {
    /// Attribute name.
    pub attribute: String,
    /// Number of mismatches.
    pub count: u32,
}

/// Statistics for one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStatistics {
    /// Directory identities received.
    #[serde(default)]
    pub sources_total: u32,
    /// Directory rows quarantined before planning.
    #[serde(default)]
    pub sources_rejected: u32,
    /// Directory identities ignored by exclusion rules.
    #[serde(default)]
    pub sources_excluded: u32,
    /// Directory identities superseded by a later record with the same key.
    #[serde(default)]
    pub sources_duplicate: u32,
    /// Target identities per instance.
    #[serde(default)]
    pub targets_by_instance: BTreeMap<String, u32>,
    /// Target identities superseded by a later one with the same key.
    #[serde(default)]
    pub targets_duplicate: u32,
    /// Directory identities matched to a target identity, counted per instance.
    #[serde(default)]
    pub matched: u32,
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub updated: u32,
    /// Planned ops by kind.
    #[serde(default)]
    pub ops_by_kind: BTreeMap<String, u32>,
    #[serde(default)]
    pub strays_found: u32,
    /// Strays kept from disposal by protection rules.
    #[serde(default)]
    pub strays_protected: u32,
    /// Strays given a disposal op other than a no-op.
    #[serde(default)]
    pub strays_disposed: u32,
    /// Attribute mismatches between matched identities.
    #[serde(default)]
    pub mismatched_attributes: BTreeMap<String, u32>,
}

impl PlanStatistics {
    /// Create new empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the size of an instance snapshot.
    pub fn record_targets(&mut self, instance: &InstanceId, count: usize) {
        self.targets_by_instance
            .insert(instance.to_string(), u32::try_from(count).unwrap_or(u32::MAX));
    }

    /// Record a planned op.
    pub fn record_op(&mut self, kind: &OpKind) {
        *self.ops_by_kind.entry(kind.name().to_string()).or_insert(0) += 1;
    }

    /// Record the attributes of a non-empty diff.
    pub fn record_mismatches(&mut self, diff: &AttributeMap) {
        for attribute in diff.keys() {
            *self.mismatched_attributes.entry(attribute.clone()).or_insert(0) += 1;
        }
    }

    /// Count of planned ops of one kind (by [`OpKind::name`]).
    #[must_use]
    pub fn op_count(&self, kind: &str) -> u32 {
        self.ops_by_kind.get(kind).copied().unwrap_or(0)
    }

    /// Total target identities over all instances.
    #[must_use]
    pub fn targets_total(&self) -> u32 {
        self.targets_by_instance.values().sum()
    }

    /// The `limit` most frequently mismatched attributes, most frequent first.
    #[must_use]
    pub fn top_mismatched_attributes(&self, limit: usize) -> Vec<AttributeMismatchCount> {
        let mut counts: Vec<AttributeMismatchCount> = self
            .mismatched_attributes
            .iter()
            .map(|(attribute, count)| AttributeMismatchCount {
                attribute: attribute.clone(),
                count: *count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.attribute.cmp(&b.attribute)));
        counts.truncate(limit);
        counts
    }
}
