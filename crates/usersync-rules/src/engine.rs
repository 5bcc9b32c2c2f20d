//! Reconciliation rule engine.
//!
//! Planning is a pure, single-threaded computation over fully materialized
//! snapshots: one directory identity set and one identity set per target
//! instance. The result is a [`ReconciliationPlan`]; nothing is applied here.
//!
//! Per pass:
//!
//! 1. Every target key of every instance starts out as a stray candidate.
//! 2. Each directory identity that survives the exclusion rules is matched
//!    by key in every instance. A match removes the key from the stray set
//!    and yields attribute and group ops; a relevant instance without a
//!    match yields a `Create` followed by group adds.
//! 3. The remaining candidates are the strays of the pass. Unprotected
//!    strays are counted once, globally, against `max_adobe_only_users`
//!    before any disposal op is built; above it, disposal is blocked for all
//!    instances while the rest of the plan stands.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use usersync_connector::identity::{IdentityAttributes, CORE_ATTRIBUTES};
use usersync_connector::{
    AttributeMap, NoOpReason, OpKind, RecordError, RecordNormalizer, ReconciliationOp,
    SourceBatch, SourceIdentity, TargetIdentity,
};
use usersync_core::{IdentityKey, InstanceId};

use crate::config::{RuleConfig, StrayAction};
use crate::diff::diff_attributes;
use crate::error::{RuleError, RuleResult};
use crate::mapping::{group_specifiers, GroupMappingTable, ResolvedGroups};
use crate::policy::{DisposalPolicy, ExclusionPolicy};
use crate::statistics::PlanStatistics;
use crate::stray::{StrayEntry, StrayKeyMap};

/// Full identity listing per target instance.
pub type TargetSnapshot = BTreeMap<InstanceId, Vec<TargetIdentity>>;

/// What happened to stray disposal in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DisposalOutcome {
    /// `exclude_strays` is set; strays are reported but never disposed.
    Disabled { strays: usize },
    /// Disposal ops were planned for the eligible strays.
    Planned {
        action: StrayAction,
        eligible: usize,
        protected: usize,
    },
    /// Eligible strays exceeded the safety threshold; no disposal op was planned.
    Blocked { stray_count: usize, threshold: usize },
}

impl DisposalOutcome {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, DisposalOutcome::Blocked { .. })
    }
}

/// Result of one planning pass.
#[derive(Debug, Clone)]
pub struct ReconciliationPlan {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Ops in emission order. Ops for one identity are contiguous and ordered.
    pub ops: Vec<ReconciliationOp>,
    /// Final stray sets, protected strays included.
    pub strays: StrayKeyMap,
    pub disposal: DisposalOutcome,
    pub statistics: PlanStatistics,
    /// Resolved target groups of every planned directory identity, as group
    /// specifiers.
    pub member_groups: BTreeMap<IdentityKey, BTreeSet<String>>,
    /// Directory rows quarantined before planning.
    pub record_errors: Vec<RecordError>,
}

impl ReconciliationPlan {
    /// The blocked-disposal condition, when the safety threshold tripped.
    #[must_use]
    pub fn disposal_error(&self) -> Option<RuleError> {
        match self.disposal {
            DisposalOutcome::Blocked {
                stray_count,
                threshold,
            } => Some(RuleError::DisposalBlocked {
                stray_count,
                threshold,
            }),
            _ => None,
        }
    }

    /// Ops addressed to one identity, in emission order.
    pub fn ops_for<'a>(
        &'a self,
        instance: &'a InstanceId,
        key: &'a IdentityKey,
    ) -> impl Iterator<Item = &'a ReconciliationOp> + 'a {
        self.ops
            .iter()
            .filter(move |op| &op.instance == instance && &op.key == key)
    }

    /// Ops that need the target system, i.e. everything but no-ops.
    pub fn actionable_ops(&self) -> impl Iterator<Item = &ReconciliationOp> {
        self.ops.iter().filter(|op| !op.is_noop())
    }

    /// Whether the plan contains any removal, disentitlement or group strip.
    #[must_use]
    pub fn has_destructive_ops(&self) -> bool {
        self.ops.iter().any(ReconciliationOp::is_destructive)
    }
}

/// Plans reconciliation passes under one configuration.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: RuleConfig,
    mapping: GroupMappingTable,
    exclusions: ExclusionPolicy,
    disposal: DisposalPolicy,
    group_filter: Option<Regex>,
}

impl RuleEngine {
    /// Validate the configuration and compile its rules.
    ///
    /// # Errors
    ///
    /// Any configuration error; no plan can be produced from an invalid
    /// configuration.
    pub fn new(config: RuleConfig) -> RuleResult<Self> {
        config.validate()?;
        let mapping = GroupMappingTable::from_config(&config.groups, &config.additional_groups)?;
        let exclusions = ExclusionPolicy::from_config(&config)?;
        let group_filter = config
            .directory_group_filter
            .as_deref()
            .map(|p| Regex::new(p).map_err(|e| RuleError::regex("directory_group_filter", e)))
            .transpose()?;
        let disposal = DisposalPolicy::from_config(&config);

        Ok(Self {
            config,
            mapping,
            exclusions,
            disposal,
            group_filter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    #[must_use]
    pub fn mapping(&self) -> &GroupMappingTable {
        &self.mapping
    }

    /// Normalizer applying this configuration's record defaults.
    #[must_use]
    pub fn normalizer(&self) -> RecordNormalizer {
        RecordNormalizer::new(
            self.config.new_account_type,
            self.config.default_country_code.clone(),
        )
    }

    /// Desired target groups of a directory identity.
    ///
    /// Only directory groups passing `directory_group_filter` take part.
    #[must_use]
    pub fn resolve_groups(&self, identity: &SourceIdentity) -> ResolvedGroups {
        let groups = identity.groups.iter().filter(|g| {
            self.group_filter
                .as_ref()
                .map_or(true, |filter| filter.is_match(g))
        });
        self.mapping.resolve(groups)
    }

    /// Fill each identity's `member_groups` from its directory groups.
    pub fn assign_member_groups(&self, identities: &mut [SourceIdentity]) {
        for identity in identities {
            identity.member_groups = group_specifiers(&self.resolve_groups(identity));
        }
    }

    /// Plan a pass from a normalized batch, carrying its quarantined rows.
    pub fn plan_batch(&self, batch: SourceBatch, targets: &TargetSnapshot) -> ReconciliationPlan {
        let mut plan = self.plan(&batch.identities, targets);
        plan.statistics.sources_rejected = count(batch.rejected.len());
        plan.record_errors = batch.rejected;
        plan
    }

    /// Plan a pass.
    #[instrument(skip_all, fields(sources = sources.len(), instances = targets.len()))]
    pub fn plan(&self, sources: &[SourceIdentity], targets: &TargetSnapshot) -> ReconciliationPlan {
        let mut stats = PlanStatistics::new();
        stats.sources_total = count(sources.len());

        let (index, strays) = index_targets(targets, &mut stats);
        let unique = dedupe_sources(sources, &mut stats);

        let mut candidates = Vec::with_capacity(unique.len());
        let mut member_groups = BTreeMap::new();
        let mut pass_groups: BTreeMap<InstanceId, BTreeSet<String>> = BTreeMap::new();
        for (identity, key) in unique {
            if let Some(reason) = self.exclusions.excludes_source(identity) {
                debug!(key = %key, reason = %reason, "Excluding directory identity");
                stats.sources_excluded += 1;
                continue;
            }
            let resolved = self.resolve_groups(identity);
            for (instance, groups) in &resolved {
                pass_groups
                    .entry(instance.clone())
                    .or_default()
                    .extend(groups.iter().cloned());
            }
            member_groups.insert(key.clone(), group_specifiers(&resolved));
            candidates.push((identity, key, resolved));
        }

        // Managed groups: static mapping plus names produced during this pass.
        let managed = index
            .keys()
            .map(|instance| {
                let mut groups = self.mapping.managed_groups(instance);
                if let Some(produced) = pass_groups.get(instance) {
                    groups.extend(produced.iter().cloned());
                }
                (instance.clone(), groups)
            })
            .collect();

        let mut pass = Pass {
            engine: self,
            index,
            managed,
            strays,
            ops: Vec::new(),
            stats,
            unknown_instances: BTreeSet::new(),
        };

        for (identity, key, resolved) in &candidates {
            pass.plan_identity(identity, key, resolved);
        }
        let disposal = pass.dispose_strays();
        let mut plan = pass.finish(disposal);
        plan.member_groups = member_groups;
        plan
    }
}

/// Mutable state of one planning pass.
struct Pass<'a> {
    engine: &'a RuleEngine,
    index: BTreeMap<InstanceId, HashMap<IdentityKey, &'a TargetIdentity>>,
    managed: BTreeMap<InstanceId, BTreeSet<String>>,
    strays: StrayKeyMap,
    ops: Vec<ReconciliationOp>,
    stats: PlanStatistics,
    unknown_instances: BTreeSet<InstanceId>,
}

impl<'a> Pass<'a> {
    fn push(&mut self, instance: &InstanceId, key: &IdentityKey, kind: OpKind) {
        self.ops
            .push(ReconciliationOp::new(instance.clone(), key.clone(), kind));
    }

    fn plan_identity(&mut self, identity: &SourceIdentity, key: &IdentityKey, resolved: &ResolvedGroups) {
        for instance in resolved.keys() {
            if !self.index.contains_key(instance) {
                self.unknown_instances.insert(instance.clone());
            }
        }

        let lookups: Vec<(InstanceId, Option<&'a TargetIdentity>)> = self
            .index
            .iter()
            .map(|(instance, table)| (instance.clone(), table.get(key).copied()))
            .collect();

        let no_groups = BTreeSet::new();
        for (instance, target) in lookups {
            let desired = resolved.get(&instance).unwrap_or(&no_groups);
            match target {
                Some(target) => self.plan_matched(identity, key, &instance, target, desired),
                None if instance.is_primary() || resolved.contains_key(&instance) => {
                    self.plan_create(identity, key, &instance, desired);
                }
                None => {}
            }
        }
    }

    fn plan_matched(
        &mut self,
        identity: &SourceIdentity,
        key: &IdentityKey,
        instance: &InstanceId,
        target: &TargetIdentity,
        desired: &BTreeSet<String>,
    ) {
        let engine = self.engine;
        let config = &engine.config;
        self.strays.mark_matched(instance, key);
        self.stats.matched += 1;

        let mut emitted = false;
        let diff = diff_attributes(identity, target, &config.extended_attributes);
        if !diff.is_empty() {
            self.stats.record_mismatches(&diff);
            if config.update_user_info {
                self.stats.updated += 1;
                self.push(instance, key, OpKind::UpdateAttributes { diff });
                emitted = true;
            }
        }
        if config.process_groups {
            emitted |= self.push_group_ops(instance, key, desired, &target.groups);
        }
        if !emitted {
            self.push(
                instance,
                key,
                OpKind::NoOp {
                    reason: NoOpReason::InSync,
                },
            );
        }
        debug!(instance = %instance, key = %key, "Matched directory identity");
    }

    fn plan_create(
        &mut self,
        identity: &SourceIdentity,
        key: &IdentityKey,
        instance: &InstanceId,
        desired: &BTreeSet<String>,
    ) {
        let engine = self.engine;
        let config = &engine.config;
        self.stats.created += 1;
        self.push(
            instance,
            key,
            OpKind::Create {
                identity_type: key.identity_type(),
                attributes: creation_attributes(identity, &config.extended_attributes),
            },
        );
        if config.process_groups {
            self.push_group_ops(instance, key, desired, &BTreeSet::new());
        }
        debug!(instance = %instance, key = %key, "Planning creation");
    }

    /// Emit `AddToGroups` then `RemoveFromGroups`. Only managed groups are removed.
    fn push_group_ops(
        &mut self,
        instance: &InstanceId,
        key: &IdentityKey,
        desired: &BTreeSet<String>,
        current: &BTreeSet<String>,
    ) -> bool {
        let add: BTreeSet<String> = desired.difference(current).cloned().collect();
        let remove: BTreeSet<String> = match self.managed.get(instance) {
            Some(managed) => current
                .iter()
                .filter(|g| managed.contains(*g) && !desired.contains(*g))
                .cloned()
                .collect(),
            None => BTreeSet::new(),
        };

        let emitted = !add.is_empty() || !remove.is_empty();
        if !add.is_empty() {
            self.push(instance, key, OpKind::AddToGroups { groups: add });
        }
        if !remove.is_empty() {
            self.push(instance, key, OpKind::RemoveFromGroups { groups: remove });
        }
        emitted
    }

    fn dispose_strays(&mut self) -> DisposalOutcome {
        let engine = self.engine;
        let policy = &engine.disposal;
        let found = self.strays.len();
        self.stats.strays_found = count(found);

        if policy.exclude_strays {
            info!(strays = found, "Stray disposal disabled by exclude_strays");
            return DisposalOutcome::Disabled { strays: found };
        }

        let mut eligible: Vec<(StrayEntry, &'a TargetIdentity)> = Vec::new();
        let mut protected = 0;
        for entry in self.strays.entries() {
            let Some(target) = self
                .index
                .get(&entry.instance)
                .and_then(|table| table.get(&entry.key))
                .copied()
            else {
                continue;
            };
            if policy.protect_with_exclusions {
                if let Some(reason) = engine
                    .exclusions
                    .protects_stray(target, policy.match_attributes_on_strays)
                {
                    debug!(instance = %entry.instance, key = %entry.key, reason = %reason, "Stray protected");
                    protected += 1;
                    continue;
                }
            }
            eligible.push((entry, target));
        }
        self.stats.strays_protected = count(protected);

        // Evaluated once over all instances, before any disposal op exists.
        if policy.exceeds_threshold(eligible.len()) {
            error!(
                stray_count = eligible.len(),
                threshold = policy.threshold,
                action = %policy.action,
                destructive = policy.action.is_destructive(),
                "Stray count exceeds max_adobe_only_users; stray disposal blocked for this pass"
            );
            return DisposalOutcome::Blocked {
                stray_count: eligible.len(),
                threshold: policy.threshold,
            };
        }

        let total = eligible.len();
        for (entry, target) in eligible {
            let kind = self.disposal_kind(&entry.instance, target);
            if !matches!(kind, OpKind::NoOp { .. }) {
                self.stats.strays_disposed += 1;
            }
            self.push(&entry.instance, &entry.key, kind);
        }

        DisposalOutcome::Planned {
            action: policy.action,
            eligible: total,
            protected,
        }
    }

    fn disposal_kind(&self, instance: &InstanceId, target: &TargetIdentity) -> OpKind {
        let config = &self.engine.config;
        match self.engine.disposal.action {
            StrayAction::Preserve => OpKind::NoOp {
                reason: NoOpReason::StrayPreserved,
            },
            StrayAction::RemoveFromMappedGroups => {
                let groups: BTreeSet<String> = if config.process_groups {
                    self.managed
                        .get(instance)
                        .map(|managed| target.groups.intersection(managed).cloned().collect())
                        .unwrap_or_default()
                } else {
                    BTreeSet::new()
                };
                if groups.is_empty() {
                    OpKind::NoOp {
                        reason: NoOpReason::NothingToStrip,
                    }
                } else {
                    OpKind::RemoveFromGroups { groups }
                }
            }
            StrayAction::Disentitle => OpKind::Disentitle,
            StrayAction::RemoveUser => OpKind::RemoveUser,
        }
    }

    fn finish(mut self, disposal: DisposalOutcome) -> ReconciliationPlan {
        for instance in &self.unknown_instances {
            warn!(instance = %instance, "Group mapping references an instance without a snapshot; skipped");
        }
        for op in &self.ops {
            self.stats.record_op(&op.kind);
        }

        info!(
            ops = self.ops.len(),
            matched = self.stats.matched,
            created = self.stats.created,
            updated = self.stats.updated,
            excluded = self.stats.sources_excluded,
            strays = self.stats.strays_found,
            disposal_blocked = disposal.is_blocked(),
            "Reconciliation plan complete"
        );

        ReconciliationPlan {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            ops: self.ops,
            strays: self.strays,
            disposal,
            statistics: self.stats,
            member_groups: BTreeMap::new(),
            record_errors: Vec::new(),
        }
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Index target snapshots by key and seed the stray candidates.
///
/// A duplicate key within one instance keeps the last identity.
fn index_targets<'a>(
    targets: &'a TargetSnapshot,
    stats: &mut PlanStatistics,
) -> (
    BTreeMap<InstanceId, HashMap<IdentityKey, &'a TargetIdentity>>,
    StrayKeyMap,
) {
    let mut index = BTreeMap::new();
    let mut strays = StrayKeyMap::new();

    for (instance, identities) in targets {
        strays.ensure_instance(instance);
        let mut table: HashMap<IdentityKey, &TargetIdentity> = HashMap::with_capacity(identities.len());
        for identity in identities {
            let key = identity.key();
            if table.insert(key.clone(), identity).is_some() {
                warn!(instance = %instance, key = %key, "Duplicate target identity key; keeping the last one");
                stats.targets_duplicate += 1;
            }
            strays.insert(instance, key);
        }
        stats.record_targets(instance, table.len());
        index.insert(instance.clone(), table);
    }

    (index, strays)
}

/// Collapse directory identities sharing a key.
///
/// The last record wins and keeps the position of the first occurrence.
fn dedupe_sources<'a>(
    sources: &'a [SourceIdentity],
    stats: &mut PlanStatistics,
) -> Vec<(&'a SourceIdentity, IdentityKey)> {
    let mut positions: HashMap<IdentityKey, usize> = HashMap::with_capacity(sources.len());
    let mut unique: Vec<(&SourceIdentity, IdentityKey)> = Vec::with_capacity(sources.len());

    for identity in sources {
        let key = identity.key();
        if let Some(&position) = positions.get(&key) {
            warn!(key = %key, "Duplicate directory identity key; the last record wins");
            stats.sources_duplicate += 1;
            unique[position].0 = identity;
        } else {
            positions.insert(key.clone(), unique.len());
            unique.push((identity, key));
        }
    }

    unique
}

/// Initial attributes of a created identity: every present core attribute
/// plus the configured extended ones.
fn creation_attributes(identity: &SourceIdentity, extended: &[String]) -> AttributeMap {
    CORE_ATTRIBUTES
        .iter()
        .copied()
        .chain(extended.iter().map(String::as_str))
        .filter_map(|name| {
            identity
                .attribute(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupMappingEntry;
    use usersync_core::IdentityType;

    fn engine(config: RuleConfig) -> RuleEngine {
        RuleEngine::new(config).unwrap()
    }

    fn eng_mapping() -> Vec<GroupMappingEntry> {
        vec![GroupMappingEntry {
            directory_group: "eng".to_string(),
            adobe_groups: vec!["Engineering".to_string()],
        }]
    }

    fn source(user: &str) -> SourceIdentity {
        SourceIdentity::new(IdentityType::FederatedId, user)
            .with_domain("example.com")
            .with_email(format!("{user}@example.com"))
    }

    fn target(user: &str) -> TargetIdentity {
        TargetIdentity::new(InstanceId::Primary, IdentityType::FederatedId, user)
            .with_domain("example.com")
            .with_email(format!("{user}@example.com"))
    }

    fn primary(identities: Vec<TargetIdentity>) -> TargetSnapshot {
        TargetSnapshot::from([(InstanceId::Primary, identities)])
    }

    #[test]
    fn test_in_sync_identity_gets_noop() {
        let plan = engine(RuleConfig::default()).plan(&[source("alice")], &primary(vec![target("alice")]));
        assert_eq!(plan.ops.len(), 1);
        assert_eq!(
            plan.ops[0].kind,
            OpKind::NoOp {
                reason: NoOpReason::InSync
            }
        );
        assert!(plan.strays.is_empty());
        assert_eq!(plan.statistics.matched, 1);
    }

    #[test]
    fn test_update_only_when_enabled() {
        let sources = [source("alice").with_name("Alice", "Smith")];
        let targets = primary(vec![target("alice").with_name("Alice", "Jones")]);

        let quiet = engine(RuleConfig::default()).plan(&sources, &targets);
        assert!(quiet.ops.iter().all(ReconciliationOp::is_noop));
        assert_eq!(quiet.statistics.mismatched_attributes["lastname"], 1);

        let syncing = engine(RuleConfig {
            update_user_info: true,
            ..RuleConfig::default()
        })
        .plan(&sources, &targets);
        assert_eq!(syncing.ops.len(), 1);
        match &syncing.ops[0].kind {
            OpKind::UpdateAttributes { diff } => {
                assert_eq!(diff.get("lastname").map(String::as_str), Some("Smith"));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_create_carries_attributes_and_type() {
        let config = RuleConfig {
            groups: eng_mapping(),
            ..RuleConfig::default()
        };
        let sources = [source("alice").with_name("Alice", "Smith").with_group("eng")];
        let plan = engine(config).plan(&sources, &primary(vec![]));

        assert_eq!(plan.ops.len(), 2);
        match &plan.ops[0].kind {
            OpKind::Create {
                identity_type,
                attributes,
            } => {
                assert_eq!(*identity_type, IdentityType::FederatedId);
                assert_eq!(attributes.get("firstname").map(String::as_str), Some("Alice"));
                assert_eq!(
                    attributes.get("email").map(String::as_str),
                    Some("alice@example.com")
                );
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(matches!(plan.ops[1].kind, OpKind::AddToGroups { .. }));
    }

    #[test]
    fn test_process_groups_off_suppresses_group_ops() {
        let config = RuleConfig {
            groups: eng_mapping(),
            process_groups: false,
            ..RuleConfig::default()
        };
        let plan = engine(config).plan(&[source("alice").with_group("eng")], &primary(vec![]));
        assert_eq!(plan.ops.len(), 1);
        assert!(matches!(plan.ops[0].kind, OpKind::Create { .. }));
    }

    #[test]
    fn test_plan_records_member_groups() {
        let config = RuleConfig {
            groups: vec![GroupMappingEntry {
                directory_group: "eng".to_string(),
                adobe_groups: vec!["Engineering".to_string(), "secondary::Engineering".to_string()],
            }],
            exclude_users: vec!["bob".to_string()],
            ..RuleConfig::default()
        };
        let sources = [
            source("alice").with_group("eng").with_group("unmapped"),
            source("bob").with_group("eng"),
            source("carol"),
        ];
        let plan = engine(config).plan(&sources, &primary(vec![]));

        let alice = IdentityKey::new(IdentityType::FederatedId, "alice", Some("example.com"));
        let carol = IdentityKey::new(IdentityType::FederatedId, "carol", Some("example.com"));
        assert_eq!(
            plan.member_groups[&alice].iter().map(String::as_str).collect::<Vec<_>>(),
            ["Engineering", "secondary::Engineering"]
        );
        assert!(plan.member_groups[&carol].is_empty());
        // Excluded identities are not planned.
        assert_eq!(plan.member_groups.len(), 2);
    }

    #[test]
    fn test_assign_member_groups() {
        let engine = engine(RuleConfig {
            groups: eng_mapping(),
            ..RuleConfig::default()
        });
        let mut identities = vec![source("alice").with_group("eng"), source("bob")];
        engine.assign_member_groups(&mut identities);

        assert_eq!(
            identities[0].member_groups,
            BTreeSet::from(["Engineering".to_string()])
        );
        assert!(identities[1].member_groups.is_empty());
    }

    #[test]
    fn test_directory_group_filter() {
        let config = RuleConfig {
            groups: eng_mapping(),
            directory_group_filter: Some("^ops$".to_string()),
            ..RuleConfig::default()
        };
        let engine = engine(config);
        assert!(engine
            .resolve_groups(&source("alice").with_group("eng"))
            .is_empty());
    }

    #[test]
    fn test_duplicate_source_keys_last_wins_first_position() {
        let sources = [
            source("alice").with_name("First", "Record"),
            source("bob"),
            source("ALICE").with_name("Second", "Record"),
        ];
        let config = RuleConfig {
            update_user_info: true,
            ..RuleConfig::default()
        };
        let targets = primary(vec![
            target("alice").with_name("Old", "Record"),
            target("bob"),
        ]);
        let plan = engine(config).plan(&sources, &targets);

        assert_eq!(plan.statistics.sources_duplicate, 1);
        assert_eq!(plan.ops[0].key.username(), "alice");
        match &plan.ops[0].kind {
            OpKind::UpdateAttributes { diff } => {
                assert_eq!(diff.get("firstname").map(String::as_str), Some("Second"));
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert_eq!(plan.ops[1].key.username(), "bob");
    }

    #[test]
    fn test_duplicate_target_keys_counted() {
        let plan = engine(RuleConfig::default()).plan(
            &[],
            &primary(vec![target("alice"), target("Alice")]),
        );
        assert_eq!(plan.statistics.targets_duplicate, 1);
        assert_eq!(plan.strays.len(), 1);
    }

    #[test]
    fn test_invalid_configuration_fails_before_planning() {
        let err = RuleEngine::new(RuleConfig {
            directory_group_filter: Some("(".to_string()),
            ..RuleConfig::default()
        })
        .unwrap_err();
        assert!(err.is_fatal_to_pass());
    }

    #[test]
    fn test_plan_batch_carries_record_errors() {
        let batch = SourceBatch {
            identities: vec![source("alice")],
            rejected: vec![RecordError::new("username", "missing").at_line(Some(3))],
        };
        let plan = engine(RuleConfig::default()).plan_batch(batch, &primary(vec![]));
        assert_eq!(plan.statistics.sources_rejected, 1);
        assert_eq!(plan.record_errors.len(), 1);
        assert!(plan.disposal_error().is_none());
    }
}
