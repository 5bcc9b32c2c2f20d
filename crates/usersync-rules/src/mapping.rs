//! Group mapping table.
//!
//! Maps directory group names to target groups, possibly in secondary target
//! instances. A directory group with no entry contributes nothing. Dynamic
//! rules derive target group names from directory group names by pattern.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use usersync_core::InstanceId;

use crate::config::{DynamicGroupRule, GroupMappingEntry};
use crate::error::{RuleError, RuleResult};

/// Separator between instance name and group name in a group specifier.
pub const INSTANCE_SEPARATOR: &str = "::";

/// A target group in a specific instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetGroup {
    pub instance: InstanceId,
    pub name: String,
}

impl TargetGroup {
    /// Parse `Group` (primary instance) or `instance::Group`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Mapping`] when the group name is empty.
    pub fn parse(spec: &str) -> RuleResult<Self> {
        let (instance, name) = match spec.split_once(INSTANCE_SEPARATOR) {
            Some((instance, name)) => (InstanceId::named(instance), name.trim()),
            None => (InstanceId::Primary, spec.trim()),
        };
        if name.is_empty() {
            return Err(RuleError::mapping(spec, "target group name is empty"));
        }
        Ok(Self {
            instance,
            name: name.to_string(),
        })
    }
}

impl Display for TargetGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.instance.name() {
            Some(instance) => write!(f, "{instance}{INSTANCE_SEPARATOR}{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Desired target groups per instance.
pub type ResolvedGroups = BTreeMap<InstanceId, BTreeSet<String>>;

/// Flatten resolved groups into specifiers, `instance::Group` outside the
/// primary instance.
#[must_use]
pub fn group_specifiers(resolved: &ResolvedGroups) -> BTreeSet<String> {
    resolved
        .iter()
        .flat_map(|(instance, names)| {
            names.iter().map(move |name| {
                TargetGroup {
                    instance: instance.clone(),
                    name: name.clone(),
                }
                .to_string()
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct DynamicRule {
    pattern: Regex,
    instance: InstanceId,
    template: String,
}

impl DynamicRule {
    fn compile(rule: &DynamicGroupRule) -> RuleResult<Self> {
        let pattern = Regex::new(&rule.source)
            .map_err(|e| RuleError::regex(format!("additional_groups '{}'", rule.source), e))?;
        let (instance, template) = match rule.target.split_once(INSTANCE_SEPARATOR) {
            Some((instance, template)) => (InstanceId::named(instance), template.trim()),
            None => (InstanceId::Primary, rule.target.trim()),
        };
        if template.is_empty() {
            return Err(RuleError::mapping(&rule.source, "target template is empty"));
        }
        Ok(Self {
            pattern,
            instance,
            template: template.to_string(),
        })
    }

    fn apply(&self, group: &str) -> Option<String> {
        let captures = self.pattern.captures(group)?;
        let mut name = String::new();
        captures.expand(&self.template, &mut name);
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Lookup from directory group to target groups. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct GroupMappingTable {
    entries: BTreeMap<String, Vec<TargetGroup>>,
    rules: Vec<DynamicRule>,
}

impl GroupMappingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration entries.
    ///
    /// Entries for the same directory group are merged in order; repeated
    /// target groups are kept once.
    ///
    /// # Errors
    ///
    /// Fails on an empty directory group name, an empty target group, or an
    /// invalid dynamic rule pattern.
    pub fn from_config(
        entries: &[GroupMappingEntry],
        rules: &[DynamicGroupRule],
    ) -> RuleResult<Self> {
        let mut table = Self::new();
        for entry in entries {
            let directory_group = entry.directory_group.trim();
            if directory_group.is_empty() {
                return Err(RuleError::mapping(
                    &entry.directory_group,
                    "directory group name is empty",
                ));
            }
            for spec in &entry.adobe_groups {
                table.insert(directory_group, TargetGroup::parse(spec)?);
            }
            table.entries.entry(directory_group.to_string()).or_default();
        }
        table.rules = rules
            .iter()
            .map(DynamicRule::compile)
            .collect::<RuleResult<Vec<_>>>()?;
        Ok(table)
    }

    /// Add one mapping pair.
    pub fn insert(&mut self, directory_group: impl Into<String>, target: TargetGroup) {
        let targets = self.entries.entry(directory_group.into()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    /// Target groups a directory group maps to, in configuration order.
    #[must_use]
    pub fn targets(&self, directory_group: &str) -> &[TargetGroup] {
        self.entries
            .get(directory_group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Resolve directory groups to desired target groups per instance.
    ///
    /// Unmapped directory groups are ignored.
    pub fn resolve<'a, I>(&self, source_groups: I) -> ResolvedGroups
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut resolved = ResolvedGroups::new();
        for group in source_groups {
            for target in self.targets(group) {
                resolved
                    .entry(target.instance.clone())
                    .or_default()
                    .insert(target.name.clone());
            }
            for rule in &self.rules {
                if let Some(name) = rule.apply(group) {
                    resolved.entry(rule.instance.clone()).or_default().insert(name);
                }
            }
        }
        resolved
    }

    /// Target groups statically managed in an instance.
    #[must_use]
    pub fn managed_groups(&self, instance: &InstanceId) -> BTreeSet<String> {
        self.entries
            .values()
            .flatten()
            .filter(|t| &t.instance == instance)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Every instance named by an entry or a dynamic rule, primary included
    /// when referenced.
    #[must_use]
    pub fn referenced_instances(&self) -> BTreeSet<InstanceId> {
        self.entries
            .values()
            .flatten()
            .map(|t| t.instance.clone())
            .chain(self.rules.iter().map(|r| r.instance.clone()))
            .collect()
    }

    #[must_use]
    pub fn has_dynamic_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.rules.is_empty()
    }
}
