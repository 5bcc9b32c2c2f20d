//! Rule configuration.
//!
//! [`SyncConfig`] is the document an operator writes: the rule settings of
//! [`RuleConfig`] plus plan-application settings and the list of secondary
//! target instances.
//!
//! ```yaml
//! new_account_type: federatedID
//! max_adobe_only_users: 200
//! adobe_only_user_action: remove_from_mapped_groups
//! groups:
//!   - directory_group: eng
//!     adobe_groups: [Engineering, "secondary::Engineering"]
//! additional_groups:
//!   - source: "^ACL-(.+)$"
//!     target: "ACL-Grp-$1"
//! secondary_instances: [secondary]
//! execution:
//!   dry_run: true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use usersync_core::{IdentityType, InstanceId};

use crate::error::{RuleError, RuleResult};
use crate::executor::ExecutionConfig;

/// Action taken against stray target identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrayAction {
    /// Leave strays alone.
    #[default]
    Preserve,
    /// Remove strays from the groups the mapping table manages.
    #[serde(alias = "remove_adobe_groups")]
    RemoveFromMappedGroups,
    /// Remove all access but keep the account.
    Disentitle,
    /// Delete the account.
    #[serde(alias = "remove")]
    RemoveUser,
}

impl StrayAction {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StrayAction::Preserve => "preserve",
            StrayAction::RemoveFromMappedGroups => "remove_from_mapped_groups",
            StrayAction::Disentitle => "disentitle",
            StrayAction::RemoveUser => "remove_user",
        }
    }

    /// Whether the action removes access.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        !matches!(self, StrayAction::Preserve)
    }
}

impl Display for StrayAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrayAction {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "preserve" => Ok(StrayAction::Preserve),
            "remove_from_mapped_groups" | "remove_adobe_groups" => {
                Ok(StrayAction::RemoveFromMappedGroups)
            }
            "disentitle" => Ok(StrayAction::Disentitle),
            "remove_user" | "remove" => Ok(StrayAction::RemoveUser),
            _ => Err(RuleError::configuration(format!(
                "unknown adobe_only_user_action: {s}"
            ))),
        }
    }
}

/// One static mapping from a directory group to target groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMappingEntry {
    /// Directory (source) group name.
    pub directory_group: String,
    /// Target group specifiers: `Group` or `instance::Group`.
    #[serde(default)]
    pub adobe_groups: Vec<String>,
}

/// Rule deriving target groups from directory group names by pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGroupRule {
    /// Regex matched against each directory group name.
    pub source: String,
    /// Target group template with `$1`-style captures, optionally `instance::`-qualified.
    pub target: String,
}

/// Reconciliation rule settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Identity type given to records that carry none.
    #[serde(default = "default_new_account_type")]
    pub new_account_type: IdentityType,

    /// Country applied to records that carry none.
    #[serde(default = "default_country_code")]
    pub default_country_code: Option<String>,

    /// Also sync attributes of matched identities, not just group memberships.
    #[serde(default)]
    pub update_user_info: bool,

    /// Reconcile group memberships.
    #[serde(default = "default_process_groups")]
    pub process_groups: bool,

    /// Stray count above which all stray disposal is suppressed.
    #[serde(default = "default_max_adobe_only_users")]
    pub max_adobe_only_users: usize,

    /// Disposal action for strays.
    #[serde(default)]
    pub adobe_only_user_action: StrayAction,

    /// Never dispose of strays.
    #[serde(default)]
    pub exclude_strays: bool,

    #[serde(default)]
    pub exclude_identity_types: Vec<IdentityType>,

    /// Regexes; a username matching any of them is excluded.
    #[serde(default)]
    pub username_exclude_regex: Vec<String>,

    /// Usernames excluded outright (case-insensitive).
    #[serde(default)]
    pub exclude_users: Vec<String>,

    /// Members of these groups are excluded. Source identities are checked
    /// against source groups, strays against their target groups.
    #[serde(default)]
    pub exclude_groups: Vec<String>,

    /// Attribute name to regex; a matching value excludes the identity.
    #[serde(default)]
    pub exclude_attribute_values: BTreeMap<String, String>,

    /// Apply the exclusion rules to strays as well, protecting matches from disposal.
    #[serde(default)]
    pub protect_strays_with_exclusions: bool,

    /// Let `exclude_attribute_values` protect strays through their extended attributes.
    #[serde(default)]
    pub match_extended_attributes_on_strays: bool,

    /// Extended attributes synced and compared in addition to the core set.
    #[serde(default)]
    pub extended_attributes: Vec<String>,

    /// Only directory groups matching this regex take part in mapping.
    #[serde(default)]
    pub directory_group_filter: Option<String>,

    /// Static group mapping.
    #[serde(default)]
    pub groups: Vec<GroupMappingEntry>,

    /// Dynamic group rules.
    #[serde(default)]
    pub additional_groups: Vec<DynamicGroupRule>,
}

fn default_new_account_type() -> IdentityType {
    IdentityType::FederatedId
}

#[allow(clippy::unnecessary_wraps)]
fn default_country_code() -> Option<String> {
    Some("US".to_string())
}

fn default_process_groups() -> bool {
    true
}

fn default_max_adobe_only_users() -> usize {
    200
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            new_account_type: default_new_account_type(),
            default_country_code: default_country_code(),
            update_user_info: false,
            process_groups: default_process_groups(),
            max_adobe_only_users: default_max_adobe_only_users(),
            adobe_only_user_action: StrayAction::default(),
            exclude_strays: false,
            exclude_identity_types: vec![],
            username_exclude_regex: vec![],
            exclude_users: vec![],
            exclude_groups: vec![],
            exclude_attribute_values: BTreeMap::new(),
            protect_strays_with_exclusions: false,
            match_extended_attributes_on_strays: false,
            extended_attributes: vec![],
            directory_group_filter: None,
            groups: vec![],
            additional_groups: vec![],
        }
    }
}

impl RuleConfig {
    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(content: &str) -> RuleResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RuleResult<Self> {
        Self::from_yaml(&read_config(path.as_ref())?)
    }

    /// Check the settings that do not need compiling.
    ///
    /// Patterns and mapping specifiers are checked when the policy and the
    /// mapping table are built.
    pub fn validate(&self) -> RuleResult<()> {
        if self.exclude_identity_types.contains(&self.new_account_type) {
            return Err(RuleError::configuration(format!(
                "new_account_type {} is listed in exclude_identity_types",
                self.new_account_type
            )));
        }

        for entry in &self.groups {
            if entry.directory_group.trim().is_empty() {
                return Err(RuleError::mapping(
                    &entry.directory_group,
                    "directory group name is empty",
                ));
            }
        }

        for name in &self.extended_attributes {
            if name.trim().is_empty() {
                return Err(RuleError::configuration(
                    "extended_attributes contains an empty name",
                ));
            }
        }

        Ok(())
    }
}

/// Complete synchronization settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(flatten)]
    pub rules: RuleConfig,

    /// Named secondary target instances, in addition to the primary.
    #[serde(default)]
    pub secondary_instances: Vec<String>,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl SyncConfig {
    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(content: &str) -> RuleResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RuleResult<Self> {
        Self::from_yaml(&read_config(path.as_ref())?)
    }

    pub fn validate(&self) -> RuleResult<()> {
        self.rules.validate()?;
        self.execution.validate()?;
        if self.secondary_instances.iter().any(|n| n.trim().is_empty()) {
            return Err(RuleError::configuration(
                "secondary_instances contains an empty name",
            ));
        }
        Ok(())
    }

    /// Primary instance followed by the configured secondaries.
    #[must_use]
    pub fn instances(&self) -> Vec<InstanceId> {
        let mut instances = vec![InstanceId::Primary];
        for name in &self.secondary_instances {
            let instance = InstanceId::named(name.as_str());
            if !instances.contains(&instance) {
                instances.push(instance);
            }
        }
        instances
    }
}

fn read_config(path: &Path) -> RuleResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        RuleError::configuration(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })
}
