//! Exclusion and stray protection policy.
//!
//! Compiled once from [`RuleConfig`]. Source identities that match an
//! exclusion rule are ignored entirely; strays that match are protected from
//! disposal when stray protection is enabled.

use regex::Regex;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use usersync_connector::{IdentityAttributes, SourceIdentity, TargetIdentity};
use usersync_core::IdentityType;

use crate::config::{RuleConfig, StrayAction};
use crate::error::{RuleError, RuleResult};

/// Which rule excluded an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    IdentityType(IdentityType),
    UsernamePattern(String),
    ExcludedUser,
    ExcludedGroup(String),
    AttributeValue(String),
}

impl Display for ExclusionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::IdentityType(t) => write!(f, "identity type {t} is excluded"),
            ExclusionReason::UsernamePattern(p) => write!(f, "username matches '{p}'"),
            ExclusionReason::ExcludedUser => write!(f, "username is in exclude_users"),
            ExclusionReason::ExcludedGroup(g) => write!(f, "member of excluded group '{g}'"),
            ExclusionReason::AttributeValue(a) => write!(f, "attribute '{a}' matches exclusion"),
        }
    }
}

/// Compiled exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    identity_types: HashSet<IdentityType>,
    username_patterns: Vec<Regex>,
    users: HashSet<String>,
    groups: HashSet<String>,
    attribute_patterns: Vec<(String, Regex)>,
}

impl ExclusionPolicy {
    /// Compile the exclusion rules of a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Regex`] for an invalid pattern.
    pub fn from_config(config: &RuleConfig) -> RuleResult<Self> {
        let username_patterns = config
            .username_exclude_regex
            .iter()
            .map(|p| Regex::new(p).map_err(|e| RuleError::regex("username_exclude_regex", e)))
            .collect::<RuleResult<Vec<_>>>()?;

        let attribute_patterns = config
            .exclude_attribute_values
            .iter()
            .map(|(name, p)| {
                Regex::new(p)
                    .map(|re| (name.clone(), re))
                    .map_err(|e| RuleError::regex(format!("exclude_attribute_values.{name}"), e))
            })
            .collect::<RuleResult<Vec<_>>>()?;

        Ok(Self {
            identity_types: config.exclude_identity_types.iter().copied().collect(),
            username_patterns,
            users: config
                .exclude_users
                .iter()
                .map(|u| u.trim().to_lowercase())
                .collect(),
            groups: config.exclude_groups.iter().map(|g| g.trim().to_string()).collect(),
            attribute_patterns,
        })
    }

    fn check_identity(&self, identity_type: IdentityType, username: &str) -> Option<ExclusionReason> {
        if self.identity_types.contains(&identity_type) {
            return Some(ExclusionReason::IdentityType(identity_type));
        }
        if let Some(pattern) = self.username_patterns.iter().find(|p| p.is_match(username)) {
            return Some(ExclusionReason::UsernamePattern(pattern.as_str().to_string()));
        }
        if self.users.contains(&username.trim().to_lowercase()) {
            return Some(ExclusionReason::ExcludedUser);
        }
        None
    }

    fn check_groups<'a, I>(&self, groups: I) -> Option<ExclusionReason>
    where
        I: IntoIterator<Item = &'a String>,
    {
        groups
            .into_iter()
            .find(|g| self.groups.contains(g.as_str()))
            .map(|g| ExclusionReason::ExcludedGroup(g.clone()))
    }

    fn check_attributes<A: IdentityAttributes + ?Sized>(&self, identity: &A) -> Option<ExclusionReason> {
        self.attribute_patterns
            .iter()
            .find(|(name, pattern)| {
                identity
                    .attribute(name)
                    .is_some_and(|value| pattern.is_match(value))
            })
            .map(|(name, _)| ExclusionReason::AttributeValue(name.clone()))
    }

    /// Why a directory identity is excluded, if it is.
    ///
    /// Groups are checked against the identity's directory groups.
    #[must_use]
    pub fn excludes_source(&self, identity: &SourceIdentity) -> Option<ExclusionReason> {
        self.check_identity(identity.identity_type, &identity.username)
            .or_else(|| self.check_groups(&identity.groups))
            .or_else(|| self.check_attributes(identity))
    }

    /// Why a stray is protected, if it is.
    ///
    /// Groups are checked against the stray's target groups. Attribute rules
    /// only apply when `match_attributes` is set.
    #[must_use]
    pub fn protects_stray(
        &self,
        identity: &TargetIdentity,
        match_attributes: bool,
    ) -> Option<ExclusionReason> {
        self.check_identity(identity.identity_type, &identity.username)
            .or_else(|| self.check_groups(&identity.groups))
            .or_else(|| {
                if match_attributes {
                    self.check_attributes(identity)
                } else {
                    None
                }
            })
    }
}

/// Stray disposal settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisposalPolicy {
    pub action: StrayAction,
    /// Never dispose of strays.
    pub exclude_strays: bool,
    /// Protect strays that match the exclusion rules.
    pub protect_with_exclusions: bool,
    pub match_attributes_on_strays: bool,
    /// Eligible stray count above which disposal is blocked.
    pub threshold: usize,
}

impl DisposalPolicy {
    #[must_use]
    pub fn from_config(config: &RuleConfig) -> Self {
        Self {
            action: config.adobe_only_user_action,
            exclude_strays: config.exclude_strays,
            protect_with_exclusions: config.protect_strays_with_exclusions,
            match_attributes_on_strays: config.match_extended_attributes_on_strays,
            threshold: config.max_adobe_only_users,
        }
    }

    /// Whether `eligible` strays trip the safety threshold.
    ///
    /// Applies to every action, `preserve` included: a stray count this
    /// large usually means a short directory feed.
    #[must_use]
    pub fn exceeds_threshold(&self, eligible: usize) -> bool {
        eligible > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use usersync_core::InstanceId;

    fn policy(config: RuleConfig) -> ExclusionPolicy {
        ExclusionPolicy::from_config(&config).unwrap()
    }

    #[test]
    fn test_excludes_identity_type() {
        let p = policy(RuleConfig {
            exclude_identity_types: vec![IdentityType::AdobeId],
            ..RuleConfig::default()
        });
        let adobe = SourceIdentity::new(IdentityType::AdobeId, "b@y.com");
        let federated = SourceIdentity::new(IdentityType::FederatedId, "a@x.com");
        assert_eq!(
            p.excludes_source(&adobe),
            Some(ExclusionReason::IdentityType(IdentityType::AdobeId))
        );
        assert_eq!(p.excludes_source(&federated), None);
    }

    #[test]
    fn test_excludes_username_pattern_and_list() {
        let p = policy(RuleConfig {
            username_exclude_regex: vec!["^svc-".to_string()],
            exclude_users: vec!["Admin@Example.com".to_string()],
            ..RuleConfig::default()
        });
        let svc = SourceIdentity::new(IdentityType::FederatedId, "svc-backup");
        let admin = SourceIdentity::new(IdentityType::FederatedId, "admin@example.COM");
        assert!(matches!(
            p.excludes_source(&svc),
            Some(ExclusionReason::UsernamePattern(_))
        ));
        assert_eq!(p.excludes_source(&admin), Some(ExclusionReason::ExcludedUser));
    }

    #[test]
    fn test_excludes_group_and_attribute() {
        let p = policy(RuleConfig {
            exclude_groups: vec!["contractors".to_string()],
            exclude_attribute_values: BTreeMap::from([(
                "employeeType".to_string(),
                "^temp$".to_string(),
            )]),
            ..RuleConfig::default()
        });
        let member = SourceIdentity::new(IdentityType::FederatedId, "a").with_group("contractors");
        let temp =
            SourceIdentity::new(IdentityType::FederatedId, "b").with_extended("employeeType", "temp");
        let staff =
            SourceIdentity::new(IdentityType::FederatedId, "c").with_extended("employeeType", "staff");
        assert!(matches!(
            p.excludes_source(&member),
            Some(ExclusionReason::ExcludedGroup(_))
        ));
        assert!(matches!(
            p.excludes_source(&temp),
            Some(ExclusionReason::AttributeValue(_))
        ));
        assert_eq!(p.excludes_source(&staff), None);
    }

    #[test]
    fn test_stray_attribute_matching_is_opt_in() {
        let p = policy(RuleConfig {
            exclude_attribute_values: BTreeMap::from([(
                "employeeType".to_string(),
                "^temp$".to_string(),
            )]),
            ..RuleConfig::default()
        });
        let stray = TargetIdentity::new(InstanceId::Primary, IdentityType::FederatedId, "t")
            .with_extended("employeeType", "temp");
        assert_eq!(p.protects_stray(&stray, false), None);
        assert!(p.protects_stray(&stray, true).is_some());
    }

    #[test]
    fn test_stray_group_protection_uses_target_groups() {
        let p = policy(RuleConfig {
            exclude_groups: vec!["Admins".to_string()],
            ..RuleConfig::default()
        });
        let stray = TargetIdentity::new(InstanceId::Primary, IdentityType::FederatedId, "root")
            .with_group("Admins");
        assert!(matches!(
            p.protects_stray(&stray, false),
            Some(ExclusionReason::ExcludedGroup(_))
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = ExclusionPolicy::from_config(&RuleConfig {
            username_exclude_regex: vec!["[".to_string()],
            ..RuleConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, RuleError::Regex { .. }));
    }

    #[test]
    fn test_threshold_applies_to_every_action() {
        let mut disposal = DisposalPolicy::from_config(&RuleConfig {
            max_adobe_only_users: 2,
            ..RuleConfig::default()
        });
        for action in [StrayAction::Preserve, StrayAction::RemoveUser] {
            disposal.action = action;
            assert!(!disposal.exceeds_threshold(2), "action {action}");
            assert!(disposal.exceeds_threshold(3), "action {action}");
        }
    }
}
