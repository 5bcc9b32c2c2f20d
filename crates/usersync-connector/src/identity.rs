//! Normalized identities exchanged with the rule engine.
//!
//! [`SourceIdentity`] values come out of a directory source after
//! normalization, [`TargetIdentity`] values come out of a target system
//! snapshot. Both expose the attributes the diff engine compares through
//! [`IdentityAttributes`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use usersync_core::{IdentityKey, IdentityType, InstanceId};

use crate::error::ConnectorError;

/// Name of the e-mail attribute.
pub const ATTR_EMAIL: &str = "email";
/// Name of the first-name attribute.
pub const ATTR_FIRSTNAME: &str = "firstname";
/// Name of the last-name attribute.
pub const ATTR_LASTNAME: &str = "lastname";
/// Name of the country attribute.
pub const ATTR_COUNTRY: &str = "country";

/// Core attributes every identity carries, in diff order.
pub const CORE_ATTRIBUTES: [&str; 4] = [ATTR_EMAIL, ATTR_FIRSTNAME, ATTR_LASTNAME, ATTR_COUNTRY];

/// Read access to the addressable attributes of an identity.
pub trait IdentityAttributes {
    /// Look up an attribute by name.
    ///
    /// Core attributes resolve to their dedicated fields; any other name is
    /// looked up in the extended attribute map.
    fn attribute(&self, name: &str) -> Option<&str>;
}

/// One normalized record from the authoritative directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub identity_type: IdentityType,
    pub username: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Source group names.
    #[serde(default)]
    pub groups: BTreeSet<String>,
    /// Target group names derived from `groups` by the mapping table,
    /// `instance::Group` for secondary instances. Empty until resolved.
    #[serde(default)]
    pub member_groups: BTreeSet<String>,
    /// Extended attributes that may participate in diffs and exclusions.
    #[serde(default)]
    pub extended: BTreeMap<String, String>,
    /// Raw directory fields, kept for audit only.
    #[serde(default)]
    pub source_attributes: BTreeMap<String, String>,
}

impl SourceIdentity {
    /// Create a source identity with only its key fields set.
    pub fn new(identity_type: IdentityType, username: impl Into<String>) -> Self {
        Self {
            identity_type,
            username: username.into(),
            domain: None,
            email: None,
            firstname: None,
            lastname: None,
            country: None,
            groups: BTreeSet::new(),
            member_groups: BTreeSet::new(),
            extended: BTreeMap::new(),
            source_attributes: BTreeMap::new(),
        }
    }

    /// The matching key of this identity.
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.identity_type, &self.username, self.domain.as_deref())
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, firstname: impl Into<String>, lastname: impl Into<String>) -> Self {
        self.firstname = Some(firstname.into());
        self.lastname = Some(lastname.into());
        self
    }

    #[must_use]
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    #[must_use]
    pub fn with_extended(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extended.insert(name.into(), value.into());
        self
    }
}

impl IdentityAttributes for SourceIdentity {
    fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            ATTR_EMAIL => self.email.as_deref(),
            ATTR_FIRSTNAME => self.firstname.as_deref(),
            ATTR_LASTNAME => self.lastname.as_deref(),
            ATTR_COUNTRY => self.country.as_deref(),
            other => self.extended.get(other).map(String::as_str),
        }
    }
}

/// Account status reported by the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    #[default]
    Active,
    Disabled,
    Pending,
}

impl TargetStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Active => "active",
            TargetStatus::Disabled => "disabled",
            TargetStatus::Pending => "pending",
        }
    }
}

impl Display for TargetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(TargetStatus::Active),
            "disabled" => Ok(TargetStatus::Disabled),
            "pending" => Ok(TargetStatus::Pending),
            _ => Err(ConnectorError::InvalidData {
                message: format!("unknown target status: {s}"),
            }),
        }
    }
}

/// One identity already present in a target instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIdentity {
    #[serde(default)]
    pub instance: InstanceId,
    pub identity_type: IdentityType,
    pub username: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub status: TargetStatus,
    /// Current group memberships.
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub extended: BTreeMap<String, String>,
}

impl TargetIdentity {
    /// Create an active target identity in the given instance.
    pub fn new(
        instance: InstanceId,
        identity_type: IdentityType,
        username: impl Into<String>,
    ) -> Self {
        Self {
            instance,
            identity_type,
            username: username.into(),
            domain: None,
            email: None,
            firstname: None,
            lastname: None,
            country: None,
            status: TargetStatus::Active,
            groups: BTreeSet::new(),
            extended: BTreeMap::new(),
        }
    }

    /// The matching key of this identity.
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.identity_type, &self.username, self.domain.as_deref())
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, firstname: impl Into<String>, lastname: impl Into<String>) -> Self {
        self.firstname = Some(firstname.into());
        self.lastname = Some(lastname.into());
        self
    }

    #[must_use]
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: TargetStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_extended(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extended.insert(name.into(), value.into());
        self
    }
}

impl IdentityAttributes for TargetIdentity {
    fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            ATTR_EMAIL => self.email.as_deref(),
            ATTR_FIRSTNAME => self.firstname.as_deref(),
            ATTR_LASTNAME => self.lastname.as_deref(),
            ATTR_COUNTRY => self.country.as_deref(),
            other => self.extended.get(other).map(String::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_key_uses_domain() {
        let source = SourceIdentity::new(IdentityType::FederatedId, "Alice@Example.com")
            .with_domain("example.com");
        assert_eq!(
            source.key().to_string(),
            "federatedID,alice@example.com,example.com"
        );
    }

    #[test]
    fn test_target_key_matches_source_key() {
        let source =
            SourceIdentity::new(IdentityType::EnterpriseId, "bob").with_domain("example.com");
        let target = TargetIdentity::new(InstanceId::Primary, IdentityType::EnterpriseId, "BOB")
            .with_domain("Example.com");
        assert_eq!(source.key(), target.key());
    }

    #[test]
    fn test_attribute_lookup() {
        let source = SourceIdentity::new(IdentityType::AdobeId, "c@z.com")
            .with_email("c@z.com")
            .with_country("DE")
            .with_extended("department", "R&D");
        assert_eq!(source.attribute("email"), Some("c@z.com"));
        assert_eq!(source.attribute("country"), Some("DE"));
        assert_eq!(source.attribute("department"), Some("R&D"));
        assert_eq!(source.attribute("firstname"), None);
    }

    #[test]
    fn test_target_status_parse() {
        assert_eq!("Active".parse::<TargetStatus>().unwrap(), TargetStatus::Active);
        assert_eq!(
            "disabled".parse::<TargetStatus>().unwrap(),
            TargetStatus::Disabled
        );
        assert!("gone".parse::<TargetStatus>().is_err());
    }

    #[test]
    fn test_target_identity_serde_defaults() {
        let json = r#"{"identity_type":"federatedID","username":"alice","domain":"example.com"}"#;
        let target: TargetIdentity = serde_json::from_str(json).unwrap();
        assert!(target.instance.is_primary());
        assert_eq!(target.status, TargetStatus::Active);
        assert!(target.groups.is_empty());
    }
}
