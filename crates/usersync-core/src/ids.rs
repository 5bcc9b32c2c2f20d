//! Identity Identifiers
//!
//! Strongly typed identifiers used by the reconciliation engine:
//!
//! - [`IdentityType`] - the account flavour in the target system
//! - [`InstanceId`] - which target instance an identity lives in
//! - [`IdentityKey`] - the composite `(type, username, domain)` matching key
//!
//! Two identities are the same identity iff their keys are equal within the
//! same target instance. Key components are trimmed and lower-cased when the
//! key is built, so keys built from directory data and keys built from
//! target data compare equal regardless of case.
//!
//! # Example
//!
//! ```
//! use usersync_core::{IdentityKey, IdentityType};
//!
//! let key = IdentityKey::new(IdentityType::AdobeId, "b@y.com", Some("y.com"));
//! assert_eq!(key.to_string(), "adobeID,b@y.com,y.com");
//!
//! // Keys decompose back into their parts.
//! let parsed = IdentityKey::parse("adobeID,b@y.com,y.com").unwrap();
//! assert_eq!(parsed.identity_type(), IdentityType::AdobeId);
//! assert_eq!(parsed.username(), "b@y.com");
//! assert_eq!(parsed.domain(), "y.com");
//! ```

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::{Result, UserSyncError};

/// Account flavour of an identity in the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityType {
    /// Identity authenticated by the customer's own identity provider.
    FederatedId,
    /// Identity owned by the organization, authenticated by the target system.
    EnterpriseId,
    /// Personal identity owned by the user.
    AdobeId,
}

impl IdentityType {
    /// All identity types, in key order.
    pub const ALL: [IdentityType; 3] = [
        IdentityType::FederatedId,
        IdentityType::EnterpriseId,
        IdentityType::AdobeId,
    ];

    /// Convert to the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityType::FederatedId => "federatedID",
            IdentityType::EnterpriseId => "enterpriseID",
            IdentityType::AdobeId => "adobeID",
        }
    }

    /// Whether accounts of this type belong to a claimed domain.
    #[must_use]
    pub fn is_domain_bound(&self) -> bool {
        matches!(self, IdentityType::FederatedId | IdentityType::EnterpriseId)
    }
}

impl Display for IdentityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IdentityType {
    type Err = UserSyncError;

    /// Parse case-insensitively; `federated_id` and `federatedID` are equivalent.
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "federatedid" => Ok(IdentityType::FederatedId),
            "enterpriseid" => Ok(IdentityType::EnterpriseId),
            "adobeid" => Ok(IdentityType::AdobeId),
            _ => Err(UserSyncError::InvalidIdentityType {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for IdentityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IdentityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Identifier of one target instance.
///
/// The primary instance has no name; secondary instances are addressed by
/// the name used in group mapping qualifiers and persisted stray rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum InstanceId {
    /// The primary (default) target instance.
    #[default]
    Primary,
    /// A named secondary target instance.
    Named(String),
}

impl InstanceId {
    /// The primary instance.
    #[must_use]
    pub fn primary() -> Self {
        InstanceId::Primary
    }

    /// A named instance. A blank name denotes the primary instance.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            InstanceId::Primary
        } else {
            InstanceId::Named(trimmed.to_string())
        }
    }

    /// Build from an optional tabular column (`umapi`), where absent or empty means primary.
    #[must_use]
    pub fn from_column(value: Option<&str>) -> Self {
        value.map_or(InstanceId::Primary, InstanceId::named)
    }

    /// Value written to a tabular column: empty for the primary instance.
    #[must_use]
    pub fn as_column(&self) -> &str {
        match self {
            InstanceId::Primary => "",
            InstanceId::Named(name) => name,
        }
    }

    /// The instance name, `None` for the primary instance.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            InstanceId::Primary => None,
            InstanceId::Named(name) => Some(name),
        }
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self, InstanceId::Primary)
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceId::Primary => write!(f, "(primary)"),
            InstanceId::Named(name) => write!(f, "{name}"),
        }
    }
}

impl Serialize for InstanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            InstanceId::Primary => serializer.serialize_none(),
            InstanceId::Named(name) => serializer.serialize_some(name),
        }
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(InstanceId::from_column(raw.as_deref()))
    }
}

/// Composite matching key of an identity within one target instance.
///
/// The string form is exactly `<type>,<username>,<domain>`; an identity
/// without a domain renders an empty trailing component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    identity_type: IdentityType,
    username: String,
    domain: String,
}

impl IdentityKey {
    /// Build a key, normalizing username and domain.
    pub fn new(identity_type: IdentityType, username: &str, domain: Option<&str>) -> Self {
        Self {
            identity_type,
            username: normalize_component(username),
            domain: domain.map(normalize_component).unwrap_or_default(),
        }
    }

    /// Decompose a key string produced by [`IdentityKey`]'s `Display`.
    ///
    /// # Errors
    ///
    /// Returns [`UserSyncError::InvalidIdentityKey`] when the string lacks a
    /// type or username component, and [`UserSyncError::InvalidIdentityType`]
    /// when the type component is unknown.
    pub fn parse(key: &str) -> Result<Self> {
        let (type_part, rest) = key
            .split_once(',')
            .ok_or_else(|| UserSyncError::invalid_key(key, "expected 'type,username,domain'"))?;
        let (username, domain) = rest
            .rsplit_once(',')
            .ok_or_else(|| UserSyncError::invalid_key(key, "missing domain component"))?;

        if username.trim().is_empty() {
            return Err(UserSyncError::invalid_key(key, "username is empty"));
        }

        let identity_type: IdentityType = type_part.parse()?;
        Ok(Self::new(identity_type, username, Some(domain)))
    }

    #[must_use]
    pub fn identity_type(&self) -> IdentityType {
        self.identity_type
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Domain component, empty when the identity has none.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

fn normalize_component(value: &str) -> String {
    value.trim().to_lowercase()
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.identity_type, self.username, self.domain)
    }
}

impl FromStr for IdentityKey {
    type Err = UserSyncError;

    fn from_str(s: &str) -> Result<Self> {
        IdentityKey::parse(s)
    }
}

impl Serialize for IdentityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        IdentityKey::parse(&raw).map_err(de::Error::custom)
    }
}
