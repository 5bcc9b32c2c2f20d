//! Raw directory records and their normalization.
//!
//! Directory adapters yield loosely typed [`SourceRecord`] rows. The
//! [`RecordNormalizer`] turns each row into a [`SourceIdentity`] or
//! quarantines it as a [`RecordError`], so the rule engine only ever sees
//! well-typed identities.

use std::collections::BTreeMap;

use tracing::warn;
use usersync_core::IdentityType;

use crate::error::RecordError;
use crate::identity::SourceIdentity;

/// One raw row from a directory source.
///
/// Every field is optional; values that are blank after trimming count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRecord {
    /// 1-based line number (header = 1, first data row = 2), when the source is tabular.
    pub line_number: Option<usize>,
    pub identity_type: Option<String>,
    pub username: Option<String>,
    pub domain: Option<String>,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub country: Option<String>,
    /// Source group names.
    pub groups: Vec<String>,
    /// Attributes outside the core set, by column name.
    pub attributes: BTreeMap<String, String>,
    /// Every field as read, by its original name.
    pub raw: BTreeMap<String, String>,
}

impl SourceRecord {
    /// Identifier used when reporting a rejected record.
    fn identifier(&self) -> Option<String> {
        present(self.username.as_deref())
            .or_else(|| present(self.email.as_deref()))
            .map(str::to_string)
    }
}

/// Result of normalizing a batch of records.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    /// Well-typed identities, in source order.
    pub identities: Vec<SourceIdentity>,
    /// Quarantined rows.
    pub rejected: Vec<RecordError>,
}

/// Applies defaults and validation to raw directory records.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    new_account_type: IdentityType,
    default_country_code: Option<String>,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new(IdentityType::FederatedId, Some("US".to_string()))
    }
}

impl RecordNormalizer {
    pub fn new(new_account_type: IdentityType, default_country_code: Option<String>) -> Self {
        Self {
            new_account_type,
            default_country_code: default_country_code
                .as_deref()
                .and_then(|c| present(Some(c)))
                .map(str::to_string),
        }
    }

    /// Normalize one record.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] when the identity type is unknown, when the
    /// record has neither username nor e-mail, or when the e-mail is malformed.
    pub fn normalize(&self, record: &SourceRecord) -> Result<SourceIdentity, RecordError> {
        let reject = |field: &str, message: String| {
            RecordError::new(field, message)
                .at_line(record.line_number)
                .for_identifier(record.identifier())
        };

        let identity_type = match present(record.identity_type.as_deref()) {
            Some(raw) => raw
                .parse::<IdentityType>()
                .map_err(|e| reject("type", e.to_string()))?,
            None => self.new_account_type,
        };

        let email = present(record.email.as_deref());
        if let Some(email) = email {
            if !is_plausible_email(email) {
                return Err(reject("email", format!("malformed e-mail address '{email}'")));
            }
        }

        let username = present(record.username.as_deref())
            .or(email)
            .ok_or_else(|| reject("username", "missing username and e-mail".to_string()))?;

        let domain = present(record.domain.as_deref()).or_else(|| {
            if identity_type.is_domain_bound() {
                email.and_then(|e| e.rsplit_once('@')).map(|(_, d)| d)
            } else {
                None
            }
        });

        let country = present(record.country.as_deref())
            .map(str::to_string)
            .or_else(|| self.default_country_code.clone());

        let mut identity = SourceIdentity::new(identity_type, username);
        identity.domain = domain.map(str::to_string);
        identity.email = email.map(str::to_string);
        identity.firstname = present(record.firstname.as_deref()).map(str::to_string);
        identity.lastname = present(record.lastname.as_deref()).map(str::to_string);
        identity.country = country;
        identity.groups = record
            .groups
            .iter()
            .filter_map(|g| present(Some(g.as_str())))
            .map(str::to_string)
            .collect();
        identity.extended = record
            .attributes
            .iter()
            .filter_map(|(k, v)| present(Some(v.as_str())).map(|v| (k.clone(), v.to_string())))
            .collect();
        identity.source_attributes = record.raw.clone();

        Ok(identity)
    }
}

/// Normalize a batch, quarantining malformed rows.
///
/// Rejected rows are logged and never abort the batch.
pub fn normalize_records(records: &[SourceRecord], normalizer: &RecordNormalizer) -> SourceBatch {
    let mut batch = SourceBatch::default();

    for record in records {
        match normalizer.normalize(record) {
            Ok(identity) => batch.identities.push(identity),
            Err(error) => {
                warn!(
                    line = ?error.line_number,
                    identifier = ?error.identifier,
                    field = %error.field,
                    "Skipping directory record: {}",
                    error.message
                );
                batch.rejected.push(error);
            }
        }
    }

    batch
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SourceRecord {
        SourceRecord {
            line_number: Some(2),
            ..SourceRecord::default()
        }
    }

    #[test]
    fn test_defaults_applied() {
        let rec = SourceRecord {
            email: Some("Alice@Example.com".to_string()),
            ..record()
        };
        let identity = RecordNormalizer::default().normalize(&rec).unwrap();
        assert_eq!(identity.identity_type, IdentityType::FederatedId);
        assert_eq!(identity.username, "Alice@Example.com");
        assert_eq!(identity.domain.as_deref(), Some("Example.com"));
        assert_eq!(identity.country.as_deref(), Some("US"));
    }

    #[test]
    fn test_explicit_values_win() {
        let rec = SourceRecord {
            identity_type: Some("enterpriseID".to_string()),
            username: Some("alice".to_string()),
            domain: Some("corp.example.com".to_string()),
            email: Some("alice@example.com".to_string()),
            country: Some("DE".to_string()),
            ..record()
        };
        let identity = RecordNormalizer::default().normalize(&rec).unwrap();
        assert_eq!(identity.identity_type, IdentityType::EnterpriseId);
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.domain.as_deref(), Some("corp.example.com"));
        assert_eq!(identity.country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_adobe_id_gets_no_derived_domain() {
        let rec = SourceRecord {
            identity_type: Some("adobeID".to_string()),
            email: Some("b@y.com".to_string()),
            ..record()
        };
        let identity = RecordNormalizer::default().normalize(&rec).unwrap();
        assert_eq!(identity.domain, None);
        assert_eq!(identity.key().to_string(), "adobeID,b@y.com,");
    }

    #[test]
    fn test_blank_values_are_absent() {
        let rec = SourceRecord {
            username: Some("  ".to_string()),
            email: Some("c@z.com".to_string()),
            firstname: Some(" ".to_string()),
            groups: vec!["eng".to_string(), "  ".to_string()],
            ..record()
        };
        let identity = RecordNormalizer::default().normalize(&rec).unwrap();
        assert_eq!(identity.username, "c@z.com");
        assert_eq!(identity.firstname, None);
        assert_eq!(identity.groups.len(), 1);
    }

    #[test]
    fn test_missing_username_and_email_rejected() {
        let rec = SourceRecord {
            firstname: Some("Nobody".to_string()),
            ..record()
        };
        let err = RecordNormalizer::default().normalize(&rec).unwrap_err();
        assert_eq!(err.field, "username");
        assert_eq!(err.line_number, Some(2));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let rec = SourceRecord {
            identity_type: Some("guestID".to_string()),
            username: Some("alice".to_string()),
            ..record()
        };
        let err = RecordNormalizer::default().normalize(&rec).unwrap_err();
        assert_eq!(err.field, "type");
        assert_eq!(err.identifier.as_deref(), Some("alice"));
    }

    #[test]
    fn test_malformed_email_rejected() {
        let rec = SourceRecord {
            email: Some("not-an-address".to_string()),
            ..record()
        };
        let err = RecordNormalizer::default().normalize(&rec).unwrap_err();
        assert_eq!(err.field, "email");
    }

    #[test]
    fn test_batch_partitions_rows() {
        let good = SourceRecord {
            email: Some("a@x.com".to_string()),
            ..record()
        };
        let bad = SourceRecord {
            line_number: Some(3),
            ..SourceRecord::default()
        };
        let batch = normalize_records(&[good, bad], &RecordNormalizer::default());
        assert_eq!(batch.identities.len(), 1);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].line_number, Some(3));
    }

    #[test]
    fn test_no_default_country() {
        let normalizer = RecordNormalizer::new(IdentityType::AdobeId, Some(" ".to_string()));
        let rec = SourceRecord {
            email: Some("a@x.com".to_string()),
            ..record()
        };
        let identity = normalizer.normalize(&rec).unwrap();
        assert_eq!(identity.identity_type, IdentityType::AdobeId);
        assert_eq!(identity.country, None);
    }
}
