//! Error Types
//!
//! This module provides the error type shared by all usersync crates for
//! malformed identity values.
//!
//! # Example
//!
//! ```
//! use usersync_core::{IdentityType, UserSyncError};
//!
//! let err = "guestID".parse::<IdentityType>().unwrap_err();
//! assert!(matches!(err, UserSyncError::InvalidIdentityType { .. }));
//! ```

use serde::Serialize;
use thiserror::Error;

/// Standardized error type for usersync identity values.
///
/// # Variants
///
/// - `InvalidIdentityType` - An identity type string outside the known set
/// - `InvalidIdentityKey` - A composite key string that cannot be decomposed
/// - `ValidationError` - A field that fails validation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserSyncError {
    /// Identity type string is not one of `federatedID`, `enterpriseID`, `adobeID`.
    #[error("Unknown identity type: '{value}'")]
    InvalidIdentityType {
        /// The rejected value
        value: String,
    },

    /// Identity key string does not have the `type,username,domain` shape.
    #[error("Malformed identity key '{key}': {message}")]
    InvalidIdentityKey {
        /// The rejected key string
        key: String,
        /// Why it was rejected
        message: String,
    },

    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

impl UserSyncError {
    /// Create a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidIdentityKey {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Type alias for Results using `UserSyncError`.
pub type Result<T> = std::result::Result<T, UserSyncError>;
