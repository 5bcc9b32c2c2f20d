//! Rule engine error types.

use thiserror::Error;
use usersync_connector::ConnectorError;

/// Errors that can occur while configuring, planning or applying a pass.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Configuration error; fails the pass before any op is emitted.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Malformed group mapping entry.
    #[error("Mapping error: group '{group}' - {message}")]
    Mapping { group: String, message: String },

    /// Stray disposal suppressed by the safety threshold.
    #[error(
        "Stray disposal blocked: {stray_count} strays exceed max_adobe_only_users ({threshold})"
    )]
    DisposalBlocked { stray_count: usize, threshold: usize },

    /// Invalid regular expression in configuration.
    #[error("Invalid pattern for '{field}': {source}")]
    Regex {
        field: String,
        #[source]
        source: regex::Error,
    },

    /// Connector error.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Stray persistence error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration document error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Report serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RuleError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a mapping error.
    pub fn mapping(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            group: group.into(),
            message: message.into(),
        }
    }

    /// Create a regex error for a configuration field.
    pub fn regex(field: impl Into<String>, source: regex::Error) -> Self {
        Self::Regex {
            field: field.into(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole pass.
    ///
    /// A blocked disposal only suppresses stray disposal; the rest of the
    /// plan is still valid.
    pub fn is_fatal_to_pass(&self) -> bool {
        !matches!(self, RuleError::DisposalBlocked { .. })
    }

    /// Check if this error is retryable with fresh snapshots.
    pub fn is_retryable(&self) -> bool {
        match self {
            RuleError::Connector(e) => e.is_transient(),
            RuleError::Io(_) => true,
            _ => false,
        }
    }
}

/// Result type for rule engine operations.
pub type RuleResult<T> = Result<T, RuleError>;
