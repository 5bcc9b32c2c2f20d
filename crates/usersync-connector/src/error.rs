//! Connector error types
//!
//! [`ConnectorError`] is the vocabulary shared by the bundled backends and
//! external [`TargetClient`](crate::TargetClient) implementations. The
//! executor retries only the transient variants (timeout, throttling,
//! network); everything else fails the op. [`RecordError`] quarantines
//! malformed directory rows.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error that can occur while talking to a directory source or target system.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Transient
    /// Request to the remote system timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Remote system is temporarily unavailable (throttled, maintenance).
    #[error("target system unavailable: {message}")]
    TargetUnavailable { message: String },

    /// Network error during communication.
    #[error("network error: {message}")]
    NetworkError { message: String },

    // Permanent
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Target instance is not known to the client.
    #[error("unknown target instance: {instance}")]
    UnknownInstance { instance: String },

    /// The target system refused the operation.
    #[error("operation failed: {message}")]
    OperationFailed { message: String },

    /// Identity already exists in the target system (create conflict).
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Identity not found in the target system (update/remove target missing).
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Invalid data format.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Reading a local source failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A tabular source could not be parsed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ConnectorError {
    /// Whether the op may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::TargetUnavailable { .. }
                | ConnectorError::NetworkError { .. }
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::NetworkError { .. } => "NETWORK_ERROR",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::UnknownInstance { .. } => "UNKNOWN_INSTANCE",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::Io(_) => "IO_ERROR",
            ConnectorError::Csv(_) => "CSV_ERROR",
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
        }
    }

    /// Create an unknown instance error.
    pub fn unknown_instance(instance: impl std::fmt::Display) -> Self {
        ConnectorError::UnknownInstance {
            instance: instance.to_string(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// A directory row that failed validation and was quarantined.
///
/// These never abort a pass; they are logged and reported.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}record rejected on field '{field}': {message}", line_number.map(|l| format!("line {l}: ")).unwrap_or_default())]
pub struct RecordError {
    /// 1-based line number in the source (header = 1), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    /// Best-effort identifier of the rejected row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Offending field.
    pub field: String,
    /// What was wrong with it.
    pub message: String,
}

impl RecordError {
    /// Create a record error for a field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            line_number: None,
            identifier: None,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach the source line number.
    #[must_use]
    pub fn at_line(mut self, line_number: Option<usize>) -> Self {
        self.line_number = line_number;
        self
    }

    /// Attach an identifier for the rejected row.
    #[must_use]
    pub fn for_identifier(mut self, identifier: Option<String>) -> Self {
        self.identifier = identifier;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            ConnectorError::ConnectionTimeout { timeout_secs: 30 },
            ConnectorError::TargetUnavailable {
                message: "throttled".to_string(),
            },
            ConnectorError::network("test"),
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
            assert!(!err.is_permanent());
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            ConnectorError::AuthenticationFailed,
            ConnectorError::operation_failed("quota exceeded"),
            ConnectorError::ObjectAlreadyExists {
                identifier: "test".to_string(),
            },
            ConnectorError::ObjectNotFound {
                identifier: "test".to_string(),
            },
            ConnectorError::unknown_instance("secondary"),
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ConnectorError::AuthenticationFailed.error_code(),
            "AUTH_FAILED"
        );
        assert_eq!(
            ConnectorError::operation_failed("test").error_code(),
            "OPERATION_FAILED"
        );
        let io = ConnectorError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::ConnectionTimeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "connection timeout after 30 seconds");

        let err = ConnectorError::unknown_instance("secondary");
        assert_eq!(err.to_string(), "unknown target instance: secondary");
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = ConnectorError::from(std::io::Error::new(std::io::ErrorKind::Other, "underlying error"));

        assert!(err.is_permanent());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_record_error_display() {
        let err = RecordError::new("username", "missing username and email").at_line(Some(4));
        assert_eq!(
            err.to_string(),
            "line 4: record rejected on field 'username': missing username and email"
        );

        let err = RecordError::new("type", "unknown identity type");
        assert_eq!(
            err.to_string(),
            "record rejected on field 'type': unknown identity type"
        );
    }
}
