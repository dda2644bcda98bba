//! Error types for meter operations.
//!
//! This module defines [`MeterError`], the error enum shared by the store,
//! configuration and binary crates. Absence of data is never an error here:
//! only genuine I/O, parse and validation failures are represented.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeterError`].
pub type Result<T> = std::result::Result<T, MeterError>;

/// Error type for all meter operations.
///
/// - No automatic retry - the caller decides if/when to retry
/// - No silent failures - write errors always propagate
#[derive(Debug, Error)]
pub enum MeterError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// JSON parsing or serialization error
    #[error("JSON parse error in {context}: {message}")]
    JsonParse {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // =========================================================================
    // Key Errors
    // =========================================================================
    /// Execution id or other storage key cannot be used as a file name
    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Record timestamp cannot be mapped to a calendar day
    #[error("Invalid timestamp {timestamp}: cannot derive a calendar day")]
    InvalidTimestamp { timestamp: i64 },

    /// Date string is not `YYYY-MM-DD`
    #[error("Invalid date {value:?}: expected YYYY-MM-DD")]
    InvalidDate { value: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in meter)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MeterError {
    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error
    pub fn json_parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an invalid key error
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns true if this error came from the file system
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::DirectoryCreation { .. })
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Create ~/.meter/config.yaml or pass --config with an explicit path")
            }
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in the configuration file"),
            Self::Io { source, .. } | Self::DirectoryCreation { source, .. } => {
                match source.kind() {
                    std::io::ErrorKind::PermissionDenied => {
                        Some("Check permissions on the metrics directory")
                    }
                    std::io::ErrorKind::StorageFull => Some("Free disk space and retry the write"),
                    _ => None,
                }
            }
            Self::JsonParse { .. } => {
                Some("A metrics file is not valid JSON; inspect or move it aside")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_error() {
        let err = MeterError::ConfigNotFound {
            path: PathBuf::from("/home/user/.meter/config.yaml"),
            source: None,
        };
        assert!(err.to_string().contains("Configuration not found"));
        assert!(err.is_config_error());
        assert!(!err.is_io_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_io_error_guidance() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = MeterError::io("writing", "/metrics/daily/2025-01-01.json", source);
        assert!(err.is_io_error());
        assert_eq!(err.guidance(), Some("Check permissions on the metrics directory"));
        assert!(err.to_string().contains("2025-01-01.json"));
    }

    #[test]
    fn test_invalid_key_message() {
        let err = MeterError::invalid_key("../etc", "contains a path separator");
        assert!(err.to_string().contains("../etc"));
        assert!(err.guidance().is_none());
    }
}
