//! Error types for tallyscan.
//!
//! This module defines all error types used throughout the tallyscan crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tallyscan operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A transaction with the given id does not exist.
    #[error("transaction {id} not found")]
    TransactionNotFound {
        /// The missing transaction id.
        id: i64,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Domain Errors ===
    /// A transaction or receipt failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// Description of the validation failure.
        message: String,
    },

    /// An amount string could not be parsed.
    #[error("invalid amount '{input}'")]
    InvalidAmount {
        /// The rejected input.
        input: String,
    },

    /// An unknown setting key was used.
    #[error("unknown setting '{key}'")]
    UnknownSetting {
        /// The rejected key.
        key: String,
    },

    // === Scan Errors ===
    /// A receipt image could not be scanned.
    #[error("failed to scan receipt '{name}': {message}")]
    Scan {
        /// Name of the receipt image.
        name: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The image is already part of the current batch.
    #[error("receipt image '{name}' is already in the batch")]
    DuplicateImage {
        /// Name of the duplicated image.
        name: String,
    },

    /// The batch cannot hold more images.
    #[error("batch is full ({limit} images)")]
    BatchFull {
        /// Configured batch size limit.
        limit: usize,
    },

    /// A batch operation was attempted in the wrong phase.
    #[error("cannot {operation} while batch is {phase}")]
    InvalidPhase {
        /// What was attempted.
        operation: &'static str,
        /// The current phase.
        phase: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for tallyscan operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a validation error for the given field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a scan error for the named image.
    #[must_use]
    pub fn scan(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scan {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid phase error.
    #[must_use]
    pub fn invalid_phase(operation: &'static str, phase: impl std::fmt::Display) -> Self {
        Self::InvalidPhase {
            operation,
            phase: phase.to_string(),
        }
    }

    /// Check if this error means a record was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TransactionNotFound { .. })
    }

    /// Check if this error came from user input rather than the system.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidAmount { .. }
                | Self::UnknownSetting { .. }
                | Self::DuplicateImage { .. }
                | Self::BatchFull { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TransactionNotFound { id: 7 };
        assert_eq!(err.to_string(), "transaction 7 not found");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_error_is_not_found() {
        assert!(Error::TransactionNotFound { id: 1 }.is_not_found());
        assert!(!Error::internal("test").is_not_found());
    }

    #[test]
    fn test_error_is_user_error() {
        assert!(Error::validation("merchant", "must not be blank").is_user_error());
        assert!(Error::BatchFull { limit: 10 }.is_user_error());
        assert!(!Error::internal("boom").is_user_error());
    }

    #[test]
    fn test_validation_error_display() {
        let err = Error::validation("currency", "expected a 3-letter code");
        assert_eq!(
            err.to_string(),
            "invalid currency: expected a 3-letter code"
        );
    }

    #[test]
    fn test_scan_error_display() {
        let err = Error::scan("lunch.txt", "not UTF-8");
        let msg = err.to_string();
        assert!(msg.contains("lunch.txt"));
        assert!(msg.contains("not UTF-8"));
    }

    #[test]
    fn test_invalid_phase_display() {
        let err = Error::invalid_phase("add images", "processing");
        assert_eq!(err.to_string(), "cannot add images while batch is processing");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }

    #[test]
    fn test_duplicate_image_display() {
        let err = Error::DuplicateImage {
            name: "a.txt".to_string(),
        };
        assert!(err.to_string().contains("a.txt"));
    }
}
