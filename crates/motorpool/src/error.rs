//! Error types for motorpool.
//!
//! Errors fall into three groups: validation failures that are reported
//! before any store call is made, remote failures raised by a repository
//! backend, and local infrastructure failures (configuration, files).

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for motorpool operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    /// A required form field was missing or blank.
    #[error("missing required field: {field}")]
    MissingField {
        /// Name of the field.
        field: &'static str,
    },

    /// The vehicle does not exist in the active project.
    #[error("vehicle not found in current project: {key}")]
    VehicleNotFound {
        /// The id or plate that was looked up.
        key: String,
    },

    /// The requested transition is not legal from the vehicle's state.
    #[error("vehicle {plate} cannot {action}: it is {status}")]
    InvalidTransition {
        /// Plate of the vehicle.
        plate: String,
        /// The attempted action.
        action: &'static str,
        /// The vehicle's current status.
        status: String,
    },

    /// Check-in was attempted with no ongoing trip and the strict policy.
    #[error("no ongoing trip for vehicle {plate}")]
    NoOngoingTrip {
        /// Plate of the vehicle.
        plate: String,
    },

    /// A date or month argument could not be parsed.
    #[error("invalid {what}: {value}")]
    InvalidInput {
        /// What was being parsed.
        what: &'static str,
        /// The offending input.
        value: String,
    },

    // === Remote Store Errors ===
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

    /// An HTTP request to the remote store failed.
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store rejected a write or returned nothing.
    #[error("remote store error: {0}")]
    Remote(String),

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

    // === I/O Errors ===
    /// Writing an export failed.
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

    // === Export Errors ===
    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A specialized Result type for motorpool operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new remote store error.
    #[must_use]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    /// Create a missing field error.
    #[must_use]
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create a vehicle lookup error.
    #[must_use]
    pub fn vehicle_not_found(key: impl Into<String>) -> Self {
        Self::VehicleNotFound { key: key.into() }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(what: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidInput {
            what,
            value: value.into(),
        }
    }

    /// Check if this error was raised before any store call was made.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::VehicleNotFound { .. }
                | Self::InvalidTransition { .. }
                | Self::NoOngoingTrip { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// Check if this error came from the backing store.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
                | Self::Http(_)
                | Self::Remote(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::missing_field("driver");
        assert_eq!(err.to_string(), "missing required field: driver");

        let err = Error::remote("row not found");
        assert_eq!(err.to_string(), "remote store error: row not found");
    }

    #[test]
    fn test_validation_classification() {
        assert!(Error::missing_field("purpose").is_validation());
        assert!(Error::vehicle_not_found("12가1234").is_validation());
        assert!(Error::NoOngoingTrip {
            plate: "12가1234".to_string()
        }
        .is_validation());
        assert!(!Error::remote("down").is_validation());
    }

    #[test]
    fn test_remote_classification() {
        assert!(Error::remote("down").is_remote());
        assert!(!Error::missing_field("location").is_remote());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidTransition {
            plate: "170허8468".to_string(),
            action: "check out",
            status: "in-use".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("170허8468"));
        assert!(msg.contains("check out"));
        assert!(msg.contains("in-use"));
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
            assert!(err.is_remote());
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "store.url is required".to_string(),
        };
        assert!(err.to_string().contains("store.url"));
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
    fn test_invalid_input_display() {
        let err = Error::invalid_input("month", "2024/13");
        assert_eq!(err.to_string(), "invalid month: 2024/13");
        assert!(err.is_validation());
    }
}
