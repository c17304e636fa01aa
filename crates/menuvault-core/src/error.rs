//! Error types for the Menuvault maintenance pipeline.
//!
//! Connection-level failures are fatal and abort a run. Every other kind is
//! caught at the narrowest scope (per asset, per index, per check) and
//! recorded in the run's report.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Menuvault library.
#[derive(Debug, Error)]
pub enum MenuvaultError {
    // Store connectivity
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Asset transfer errors
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Upload failed for {locator}: {message}")]
    Transfer { locator: String, message: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    // Maintenance errors
    #[error("Index {name} on {collection} could not be created: {message}")]
    IndexCreation {
        collection: String,
        name: String,
        message: String,
    },

    #[error("Integrity check {check} failed: {message}")]
    IntegrityCheck { check: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },
}

/// Result type alias for Menuvault operations.
pub type Result<T> = std::result::Result<T, MenuvaultError>;

impl From<std::io::Error> for MenuvaultError {
    fn from(err: std::io::Error) -> Self {
        MenuvaultError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MenuvaultError {
    fn from(err: serde_json::Error) -> Self {
        MenuvaultError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for MenuvaultError {
    fn from(err: rusqlite::Error) -> Self {
        MenuvaultError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for MenuvaultError {
    fn from(err: reqwest::Error) -> Self {
        MenuvaultError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MenuvaultError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MenuvaultError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a database error from a message alone (lock poisoning, join failures).
    pub fn database(message: impl Into<String>) -> Self {
        MenuvaultError::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MenuvaultError::Connection { .. } | MenuvaultError::Config { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MenuvaultError::FileNotFound(PathBuf::from("/srv/uploads/menus/a.jpg"));
        assert_eq!(err.to_string(), "File not found: /srv/uploads/menus/a.jpg");

        let err = MenuvaultError::IndexCreation {
            collection: "menus".into(),
            name: "menus_restaurant".into(),
            message: "definition differs".into(),
        };
        assert_eq!(
            err.to_string(),
            "Index menus_restaurant on menus could not be created: definition differs"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(MenuvaultError::Connection {
            message: "unable to open".into(),
            source: None,
        }
        .is_fatal());
        assert!(!MenuvaultError::Transfer {
            locator: "/uploads/a.jpg".into(),
            message: "502".into(),
        }
        .is_fatal());
        assert!(!MenuvaultError::FileNotFound(PathBuf::from("a.jpg")).is_fatal());
    }

    #[test]
    fn test_io_conversion_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = MenuvaultError::io_with_path(io, "/tmp/x");
        assert!(matches!(err, MenuvaultError::Io { path: Some(_), .. }));
    }
}
