//! Error types for crashalert.
//!
//! This module defines the error type shared by the storage, configuration,
//! and pipeline layers. Delivery problems (missing provider credentials,
//! transport failures, partial batches) are deliberately absent: those are
//! reported as data in delivery outcomes, never as `Error` values.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for crashalert operations.
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

    // === Pipeline Errors ===
    /// Malformed input rejected before it reaches the dispatcher.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// A referenced record does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of record that was looked up.
        resource: &'static str,
        /// Identifier that was looked up.
        id: i64,
    },

    /// An event was applied to the countdown in a state that does not accept it.
    #[error("countdown cannot {event} while {state}")]
    InvalidTransition {
        /// The state the countdown was in.
        state: String,
        /// The rejected event.
        event: String,
    },

    /// An SMS provider client could not be constructed.
    #[error("failed to set up SMS provider '{provider}': {message}")]
    ProviderSetup {
        /// Name of the provider.
        provider: &'static str,
        /// Description of what went wrong.
        message: String,
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

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for crashalert operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a not-found error for the given resource kind.
    #[must_use]
    pub fn not_found(resource: &'static str, id: i64) -> Self {
        Self::NotFound { resource, id }
    }

    /// Create a provider setup error.
    #[must_use]
    pub fn provider_setup(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ProviderSetup {
            provider,
            message: message.into(),
        }
    }

    /// Check if this error is a rejected input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Check if this error indicates a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
