//! # Error Handling
//!
//! Error taxonomy for gcredstash operations, built with `thiserror`.
//!
//! The first four variants are the ones callers branch on:
//! - [`VaultError::InvalidArgument`] is raised locally before any remote call
//! - [`VaultError::ResourceConflict`] is a keyring or key that already exists
//! - [`VaultError::RemoteServiceFailure`] is any failure reported by (or while
//!   talking to) Cloud KMS, Cloud Datastore or the OAuth2 token endpoint
//! - [`VaultError::NotFound`] is a credential with no cipher record

use std::fmt;

/// Custom result type for gcredstash operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// External service an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteService {
    KeyManagement,
    DocumentStore,
    Auth,
}

impl RemoteService {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyManagement => "kms",
            Self::DocumentStore => "datastore",
            Self::Auth => "auth",
        }
    }
}

impl fmt::Display for RemoteService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for gcredstash
#[derive(thiserror::Error, Debug)]
pub enum VaultError {
    /// An argument failed its required shape
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// A keyring or crypto key with the requested id already exists
    #[error("Resource conflict: {resource} already exists")]
    ResourceConflict { resource: String },

    /// Network, permission, quota or protocol failure of an external service
    #[error("{service} request failed{}: {message}", .status.map(|s| format!(" (status {})", s)).unwrap_or_default())]
    RemoteServiceFailure { service: RemoteService, status: Option<u16>, message: String },

    /// No cipher record exists for the credential
    #[error("Credential '{name}' not found in collection '{collection}'")]
    NotFound { collection: String, name: String },

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Some entries of a batch operation failed
    #[error("{} of {total} credentials failed: {}", .failed.len(), .failed.join(", "))]
    BatchIncomplete { failed: Vec<String>, total: usize },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Create an invalid argument error
    pub fn invalid_argument<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::InvalidArgument { field: field.into(), reason: reason.into() }
    }

    /// Create a resource conflict error
    pub fn conflict<S: Into<String>>(resource: S) -> Self {
        Self::ResourceConflict { resource: resource.into() }
    }

    /// Create a remote service failure
    pub fn remote<S: Into<String>>(service: RemoteService, status: Option<u16>, message: S) -> Self {
        Self::RemoteServiceFailure { service, status, message: message.into() }
    }

    /// Create a not found error
    pub fn not_found<C: Into<String>, N: Into<String>>(collection: C, name: N) -> Self {
        Self::NotFound { collection: collection.into(), name: name.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Stable label for the error kind, printed by the CLI
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::ResourceConflict { .. } => "resource_conflict",
            Self::RemoteServiceFailure { .. } => "remote_service_failure",
            Self::NotFound { .. } => "not_found",
            Self::Config(_) => "config",
            Self::BatchIncomplete { .. } => "batch_incomplete",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status reported by a remote service, if any
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Self::RemoteServiceFailure { status, .. } => *status,
            _ => None,
        }
    }
}
