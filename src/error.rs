//! Error types for Voice Journal
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Voice Journal operations
///
/// This enum covers every failure the journaling flows can hit: backend
/// and AI API calls, local storage, device access, authentication and
/// input validation.
#[derive(Error, Debug)]
pub enum JournalError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A device permission (microphone) was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A remote API answered with a non-success status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code returned by the remote service
        status: u16,
        /// Response body or error description
        message: String,
    },

    /// A requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// User input failed validation
    #[error("{0}")]
    Validation(String),

    /// An operation required a signed-in user
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// Authentication errors (bad credentials, unconfirmed email, ...)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Local storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Realtime subscription errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Recording, playback or speech device errors
    #[error("Device error: {0}")]
    Device(String),

    /// AI provider errors (malformed or empty responses)
    #[error("Provider error: {0}")]
    Provider(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for Voice Journal operations
///
/// Uses `anyhow::Error` so call sites can attach context; callers that need
/// the error kind use `downcast_ref::<JournalError>()`.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`JournalError`] carried by an `anyhow::Error`, if any
pub fn kind_of(error: &anyhow::Error) -> Option<&JournalError> {
    error.downcast_ref::<JournalError>()
}
