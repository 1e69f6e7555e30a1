//! Core error types for fragtime-core.
//!
//! This module defines the error hierarchy using thiserror. Not-found is
//! not an error here: adapters report it as `None` or `false`.

use std::path::PathBuf;
use thiserror::Error;

/// PostgREST code for "the single-row request matched zero rows".
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Core error type for fragtime-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A remote operation needs a signed-in user and there is none.
    #[error("Not authenticated: sign in before accessing remote data")]
    NotAuthenticated,

    /// Remote backend rejected the request
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Local persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authentication collaborator errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Error returned by a remote table backend.
///
/// `code` carries the backend's own error code when it sent one, so callers
/// can tell "no rows" apart from real failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn no_rows() -> Self {
        Self::with_code(NO_ROWS_CODE, "JSON object requested, multiple (or no) rows returned")
    }

    /// True when a single-row request found nothing.
    pub fn is_no_rows(&self) -> bool {
        self.code.as_deref() == Some(NO_ROWS_CODE)
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::new(format!("request failed: {err}"))
    }
}

/// Local key-value storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Could not resolve or create the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Backend URL or key missing
    #[error("Backend is not configured: set backend.url and backend.anon_key")]
    BackendNotConfigured,
}

/// Authentication collaborator errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Sign-in was rejected
    #[error("Sign-in failed: {0}")]
    SignInFailed(String),

    /// Sign-up was rejected
    #[error("Sign-up failed: {0}")]
    SignUpFailed(String),

    /// Sign-out was rejected
    #[error("Sign-out failed: {0}")]
    SignOutFailed(String),

    /// Transport-level failure
    #[error("Auth request failed: {0}")]
    Request(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Unknown enum label
    #[error("Unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
