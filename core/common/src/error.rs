//! Common error types for drivetool.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Top-level error type for drivetool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Application identity (client secrets) missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Grant unusable after refresh, or the interactive flow failed.
    #[error("Authorization failed: {0}")]
    Authentication(String),

    /// Local file or remote object not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connectivity or timeout talking to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse classification of an [`Error`], reported to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[serde(rename = "configuration_error")]
    Configuration,
    #[serde(rename = "auth_failure")]
    Auth,
    NotFound,
    #[serde(rename = "transient_network_error")]
    TransientNetwork,
    #[serde(rename = "io_failure")]
    Io,
    InvalidArgument,
}

impl Error {
    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Authentication(_) => ErrorKind::Auth,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Network(_) => ErrorKind::TransientNetwork,
            Error::Io(_) | Error::Serialization(_) => ErrorKind::Io,
            Error::InvalidInput(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

impl ErrorKind {
    /// Stable identifier used in structured failures.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Auth => "auth_failure",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransientNetwork => "transient_network_error",
            ErrorKind::Io => "io_failure",
            ErrorKind::InvalidArgument => "invalid_argument",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
