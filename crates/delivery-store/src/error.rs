//! Error types for delivery-store

use std::fmt::Display;

/// Result type for delivery-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by remote store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The addressed object does not exist on the server.
    #[error("{target} not found")]
    NotFound { target: String },

    /// The server answered with a non-success status other than 404.
    #[error("Server returned {status} for {method} {url}: {message}")]
    Status {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid object {target}: {message}")]
    InvalidObject { target: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(target: impl Display) -> Self {
        Self::NotFound {
            target: target.to_string(),
        }
    }

    pub fn invalid(target: impl Display, message: impl Into<String>) -> Self {
        Self::InvalidObject {
            target: target.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error only says the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
