//! Error types for delivery-core

use std::path::PathBuf;

/// Result type for delivery-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a delivery pass
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A local artifact could not be turned into a remote object
    #[error("Invalid artifact at {path}: {message}")]
    LocalArtifact { path: PathBuf, message: String },

    /// A lifecycle hook exited non-zero or could not be started
    #[error("Hook '{command}' failed on {event}: {message}")]
    HookFailed {
        event: String,
        command: String,
        message: String,
    },

    /// No checkout exists and there is nothing to clone it from
    #[error("No repo URL was specified, and no repo is checked out at {path}")]
    NoRepository { path: PathBuf },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from delivery-fs
    #[error(transparent)]
    Fs(#[from] delivery_fs::Error),

    /// Repository error from delivery-git
    #[error(transparent)]
    Git(#[from] delivery_git::Error),

    /// Remote store error from delivery-store
    #[error(transparent)]
    Store(#[from] delivery_store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LocalArtifact {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the pass failed because a revision did not resolve.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Git(e) if e.is_reference())
    }
}
