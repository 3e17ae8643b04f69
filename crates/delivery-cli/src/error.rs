//! Error types for delivery-cli

use std::path::PathBuf;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that stop the CLI before or around a pass
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] delivery_core::Error),

    #[error(transparent)]
    Fs(#[from] delivery_fs::Error),

    #[error(transparent)]
    Store(#[from] delivery_store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A config file named on the command line does not exist
    #[error("Config file {} not found", path.display())]
    ConfigMissing { path: PathBuf },

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigMissing { .. } => 2,
            _ => 1,
        }
    }
}
