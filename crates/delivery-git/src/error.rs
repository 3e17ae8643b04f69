//! Error types for delivery-git

use std::path::PathBuf;

/// Result type for delivery-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in delivery-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] delivery_fs::Error),

    /// A revision that does not resolve to a commit, e.g. a checkpoint
    /// left behind by rewritten or pruned history.
    #[error("Revision '{rev}' does not resolve to a commit in this repository")]
    Reference { rev: String },

    #[error("No repository checked out at {path}")]
    RepositoryNotFound { path: PathBuf },

    #[error("HEAD is detached; cannot determine the branch to update")]
    DetachedHead,

    #[error("Remote '{name}' not found")]
    RemoteNotFound { name: String },

    #[error("Fetch failed: {message}")]
    FetchFailed { message: String },

    #[error("Cannot fast-forward: {message}")]
    CannotFastForward { message: String },
}

impl Error {
    /// Whether this error means a revision is unknown to the repository.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference { .. })
    }
}
