//! Version control provider trait

use crate::Result;
use delivery_fs::NormalizedPath;

/// How a single path differs between two revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStatus {
    /// Present only at the newer revision
    Added,
    /// Present at both revisions with different content or type
    Modified,
    /// Present only at the older revision
    Deleted,
}

/// A changed path, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathChange {
    pub path: NormalizedPath,
    pub status: PathStatus,
}

impl PathChange {
    pub fn new(path: impl Into<NormalizedPath>, status: PathStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// Trait for the version control operations a delivery pass relies on.
///
/// Revisions are opaque strings; implementations decide how to resolve them.
pub trait VcsProvider {
    /// Whether a checkout exists at the configured location.
    fn exists(&self) -> bool;

    /// The revision currently checked out.
    fn head_revision(&self) -> Result<String>;

    /// Bring the existing checkout up to date with its upstream.
    fn update(&self) -> Result<()>;

    /// Create the checkout by cloning `url`.
    fn checkout(&self, url: &str) -> Result<()>;

    /// Paths that differ between `old` and `new`, restricted to `dirs`
    /// (repository-relative directories; empty means the whole tree).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Reference`](crate::Error::Reference) when either
    /// revision does not resolve.
    fn changed_paths(&self, old: &str, new: &str, dirs: &[String]) -> Result<Vec<PathChange>>;

    /// Whether `path` is a directory in the tree at `rev`. A plain file at
    /// `path` does not count.
    fn dir_exists_at(&self, rev: &str, path: &str) -> Result<bool>;
}
