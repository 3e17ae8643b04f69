//! `git2`-backed implementation of [`VcsProvider`]

use std::path::Path;

use delivery_fs::NormalizedPath;
use git2::{Commit, Delta, DiffOptions, ErrorCode, ObjectType, Repository};

use crate::provider::{PathChange, PathStatus, VcsProvider};
use crate::{Error, Result};

/// A git checkout holding the configuration artifacts.
///
/// The repository is opened on demand so that `exists()` and `checkout()`
/// work before anything is on disk.
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: NormalizedPath,
    remote: String,
}

impl GitRepository {
    /// Repository rooted at `root`, tracking the `origin` remote.
    pub fn new(root: NormalizedPath) -> Self {
        Self {
            root,
            remote: "origin".to_string(),
        }
    }

    /// Track a remote other than `origin`.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    fn open(&self) -> Result<Repository> {
        Repository::open(self.root.to_native()).map_err(|e| {
            tracing::debug!(path = %self.root, error = %e, "Failed to open repository");
            Error::RepositoryNotFound {
                path: self.root.to_native(),
            }
        })
    }
}

/// Resolve any revision expression to a commit.
fn resolve_commit<'r>(repo: &'r Repository, rev: &str) -> Result<Commit<'r>> {
    repo.revparse_single(rev)
        .and_then(|obj| obj.peel_to_commit())
        .map_err(|_| Error::Reference {
            rev: rev.to_string(),
        })
}

impl VcsProvider for GitRepository {
    fn exists(&self) -> bool {
        Repository::open(self.root.to_native()).is_ok()
    }

    fn head_revision(&self) -> Result<String> {
        let repo = self.open()?;
        let commit = repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn update(&self) -> Result<()> {
        let repo = self.open()?;
        let head = repo.head()?;
        if !head.is_branch() {
            return Err(Error::DetachedHead);
        }
        let branch = head.shorthand().ok_or(Error::DetachedHead)?.to_string();

        let mut remote = repo
            .find_remote(&self.remote)
            .map_err(|_| Error::RemoteNotFound {
                name: self.remote.clone(),
            })?;

        tracing::debug!(remote = %self.remote, branch = %branch, "Fetching");
        remote
            .fetch(&[&branch], None, None)
            .map_err(|e| Error::FetchFailed {
                message: e.message().to_string(),
            })?;

        let fetch_head = repo
            .find_reference("FETCH_HEAD")
            .map_err(|e| Error::FetchFailed {
                message: format!("Could not find FETCH_HEAD: {}", e.message()),
            })?;
        let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;

        let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            tracing::debug!(branch = %branch, "Already up to date");
            return Ok(());
        }

        if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{branch}");
            let mut reference = repo.find_reference(&refname)?;
            reference.set_target(
                fetch_commit.id(),
                &format!("delivery: fast-forward to {}", fetch_commit.id()),
            )?;
            repo.set_head(&refname)?;
            repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
            tracing::info!(branch = %branch, rev = %fetch_commit.id(), "Fast-forwarded checkout");
            return Ok(());
        }

        let head_id = head.peel_to_commit()?.id();
        Err(Error::CannotFastForward {
            message: format!(
                "{branch} at {head_id} has diverged from {}; manual merge required",
                fetch_commit.id()
            ),
        })
    }

    fn checkout(&self, url: &str) -> Result<()> {
        tracing::info!(url = %url, path = %self.root, "Cloning repository");
        Repository::clone(url, self.root.to_native())?;
        Ok(())
    }

    fn changed_paths(&self, old: &str, new: &str, dirs: &[String]) -> Result<Vec<PathChange>> {
        let repo = self.open()?;
        let old_tree = resolve_commit(&repo, old)?.tree()?;
        let new_tree = resolve_commit(&repo, new)?.tree()?;

        let mut opts = DiffOptions::new();
        for dir in dirs {
            opts.pathspec(dir.trim_end_matches('/'));
        }

        let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let old_path = delta.old_file().path().map(NormalizedPath::new);
            let new_path = delta.new_file().path().map(NormalizedPath::new);

            match (delta.status(), old_path, new_path) {
                (Delta::Added | Delta::Copied, _, Some(path)) => {
                    changes.push(PathChange::new(path, PathStatus::Added));
                }
                (Delta::Deleted, Some(path), _) => {
                    changes.push(PathChange::new(path, PathStatus::Deleted));
                }
                (Delta::Modified | Delta::Typechange, _, Some(path)) => {
                    changes.push(PathChange::new(path, PathStatus::Modified));
                }
                (Delta::Renamed, Some(from), Some(to)) => {
                    changes.push(PathChange::new(from, PathStatus::Deleted));
                    changes.push(PathChange::new(to, PathStatus::Added));
                }
                (status, _, _) => {
                    tracing::debug!(?status, "Ignoring diff delta");
                }
            }
        }

        tracing::debug!(old = %old, new = %new, count = changes.len(), "Computed changed paths");
        Ok(changes)
    }

    fn dir_exists_at(&self, rev: &str, path: &str) -> Result<bool> {
        let repo = self.open()?;
        let tree = resolve_commit(&repo, rev)?.tree()?;
        match tree.get_path(Path::new(path.trim_end_matches('/'))) {
            Ok(entry) => Ok(entry.kind() == Some(ObjectType::Tree)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
