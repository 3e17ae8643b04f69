//! Git repository fixtures built with `git2`.
//!
//! All helpers panic on failure; they are meant for test setup only.

use std::path::Path;

use git2::{IndexAddOption, Repository, Signature};

/// Initialise a real git repository with a test identity configured.
///
/// # Panics
/// Panics if `git2::Repository::init` or the config writes fail.
pub fn init_repo(path: &Path) -> Repository {
    let repo = Repository::init(path).unwrap_or_else(|e| {
        panic!("init_repo: failed to init repository at {}: {e}", path.display())
    });
    {
        let mut config = repo
            .config()
            .unwrap_or_else(|e| panic!("init_repo: failed to open config: {e}"));
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        config.set_bool("commit.gpgsign", false).unwrap();
    }
    repo
}

/// Stage every change in the working tree (additions, modifications and
/// deletions) and commit it on HEAD.
///
/// Returns the new commit id as a full hex string.
///
/// # Panics
/// Panics if any git operation fails.
pub fn commit_all(repo: &Repository, message: &str) -> String {
    let mut index = repo
        .index()
        .unwrap_or_else(|e| panic!("commit_all: failed to open index: {e}"));
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap_or_else(|e| panic!("commit_all: add_all failed: {e}"));
    index
        .update_all(["*"].iter(), None)
        .unwrap_or_else(|e| panic!("commit_all: update_all failed: {e}"));
    index.write().unwrap();

    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("Test User", "test@example.com").unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_all: commit failed: {e}"));
    oid.to_string()
}

/// Current HEAD commit id of the repository at `path`.
///
/// # Panics
/// Panics if the repository cannot be opened or has no commits.
pub fn head_of(path: &Path) -> String {
    let repo = Repository::open(path).unwrap();
    repo.head().unwrap().peel_to_commit().unwrap().id().to_string()
}
