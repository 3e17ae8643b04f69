//! Git access for config delivery
//!
//! The sync engine only needs a narrow view of version control: the head
//! revision, a way to refresh the checkout, and the list of paths that
//! changed between two revisions. [`VcsProvider`] captures that view and
//! [`GitRepository`] implements it with `git2`.

pub mod error;
pub mod provider;
pub mod repository;

pub use error::{Error, Result};
pub use provider::{PathChange, PathStatus, VcsProvider};
pub use repository::GitRepository;
