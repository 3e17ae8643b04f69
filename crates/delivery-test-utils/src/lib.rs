//! Shared test utilities for the config-delivery workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`git`]: real git repositories and commit helpers
//! - [`repo`]: [`TestRepo`](repo::TestRepo) builder for artifact trees under version control

pub mod git;
pub mod repo;
