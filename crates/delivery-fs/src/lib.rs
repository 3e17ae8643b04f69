//! Filesystem helpers for config delivery
//!
//! Provides normalized path handling, atomic locked writes (used for the
//! revision checkpoint and pid file), format-agnostic configuration loading
//! and content checksums for packaged units.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use path::NormalizedPath;
