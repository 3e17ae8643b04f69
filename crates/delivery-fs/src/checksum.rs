//! SHA-256 checksum utilities
//!
//! Packaged units are uploaded with a per-file checksum in the canonical
//! `sha256:<hex>` format so the remote side can detect unchanged files.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::{Error, Result};

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the SHA-256 checksum of raw bytes.
pub fn compute_bytes_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Read a file and return its contents together with their checksum.
pub fn read_with_checksum(path: &Path) -> Result<(Vec<u8>, String)> {
    let content = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let checksum = compute_bytes_checksum(&content);
    Ok((content, checksum))
}
