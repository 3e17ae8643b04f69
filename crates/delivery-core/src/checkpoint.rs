//! Persisted checkpoint: the last revision fully delivered

use delivery_fs::{NormalizedPath, io};

use crate::Result;

/// A single revision id kept in a text file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: NormalizedPath,
}

impl CheckpointStore {
    pub fn new(path: NormalizedPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    /// The stored revision. A missing or blank file means none.
    pub fn read(&self) -> Result<Option<String>> {
        tracing::debug!("Reading {}", self.path);
        let content = io::read_text_if_exists(&self.path)?;
        Ok(content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    }

    pub fn write(&self, revision: &str) -> Result<()> {
        io::write_text(&self.path, revision)?;
        tracing::debug!("Checkpoint {} written to {}", revision, self.path);
        Ok(())
    }
}
