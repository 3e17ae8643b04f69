//! Process lock and pid file

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::Result;

/// Exclusive advisory lock held for the lifetime of the guard.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Block until the lock at `path` is ours.
    pub fn acquire(path: &Path) -> Result<Self> {
        tracing::warn!("Attempting to acquire lock");
        if let Some(guard) = Self::try_acquire(path)? {
            tracing::warn!("Lock acquired");
            return Ok(guard);
        }

        tracing::warn!("Lock {} is held by another run, waiting", path.display());
        let file = open_lockfile(path)?;
        file.lock_exclusive()?;
        tracing::warn!("Lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lockfile(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }
}

fn open_lockfile(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Write the current process id to `path`.
pub fn write_pidfile(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, std::process::id().to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_lock_is_refused_until_released() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");

        let guard = LockGuard::acquire(&path).unwrap();
        assert!(LockGuard::try_acquire(&path).unwrap().is_none());

        drop(guard);
        assert!(LockGuard::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn acquire_waits_for_the_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locks/delivery.lock");
        let held = LockGuard::acquire(&path).unwrap();

        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || LockGuard::acquire(&waiter_path).is_ok());
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn pidfile_holds_our_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run/delivery.pid");
        write_pidfile(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }
}
