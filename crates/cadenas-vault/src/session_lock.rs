//! Exclusive advisory lock on a vault directory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::VaultError;

/// Lock file name inside the vault directory.
pub const LOCK_FILE: &str = "vault.lock";

/// Held for as long as a [`crate::VaultEngine`] has the directory open.
/// The OS releases the lock when the guard drops or the process dies.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock without blocking.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Busy`] if another session holds it
    /// - [`VaultError::Io`] if the lock file cannot be opened
    pub fn acquire(vault_dir: &Path) -> Result<Self, VaultError> {
        let path = vault_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
                {
                    return Err(VaultError::Busy(format!(
                        "{} is held by another session",
                        path.display()
                    )));
                }
                Err(err) => return Err(VaultError::Io(err)),
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock too; unlock explicitly anyway.
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_busy() {
        let dir = TempDir::new().unwrap();
        let _held = SessionLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            SessionLock::acquire(dir.path()),
            Err(VaultError::Busy(_))
        ));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        drop(SessionLock::acquire(dir.path()).unwrap());
        let again = SessionLock::acquire(dir.path()).unwrap();
        assert!(again.path().ends_with(LOCK_FILE));
    }
}
