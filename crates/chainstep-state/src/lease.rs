//! Exclusive per-environment run lease.
//!
//! The lease is a lock file created with `create_new`; it is removed when the
//! guard is dropped. A process killed while holding it leaves the file behind
//! and the operator removes it by hand.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{Result, StateError};

/// Guard for an acquired environment lease.
#[derive(Debug)]
pub struct LedgerLease {
    path: PathBuf,
}

impl LedgerLease {
    pub(crate) fn acquire(environment: &str, path: PathBuf) -> Result<Self> {
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StateError::LeaseHeld {
                    environment: environment.to_string(),
                    path,
                });
            }
            Err(e) => return Err(StateError::io(&path, e)),
        };

        writeln!(
            file,
            "pid={} acquired_at={}",
            std::process::id(),
            Utc::now().to_rfc3339()
        )
        .map_err(|e| StateError::io(&path, e))?;

        debug!(path = %path.display(), "Acquired environment lease");
        Ok(Self { path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLease {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release environment lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::FileLedgerStore;
    use crate::StateError;
    use chainstep_types::Environment;

    #[test]
    fn test_lease_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());
        let env = Environment::new("mainnet", 1);

        let lease = store.acquire_lease(&env).unwrap();
        assert!(lease.path().exists());
        assert!(matches!(
            store.acquire_lease(&env),
            Err(StateError::LeaseHeld { .. })
        ));

        drop(lease);
        assert!(store.acquire_lease(&env).is_ok());
    }

    #[test]
    fn test_leases_are_per_environment() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());
        let _a = store.acquire_lease(&Environment::new("mainnet", 1)).unwrap();
        let _b = store.acquire_lease(&Environment::new("polygon", 137)).unwrap();
    }
}
