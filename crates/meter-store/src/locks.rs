//! Per-file locks serializing read-modify-write cycles.
//!
//! Two layers: an async mutex per path orders tasks inside one process, and
//! an exclusive advisory lock on a sibling `.<name>.lock` file orders store
//! handles and processes sharing the same root.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use fs4::fs_std::FileExt;
use meter_core::{MeterError, Result};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock table keyed by file path.
///
/// Cycles on the same path run one at a time; different paths never contend.
/// Entries are dropped once no task holds or awaits them. Lock files stay on
/// disk.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    inner: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, key: &Path) -> Result<KeyedGuard<'_>> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key.to_path_buf()).or_default())
        };
        let guard = mutex.lock_owned().await;

        // Built before the file lock so a failure still prunes the entry.
        let mut keyed = KeyedGuard {
            locks: self,
            key: key.to_path_buf(),
            file: None,
            guard: Some(guard),
        };
        keyed.file = Some(lock_file(lock_path(key)).await?);
        Ok(keyed)
    }

    fn release(&self, key: &Path) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mutex) = map.get(key)
            && Arc::strong_count(mutex) == 1
        {
            map.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of one read-modify-write cycle.
pub(crate) struct KeyedGuard<'a> {
    locks: &'a KeyedLocks,
    key: PathBuf,
    file: Option<File>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Closing the descriptor releases the advisory lock.
        self.file.take();
        // Unlock before pruning so the entry's refcount reflects only waiters.
        self.guard.take();
        self.locks.release(&self.key);
    }
}

/// `<dir>/.<name>.lock` next to the guarded file.
pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.lock"))
}

/// Open (creating if needed) and exclusively lock `path`.
///
/// The blocking wait runs on the blocking pool.
async fn lock_file(path: PathBuf) -> Result<File> {
    tokio::task::spawn_blocking(move || -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| MeterError::io("opening lock file", &path, e))?;
        file.lock_exclusive()
            .map_err(|e| MeterError::io("locking", &path, e))?;
        Ok(file)
    })
    .await
    .map_err(|e| MeterError::internal(format!("lock task failed: {e}")))?
}
