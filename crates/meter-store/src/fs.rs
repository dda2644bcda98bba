//! File helpers: atomic JSON replacement and tolerant reads.
//!
//! Writes go to a hidden sibling temp file (`.<name>.<uuid>.tmp`), are
//! fsynced, then renamed over the target. A reader sees either the previous
//! complete file or the new complete file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use meter_core::{MeterError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

const JSON_EXTENSION: &str = "json";

/// Read and parse a JSON file, returning `T::default()` when it does not exist.
pub(crate) async fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| MeterError::json_parse(path.display().to_string(), e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(MeterError::io("reading", path, e)),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub(crate) async fn write_json_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| MeterError::json_parse(path.display().to_string(), e))?;

    let tmp = temp_path(path);
    let result = write_then_rename(&tmp, path, &json).await;
    if result.is_err() {
        // The rename never happened; the target still holds its prior state.
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp)
        .await
        .map_err(|e| MeterError::io("creating temp file", tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| MeterError::io("writing temp file", tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| MeterError::io("syncing temp file", tmp, e))?;
    drop(file);

    tokio::fs::rename(tmp, path)
        .await
        .map_err(|e| MeterError::io("renaming temp file into", path, e))?;

    sync_parent_dir(path).await;
    Ok(())
}

/// Make the rename itself durable.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    match tokio::fs::File::open(parent).await {
        Ok(dir) => {
            if let Err(e) = dir.sync_all().await {
                debug!(dir = %parent.display(), error = %e, "directory fsync failed");
            }
        }
        Err(e) => debug!(dir = %parent.display(), error = %e, "cannot open directory for fsync"),
    }
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) {}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

/// Create a directory and its parents.
pub(crate) async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| MeterError::DirectoryCreation {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// File stems of every `*.json` file in `dir`, skipping hidden and temp
/// files. A missing directory yields an empty list.
pub(crate) async fn list_json_stems(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MeterError::io("listing", dir, e)),
    };

    let mut stems = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| MeterError::io("listing", dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(JSON_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            && !stem.starts_with('.')
        {
            stems.push(stem.to_string());
        }
    }
    Ok(stems)
}
