//! Atomic JSON file I/O. Writes go to `<path>.tmp` and are renamed over
//! the destination, so readers observe either the old or the new content.
//! Unparseable files are quarantined as `<path>.corrupt.<epoch>` and the
//! fallback value is returned.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;
use soldocs_core::Result;
use tokio::fs;
use tracing::warn;

fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", path.display()))
}

fn corrupt_path(path: &Path) -> PathBuf {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    PathBuf::from(format!("{}.corrupt.{epoch}", path.display()))
}

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn quarantine(path: &Path, err: &serde_json::Error) -> Result<()> {
    let target = corrupt_path(path);
    warn!(
        path = %path.display(),
        quarantine = %target.display(),
        error = %err,
        "Unparseable JSON file, quarantining"
    );
    fs::rename(path, &target).await?;
    Ok(())
}

/// Read a JSON array file, treating a missing or corrupt file as empty.
pub async fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(items) => Ok(items),
        Err(err) => {
            quarantine(path, &err).await?;
            Ok(Vec::new())
        }
    }
}

/// Read a single-record JSON file, treating a missing or corrupt file as
/// absent.
pub async fn read_json_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(record) => Ok(Some(record)),
        Err(err) => {
            quarantine(path, &err).await?;
            Ok(None)
        }
    }
}
