//! Durable state of the tracker: `trackers.json` for definitions,
//! `active.json` for running sessions, and one append-only JSONL file per
//! tracker under `sessions/` for the completed-session ledger. A single lock
//! file gates every read and write so concurrent commands and the daemon stay
//! consistent.

pub mod entities;
pub mod ledger;
pub mod trackers;

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};

use self::entities::TrackerId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Root directory of a store. Knows the layout and hands out the advisory
/// lock; the actual file contents are read and written by the `trackers` and
/// `ledger` modules.
#[derive(Debug, Clone)]
pub struct StoreDir {
    root: PathBuf,
}

impl StoreDir {
    pub fn new(root: PathBuf) -> Result<StoreDir, StoreError> {
        std::fs::create_dir_all(root.join("sessions"))?;
        Ok(StoreDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub(crate) fn trackers_path(&self) -> PathBuf {
        self.root.join("trackers.json")
    }

    pub(crate) fn active_path(&self) -> PathBuf {
        self.root.join("active.json")
    }

    pub(crate) fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub(crate) fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub(crate) fn session_path(&self, id: TrackerId) -> PathBuf {
        self.sessions_dir().join(format!("{id}.jsonl"))
    }

    /// Takes the shared lock. Holders may read any store file.
    pub async fn lock_shared(&self) -> Result<StoreLock, StoreError> {
        let file = self.open_lock_file().await?;
        file.lock_shared()?;
        Ok(StoreLock { file })
    }

    /// Takes the exclusive lock. Required for any mutation, including ones
    /// spanning multiple files.
    pub async fn lock_exclusive(&self) -> Result<StoreLock, StoreError> {
        let file = self.open_lock_file().await?;
        file.lock_exclusive()?;
        Ok(StoreLock { file })
    }

    async fn open_lock_file(&self) -> Result<File, StoreError> {
        Ok(File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(self.lock_path())
            .await?)
    }
}

/// Held advisory lock. Dropping it without [`StoreLock::release`] is fine,
/// the lock goes away when the descriptor closes.
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    pub async fn release(self) -> Result<(), StoreError> {
        self.file.unlock_async().await?;
        Ok(())
    }
}

/// Reads a whole-file JSON document, producing `default` when the file does
/// not exist yet.
pub(crate) async fn read_json_or<T, F>(path: &Path, default: F) -> Result<T, StoreError>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(default()),
        Err(e) => Err(e.into()),
    }
}

/// Replaces a whole-file JSON document. Written to a sibling temp file first
/// and renamed over, so a crash mid-write never leaves a half document.
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })?;
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
