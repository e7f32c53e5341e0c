//! Durable project documents.
//!
//! Reads never fail outward: any I/O or parse problem is folded into
//! [`PersistenceResult::Error`]. Each write goes to its own sibling
//! `<file>.<uuid>.tmp` that is renamed over the target, so a half-written
//! document is never picked up and concurrent writers never share a temp file.

use crate::project::Project;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceResult<T> {
    Success { contents: T },
    Error { cause: String },
}

impl<T> PersistenceResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, PersistenceResult::Success { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PersistenceResult<U> {
        match self {
            PersistenceResult::Success { contents } => PersistenceResult::Success {
                contents: f(contents),
            },
            PersistenceResult::Error { cause } => PersistenceResult::Error { cause },
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            PersistenceResult::Success { contents } => Ok(contents),
            PersistenceResult::Error { cause } => Err(cause),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads and deserializes the JSON document at `path`.
pub async fn read<T: DeserializeOwned>(path: &Path) -> PersistenceResult<T> {
    let data = match fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), "failed to read document: {e}");
            return PersistenceResult::Error {
                cause: format!("failed to read {}: {e}", path.display()),
            };
        }
    };
    match serde_json::from_str(&data) {
        Ok(contents) => PersistenceResult::Success { contents },
        Err(e) => {
            warn!(path = %path.display(), "failed to parse document: {e}");
            PersistenceResult::Error {
                cause: format!("failed to parse {}: {e}", path.display()),
            }
        }
    }
}

/// Reads a project and attaches the path it was read from.
pub async fn read_project(path: &Path) -> PersistenceResult<Project> {
    read::<Project>(path)
        .await
        .map(|project| project.with_path(path))
}

/// Serializes `value` as pretty JSON and atomically replaces `path`.
pub async fn persist<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, json).await.map_err(io_error(&tmp))?;
    if let Err(e) = replace(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_error(path)(e));
    }
    debug!(path = %path.display(), "document persisted");
    Ok(())
}

async fn replace(tmp: &Path, path: &Path) -> io::Result<()> {
    match fs::rename(tmp, path).await {
        // Some Windows filesystems refuse to rename over an existing file.
        Err(e)
            if cfg!(windows)
                && matches!(
                    e.kind(),
                    io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
                ) =>
        {
            fs::remove_file(path).await?;
            fs::rename(tmp, path).await
        }
        result => result,
    }
}

/// A unique sibling of `path` to stage a write in.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("document"));
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}
