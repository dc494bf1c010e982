//! Filesystem storage backend.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::CacheStorage;

/// Error type for filesystem storage.
#[derive(Debug, thiserror::Error)]
pub enum FsStorageError {
    /// Cache file exists but could not be read.
    #[error("failed to read cache file {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Cache file could not be written.
    #[error("failed to write cache file {}: {source}", path.display())]
    Write {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Cache file could not be removed.
    #[error("failed to remove cache file {}: {source}", path.display())]
    Remove {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Storage backed by a single file on disk.
#[derive(Debug, Clone)]
pub struct FsStorage {
    path: PathBuf,
}

impl FsStorage {
    /// Storage over the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheStorage for FsStorage {
    type Error = FsStorageError;

    async fn read(&self) -> Result<Option<String>, Self::Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                debug!(path = %self.path.display(), bytes = text.len(), "read cache file");
                Ok(Some(text))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(FsStorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write(&self, text: &str) -> Result<(), Self::Error> {
        std::fs::write(&self.path, text).map_err(|source| FsStorageError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), bytes = text.len(), "wrote cache file");
        Ok(())
    }

    async fn remove(&self) -> Result<(), Self::Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed cache file");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FsStorageError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
