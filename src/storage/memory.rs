//! In-memory storage backend for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::CacheStorage;

/// Error type for in-memory storage; only produced by fault injection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryStorageError {
    /// Read failure was injected.
    #[error("injected read failure")]
    ReadUnavailable,
    /// Write failure was injected.
    #[error("injected write failure")]
    WriteUnavailable,
}

#[derive(Debug, Default)]
struct Inner {
    blob: Mutex<Option<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// Storage over a shared in-memory blob.
///
/// Clones share the same blob, so a test can hand one clone to the
/// orchestrator and inspect the other. Fault injection toggles let tests
/// exercise the unreadable-cache and failed-save paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Inner>,
}

impl InMemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with a blob.
    pub fn with_blob(text: impl Into<String>) -> Self {
        let storage = Self::new();
        *storage.inner.blob.lock() = Some(text.into());
        storage
    }

    /// Current blob contents.
    pub fn blob(&self) -> Option<String> {
        self.inner.blob.lock().clone()
    }

    /// Whether a blob is present.
    pub fn has_blob(&self) -> bool {
        self.inner.blob.lock().is_some()
    }

    /// Make subsequent reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl CacheStorage for InMemoryStorage {
    type Error = InMemoryStorageError;

    async fn read(&self) -> Result<Option<String>, Self::Error> {
        if self.inner.fail_reads.load(Ordering::Relaxed) {
            return Err(InMemoryStorageError::ReadUnavailable);
        }
        Ok(self.inner.blob.lock().clone())
    }

    async fn write(&self, text: &str) -> Result<(), Self::Error> {
        if self.inner.fail_writes.load(Ordering::Relaxed) {
            return Err(InMemoryStorageError::WriteUnavailable);
        }
        *self.inner.blob.lock() = Some(text.to_string());
        Ok(())
    }

    async fn remove(&self) -> Result<(), Self::Error> {
        *self.inner.blob.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_the_blob() {
        let storage = InMemoryStorage::new();
        let observer = storage.clone();

        storage.write("{}").await.unwrap();
        assert_eq!(observer.blob().as_deref(), Some("{}"));

        observer.remove().await.unwrap();
        assert!(!storage.has_blob());
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let storage = InMemoryStorage::with_blob("{}");
        storage.set_fail_reads(true);

        assert!(storage.read().await.is_err());

        storage.set_fail_reads(false);
        assert!(storage.read().await.unwrap().is_some());
    }
}
