//! Storage backends for the persisted tree.

pub mod fs;
pub mod memory;

use async_trait::async_trait;

/// One persisted blob's worth of durable storage.
///
/// The orchestrator owns the blob for the duration of a load or save
/// transition and never issues overlapping operations. Implementations do not
/// need atomicity guarantees beyond what their medium provides.
#[async_trait]
pub trait CacheStorage {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync;

    /// Read the persisted blob. An absent blob is `Ok(None)`, not an error.
    async fn read(&self) -> Result<Option<String>, Self::Error>;

    /// Write the persisted blob, replacing any previous one.
    async fn write(&self, text: &str) -> Result<(), Self::Error>;

    /// Remove the persisted blob. Removing an absent blob succeeds.
    async fn remove(&self) -> Result<(), Self::Error>;
}

pub use fs::{FsStorage, FsStorageError};
pub use memory::{InMemoryStorage, InMemoryStorageError};
