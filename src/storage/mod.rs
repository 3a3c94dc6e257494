//! String-keyed persistence seam for the cost ledger.
//!
//! The core only needs get/set/remove on string keys; the mobile shell
//! binds this to whatever the platform provides. Two implementations ship
//! here:
//! - [`MemoryStore`]: in-memory, for tests and preview builds
//! - [`FileStore`]: one file per key under the app data directory

use anyhow::Result;
use async_trait::async_trait;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Async string-keyed store consumed by the cost ledger.
///
/// Implementations must be safe to call from concurrent tasks. Errors are
/// surfaced to the ledger, which degrades gracefully rather than
/// propagating them to its callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any prior value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
