//! Durable storage for the photo collection.
//!
//! - [`LocalStorage`]: a single JSON file on disk (default)
//! - [`MemoryStorage`]: process-local buffer, for tests and throwaway servers
//!
//! The `PhotoStore` holds a `Box<dyn CollectionStorage>` and never touches
//! the filesystem itself. Backends move whole documents; they know nothing
//! about photo records.

pub mod local;
pub mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CollectionStorage: Send + Sync {
    /// Human-readable backend name (e.g., "local", "memory").
    fn backend_name(&self) -> &str;

    /// Read the stored document. Returns None if nothing was ever written.
    async fn read(&self) -> Result<Option<String>>;

    /// Replace the stored document. A reader never sees a partial write.
    async fn write(&self, contents: &str) -> Result<()>;
}
