use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::CollectionStorage;

/// In-process document buffer. `fail_writes` makes every write error, which
/// is how tests exercise the store's save-failure path.
#[derive(Default)]
pub struct MemoryStorage {
    document: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(contents: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(contents.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<String> {
        self.document.lock().ok().and_then(|d| d.clone())
    }
}

#[async_trait]
impl CollectionStorage for MemoryStorage {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn read(&self) -> Result<Option<String>> {
        let doc = self.document.lock().map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        Ok(doc.clone())
    }

    async fn write(&self, contents: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("memory storage is refusing writes");
        }
        let mut doc = self.document.lock().map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        *doc = Some(contents.to_string());
        Ok(())
    }
}
