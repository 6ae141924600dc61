//! In-memory backend for tests and throwaway simulations.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{LedgerBackend, LedgerDocument};

/// Holds the last persisted document. Clones share the same document.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    stored: Arc<Mutex<LedgerDocument>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of what has been persisted so far.
    pub async fn snapshot(&self) -> LedgerDocument {
        self.stored.lock().await.clone()
    }
}

#[async_trait]
impl LedgerBackend for MemoryBackend {
    async fn load(&self) -> Result<LedgerDocument> {
        Ok(self.stored.lock().await.clone())
    }

    async fn persist(&self, document: &LedgerDocument) -> Result<()> {
        *self.stored.lock().await = document.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
