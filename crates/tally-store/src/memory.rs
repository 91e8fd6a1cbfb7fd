//! In-memory key-value store (process lifetime only).

use std::collections::HashMap;
use std::sync::Arc;
use tally_types::{KvStore, StoreError};
use tokio::sync::RwLock;

/// In-memory KvStore: values in a map behind an async RwLock.
///
/// Cloning shares the underlying map, so clones behave like two handles to the
/// same storage origin (e.g. two tabs, or one tab's session storage).
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    values: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let guard = self.values.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut guard = self.values.write().await;
        guard.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.values.write().await;
        guard.remove(key);
        Ok(())
    }
}
