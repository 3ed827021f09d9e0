//! In-memory block store — useful for testing and ephemeral runs.

use async_trait::async_trait;
use contexta_core::error::StoreError;
use contexta_core::memory::{BlockStore, EntityMemoryBlock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A block store backed by a `HashMap`.
/// Useful for testing and runs where persistence isn't needed.
#[derive(Clone)]
pub struct InMemoryBlockStore {
    blocks: Arc<RwLock<HashMap<String, EntityMemoryBlock>>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<EntityMemoryBlock>, StoreError> {
        Ok(self.blocks.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, block: EntityMemoryBlock) -> Result<(), StoreError> {
        self.blocks.write().await.insert(key.to_string(), block);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.blocks.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contexta_core::profile::EntityProfile;

    fn test_block(id: &str) -> EntityMemoryBlock {
        EntityMemoryBlock::new(id, EntityProfile::new(id.to_uppercase()), Utc::now())
    }

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryBlockStore::new();
        store.put("acme", test_block("acme")).await.unwrap();

        let block = store.get("acme").await.unwrap();
        assert!(block.is_some());
        assert_eq!(block.unwrap().profile.name, "ACME");
        assert!(store.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces() {
        let store = InMemoryBlockStore::new();
        store.put("acme", test_block("acme")).await.unwrap();
        let mut replacement = test_block("acme");
        replacement.profile.name = "Acme Corp".into();
        store.put("acme", replacement).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("acme").await.unwrap().unwrap().profile.name, "Acme Corp");
    }

    #[tokio::test]
    async fn delete_reports_removal() {
        let store = InMemoryBlockStore::new();
        store.put("acme", test_block("acme")).await.unwrap();

        assert!(store.delete("acme").await.unwrap());
        assert!(!store.delete("acme").await.unwrap());
        assert!(store.is_empty().await);
    }
}
