//! File-based block store — persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `EntityMemoryBlock`. The whole file is loaded
//! into memory on creation and rewritten on every mutation, which keeps
//! reads fast and writes durable.
//!
//! Storage location: `~/.contexta/memory/blocks.jsonl`

use async_trait::async_trait;
use contexta_core::error::StoreError;
use contexta_core::memory::{BlockStore, EntityMemoryBlock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A file-backed block store using JSONL (one block per line).
pub struct FileBlockStore {
    path: PathBuf,
    blocks: Arc<RwLock<BTreeMap<String, EntityMemoryBlock>>>,
}

impl FileBlockStore {
    /// Create a new file-based store at the given path.
    ///
    /// If the file exists, blocks are loaded from it.
    /// If the file does not exist, starts empty (file created on first write).
    /// Any other read failure is an error, so a later flush can never
    /// overwrite blocks that were not loaded.
    pub fn new(path: PathBuf) -> Result<Self, StoreError> {
        let blocks = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), count = blocks.len(), "File block store loaded");
        Ok(Self {
            path,
            blocks: Arc::new(RwLock::new(blocks)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load blocks from a JSONL file. Later lines win for duplicate ids.
    fn load_from_disk(path: &Path) -> Result<BTreeMap<String, EntityMemoryBlock>, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read memory file");
                return Err(StoreError::Storage(format!(
                    "Failed to read memory file {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<EntityMemoryBlock>(line) {
                Ok(block) => Some((block.entity_id.clone(), block)),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted memory block");
                    None
                }
            })
            .collect())
    }

    /// Write all blocks to disk as JSONL. Caller holds the write guard.
    fn flush(&self, blocks: &BTreeMap<String, EntityMemoryBlock>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for block in blocks.values() {
            let line = serde_json::to_string(block).map_err(|e| StoreError::Corrupted {
                key: block.entity_id.clone(),
                reason: e.to_string(),
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write memory file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl BlockStore for FileBlockStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<EntityMemoryBlock>, StoreError> {
        Ok(self.blocks.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, block: EntityMemoryBlock) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write().await;
        let previous = blocks.insert(key.to_string(), block);
        if let Err(e) = self.flush(&blocks) {
            // Keep memory consistent with disk.
            match previous {
                Some(prev) => blocks.insert(key.to_string(), prev),
                None => blocks.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut blocks = self.blocks.write().await;
        let Some(previous) = blocks.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&blocks) {
            blocks.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contexta_core::fact::{FactInput, FactType};
    use contexta_core::profile::EntityProfile;

    fn test_block(id: &str) -> EntityMemoryBlock {
        let mut block = EntityMemoryBlock::new(id, EntityProfile::new("Acme"), Utc::now());
        block
            .facts
            .push(FactInput::new(FactType::Insight, "AI 기술 역량 보유", 0.9).into_fact(Utc::now()));
        block
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("blocks.jsonl");

        {
            let store = FileBlockStore::new(path.clone()).unwrap();
            store.put("acme", test_block("acme")).await.unwrap();
            store.put("globex", test_block("globex")).await.unwrap();
        }

        let store = FileBlockStore::new(path).unwrap();
        let block = store.get("acme").await.unwrap().unwrap();
        assert_eq!(block.facts.len(), 1);
        assert_eq!(block.facts[0].content, "AI 기술 역량 보유");
        assert!(store.get("globex").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.jsonl");

        let store = FileBlockStore::new(path.clone()).unwrap();
        store.put("acme", test_block("acme")).await.unwrap();
        assert!(store.delete("acme").await.unwrap());
        assert!(!store.delete("acme").await.unwrap());

        let reopened = FileBlockStore::new(path).unwrap();
        assert!(reopened.get("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.jsonl");
        let good = serde_json::to_string(&test_block("acme")).unwrap();
        std::fs::write(&path, format!("{{not json\n{good}\n\n")).unwrap();

        let store = FileBlockStore::new(path).unwrap();
        assert!(store.get("acme").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlockStore::new(dir.path().join("absent.jsonl")).unwrap();
        assert!(store.get("acme").await.unwrap().is_none());
        assert_eq!(store.name(), "file");
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be read as text.
        let path = dir.path().join("blocks.jsonl");
        std::fs::create_dir(&path).unwrap();

        let err = FileBlockStore::new(path.clone()).err().unwrap();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn invalid_utf8_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.jsonl");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        assert!(FileBlockStore::new(path.clone()).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xff, 0xfe, 0x00]);
    }
}
