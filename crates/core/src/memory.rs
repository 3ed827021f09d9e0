//! Entity memory blocks and the persistence trait behind them.
//!
//! A block holds everything remembered about one entity: its profile,
//! its facts, and the stats of the last compression run. Blocks are only
//! mutated through the entity memory store; backends merely persist them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fact::Fact;
use crate::profile::EntityProfile;

/// Token accounting from the most recent compression of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Estimated tokens of the serialized profile + all input facts
    pub original_tokens: usize,
    /// Estimated tokens of the rendered context
    pub compressed_tokens: usize,
    /// Percentage of tokens removed, clamped to 0..=100
    pub ratio: u8,
    pub facts_in: usize,
    pub facts_after_dedup: usize,
    pub facts_after_filter: usize,
    pub facts_selected: usize,
}

impl CompressionStats {
    /// `clamp(round((1 - compressed / original) * 100), 0, 100)`.
    pub fn ratio_for(original_tokens: usize, compressed_tokens: usize) -> u8 {
        if original_tokens == 0 {
            return 0;
        }
        let kept = compressed_tokens as f64 / original_tokens as f64;
        ((1.0 - kept) * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Everything remembered about a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMemoryBlock {
    pub entity_id: String,
    pub profile: EntityProfile,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub compression_stats: CompressionStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityMemoryBlock {
    pub fn new(entity_id: impl Into<String>, profile: EntityProfile, now: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            profile,
            facts: Vec::new(),
            compression_stats: CompressionStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn fact(&self, fact_id: &str) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id == fact_id)
    }
}

/// The persistence collaborator behind the entity memory store.
///
/// Implementations: in-memory (for tests and ephemeral runs), JSONL file.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Fetch the block stored under `key`.
    async fn get(&self, key: &str) -> std::result::Result<Option<EntityMemoryBlock>, StoreError>;

    /// Insert or replace the block stored under `key`.
    async fn put(&self, key: &str, block: EntityMemoryBlock) -> std::result::Result<(), StoreError>;

    /// Remove the block stored under `key`. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> std::result::Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_rounded_and_clamped() {
        assert_eq!(CompressionStats::ratio_for(100, 25), 75);
        assert_eq!(CompressionStats::ratio_for(3, 1), 67);
        assert_eq!(CompressionStats::ratio_for(100, 150), 0);
        assert_eq!(CompressionStats::ratio_for(0, 10), 0);
        assert_eq!(CompressionStats::ratio_for(10, 0), 100);
    }

    #[test]
    fn block_serialization() {
        let block = EntityMemoryBlock::new("acme", EntityProfile::new("Acme"), Utc::now());
        let json = serde_json::to_string(&block).unwrap();
        let parsed: EntityMemoryBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, block);
    }
}
