//! Entity memory store — CRUD over per-entity memory blocks.
//!
//! All mutations for one entity id are serialized through a per-key
//! `RwLock`: writers hold the write guard across the whole
//! read-modify-write against the backing [`BlockStore`], readers hold the
//! read guard, so concurrent reads run in parallel and never observe a
//! half-applied write.
//!
//! Lock entries live only while someone holds them. Readers never insert
//! one; a reader that finds no entry goes straight to the backend, whose
//! `get` is atomic per key.
//!
//! User-facing mutations fail loudly (`NotFound`, `Validation`).
//! [`EntityMemoryStore::learn_from_event`] is fire-and-forget and never fails.

use chrono::{DateTime, Utc};
use contexta_config::{CompressionConfig, CreatePolicy, EngineConfig};
use contexta_core::clock::{Clock, SystemClock};
use contexta_core::error::{Error, Result};
use contexta_core::event::LearningEvent;
use contexta_core::fact::{self, Fact, FactInput, FactSource, FactType};
use contexta_core::memory::{BlockStore, EntityMemoryBlock};
use contexta_core::profile::EntityProfile;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::compression::{self, CompressionResult};
use crate::domain::DomainContext;

/// Wholesale replacements applied by [`EntityMemoryStore::update`].
#[derive(Debug, Clone, Default)]
pub struct EntityUpdate {
    pub profile: Option<EntityProfile>,
    pub facts: Option<Vec<Fact>>,
}

pub struct EntityMemoryStore {
    backend: Arc<dyn BlockStore>,
    compression: CompressionConfig,
    create_policy: CreatePolicy,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl EntityMemoryStore {
    pub fn new(backend: Arc<dyn BlockStore>, compression: CompressionConfig) -> Self {
        Self {
            backend,
            compression,
            create_policy: CreatePolicy::default(),
            clock: Arc::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(backend: Arc<dyn BlockStore>, config: &EngineConfig) -> Self {
        Self::new(backend, config.compression).with_create_policy(config.store.on_existing_create)
    }

    pub fn with_create_policy(mut self, policy: CreatePolicy) -> Self {
        self.create_policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn compression_config(&self) -> &CompressionConfig {
        &self.compression
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    // ── Create / read / delete ──

    /// Create a block with no facts.
    pub async fn create(&self, entity_id: &str, profile: EntityProfile) -> Result<EntityMemoryBlock> {
        self.create_with_seeds(entity_id, profile, Vec::new()).await
    }

    /// Create a block seeded with the domain's seed facts.
    pub async fn create_seeded(
        &self,
        entity_id: &str,
        profile: EntityProfile,
        domain: &DomainContext,
    ) -> Result<EntityMemoryBlock> {
        self.create_with_seeds(entity_id, profile, domain.seed_facts.clone())
            .await
    }

    async fn create_with_seeds(
        &self,
        entity_id: &str,
        profile: EntityProfile,
        seeds: Vec<FactInput>,
    ) -> Result<EntityMemoryBlock> {
        if entity_id.trim().is_empty() {
            return Err(Error::Validation("entity id must not be empty".into()));
        }
        for seed in &seeds {
            seed.validate()?;
        }

        self.exclusive(entity_id, async move {
            if self.create_policy == CreatePolicy::Reject
                && self.backend.get(entity_id).await?.is_some()
            {
                return Err(Error::AlreadyExists(entity_id.to_string()));
            }

            let now = self.clock.now();
            let mut block = EntityMemoryBlock::new(entity_id, profile, now);
            block.facts = seeds
                .into_iter()
                .map(|seed| seed.with_source(FactSource::DomainSeed).into_fact(now))
                .collect();
            self.refresh(&mut block, now);

            self.backend.put(entity_id, block.clone()).await?;
            debug!(entity_id, facts = block.facts.len(), "Entity memory created");
            Ok(block)
        })
        .await
    }

    pub async fn get(&self, entity_id: &str) -> Result<Option<EntityMemoryBlock>> {
        self.shared(entity_id, async move { Ok(self.backend.get(entity_id).await?) })
            .await
    }

    pub async fn delete(&self, entity_id: &str) -> Result<bool> {
        self.exclusive(entity_id, async move {
            let removed = self.backend.delete(entity_id).await?;
            debug!(entity_id, removed, "Entity memory deleted");
            Ok(removed)
        })
        .await
    }

    // ── Mutations ──

    /// Replace the profile and/or the whole fact list.
    pub async fn update(&self, entity_id: &str, update: EntityUpdate) -> Result<EntityMemoryBlock> {
        if let Some(facts) = &update.facts {
            validate_fact_list(facts)?;
        }

        let ((), block) = self
            .mutate_block(entity_id, move |block, _| {
                if let Some(profile) = update.profile {
                    block.profile = profile;
                }
                if let Some(facts) = update.facts {
                    block.facts = facts;
                }
                Ok(((), true))
            })
            .await?;
        Ok(block)
    }

    /// Validate and append a new fact. Returns the stored fact.
    pub async fn add_fact(&self, entity_id: &str, input: FactInput) -> Result<Fact> {
        input.validate()?;
        self.mutate(entity_id, move |block, now| {
            let fact = input.into_fact(now);
            block.facts.push(fact.clone());
            Ok((fact, true))
        })
        .await
    }

    pub async fn remove_fact(&self, entity_id: &str, fact_id: &str) -> Result<bool> {
        match self
            .mutate(entity_id, |block, _| {
                let before = block.facts.len();
                block.facts.retain(|f| f.id != fact_id);
                let removed = block.facts.len() < before;
                Ok((removed, removed))
            })
            .await
        {
            Err(Error::NotFound { .. }) => Ok(false),
            other => other,
        }
    }

    /// Drop facts whose `expires_at` has passed. `0` if the entity is absent.
    pub async fn cleanup_expired_facts(&self, entity_id: &str) -> Result<usize> {
        match self
            .mutate(entity_id, |block, now| {
                let before = block.facts.len();
                block.facts.retain(|f| !f.is_expired(now));
                let removed = before - block.facts.len();
                Ok((removed, removed > 0))
            })
            .await
        {
            Err(Error::NotFound { .. }) => Ok(0),
            other => other,
        }
    }

    /// Derive one fact from a workflow event and append it.
    ///
    /// Fire-and-forget: an absent entity or an invalid derived fact is
    /// logged and ignored.
    pub async fn learn_from_event(&self, entity_id: &str, event: &LearningEvent) -> Option<Fact> {
        match self.add_fact(entity_id, event.to_fact_input()).await {
            Ok(fact) => {
                debug!(entity_id, kind = event.kind(), "Learned fact from event");
                Some(fact)
            }
            Err(Error::NotFound { .. }) => {
                debug!(entity_id, kind = event.kind(), "Ignoring event for unknown entity");
                None
            }
            Err(e) => {
                warn!(entity_id, kind = event.kind(), error = %e, "Failed to learn from event");
                None
            }
        }
    }

    // ── Reads ──

    /// Ordered snapshot of the entity's facts, optionally filtered by type.
    /// Empty if the entity is absent.
    pub async fn get_facts(&self, entity_id: &str, fact_type: Option<FactType>) -> Result<Vec<Fact>> {
        let Some(block) = self.get(entity_id).await? else {
            return Ok(Vec::new());
        };
        Ok(block
            .facts
            .into_iter()
            .filter(|f| fact_type.is_none_or(|t| f.fact_type == t))
            .collect())
    }

    /// Compress the entity's current (unexpired) facts, trimming to
    /// `token_budget` if given. `None` if the entity is absent.
    pub async fn compress_entity(
        &self,
        entity_id: &str,
        token_budget: Option<usize>,
    ) -> Result<Option<CompressionResult>> {
        let Some(block) = self.get(entity_id).await? else {
            return Ok(None);
        };
        let now = self.clock.now();
        let current: Vec<Fact> = block
            .facts
            .into_iter()
            .filter(|f| !f.is_expired(now))
            .collect();

        let result = match token_budget {
            Some(budget) => {
                compression::compress_within_budget(&block.profile, &current, &self.compression, budget)
            }
            None => compression::compress(&block.profile, &current, &self.compression),
        };
        Ok(Some(result))
    }

    /// Compressed natural-language context for the entity. `""` if absent.
    pub async fn get_compressed_context(
        &self,
        entity_id: &str,
        token_budget: Option<usize>,
    ) -> Result<String> {
        Ok(self
            .compress_entity(entity_id, token_budget)
            .await?
            .map(|r| r.context)
            .unwrap_or_default())
    }

    // ── Internals ──

    /// Run `op` under the entity's write lock, creating the entry if needed.
    async fn exclusive<T>(&self, entity_id: &str, op: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(entity_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(())))
                .clone()
        };
        let result = {
            let _guard = lock.write().await;
            op.await
        };
        self.release(entity_id, lock).await;
        result
    }

    /// Run `op` under the entity's read lock if one is live, otherwise
    /// without one.
    async fn shared<T>(&self, entity_id: &str, op: impl Future<Output = Result<T>>) -> Result<T> {
        let existing = self.locks.lock().await.get(entity_id).cloned();
        let Some(lock) = existing else {
            return op.await;
        };
        let result = {
            let _guard = lock.read().await;
            op.await
        };
        self.release(entity_id, lock).await;
        result
    }

    /// Drop our handle and prune the entry once the map holds the only one.
    async fn release(&self, entity_id: &str, lock: Arc<RwLock<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks.get(entity_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(entity_id);
        }
    }

    #[cfg(test)]
    async fn live_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Read-modify-write under the entity's write lock.
    ///
    /// `apply` returns the value to hand back and whether the block changed;
    /// unchanged blocks are not written back.
    async fn mutate<T, F>(&self, entity_id: &str, apply: F) -> Result<T>
    where
        F: FnOnce(&mut EntityMemoryBlock, DateTime<Utc>) -> Result<(T, bool)>,
    {
        Ok(self.mutate_block(entity_id, apply).await?.0)
    }

    /// Like [`Self::mutate`], also returning the block as stored.
    async fn mutate_block<T, F>(&self, entity_id: &str, apply: F) -> Result<(T, EntityMemoryBlock)>
    where
        F: FnOnce(&mut EntityMemoryBlock, DateTime<Utc>) -> Result<(T, bool)>,
    {
        self.exclusive(entity_id, async move {
            let mut block = self
                .backend
                .get(entity_id)
                .await?
                .ok_or_else(|| Error::entity_not_found(entity_id))?;

            let now = self.clock.now();
            let (value, changed) = apply(&mut block, now)?;
            if changed {
                self.refresh(&mut block, now);
                self.backend.put(entity_id, block.clone()).await?;
                debug!(entity_id, "Entity memory updated");
            }
            Ok((value, block))
        })
        .await
    }

    fn refresh(&self, block: &mut EntityMemoryBlock, now: DateTime<Utc>) {
        block.compression_stats =
            compression::compress(&block.profile, &block.facts, &self.compression).stats;
        block.updated_at = now;
    }
}

fn validate_fact_list(facts: &[Fact]) -> Result<()> {
    let mut seen = HashSet::new();
    for f in facts {
        fact::validate_fact(f)?;
        if !seen.insert(f.id.as_str()) {
            return Err(Error::Validation(format!("duplicate fact id: {}", f.id)));
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────
