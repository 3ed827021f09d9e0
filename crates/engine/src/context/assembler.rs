//! Context assembly — the top of the pipeline.
//!
//! Combines three layers under one token budget:
//!
//! 1. **Domain** (static knowledge) — knowledge lines dropped from the end
//! 2. **Entity memory** (compressed facts) — lowest-priority facts dropped
//! 3. **Session** (recent interaction) — oldest messages dropped, truncated last
//!
//! Parts are always emitted in that order. An unknown domain is fatal; a
//! missing entity or an absent/expired session just leaves its part empty.
//!
//! # Determinism
//!
//! Given the same stored state and clock, assembly produces identical output.

use contexta_config::{BudgetSplit, EngineConfig};
use contexta_core::error::{Error, Result};
use contexta_core::memory::BlockStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::compression;
use crate::context::session::{self, SessionContext, SessionManager, SessionRender};
use crate::context::token;
use crate::domain::{DomainContext, DomainRegistry};
use crate::entity_store::EntityMemoryStore;

/// First line of the entity section.
pub const ENTITY_HEADER: &str = "[Entity Memory]";

/// Separator between the assembled parts.
pub const PART_SEPARATOR: &str = "\n\n";

const PROMPT_PREAMBLE: &str = "You are helping an organisation prepare a program application. \
Ground every statement in the context below. When entity memory and general domain knowledge \
disagree, prefer entity memory. Do not invent facts that are not stated.";

const PROMPT_EMPTY: &str = "(no context available)";

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-call assembly options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Overrides the domain's recommended `token_budget`
    pub total_budget: Option<usize>,
}

impl AssembleOptions {
    pub fn with_budget(total_budget: usize) -> Self {
        Self {
            total_budget: Some(total_budget),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Domain,
    Entity,
    Session,
}

impl Layer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Entity => "entity",
            Self::Session => "session",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token budget for each layer, derived from a [`BudgetSplit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerBudgets {
    pub domain: usize,
    pub entity: usize,
    pub session: usize,
}

impl LayerBudgets {
    /// `floor(total * pct / 100)` per layer; the rest is headroom.
    pub fn split(total: usize, split: &BudgetSplit) -> Self {
        let share = |pct: u8| total.saturating_mul(usize::from(pct)) / 100;
        Self {
            domain: share(split.domain_pct),
            entity: share(split.entity_pct),
            session: share(split.session_pct),
        }
    }
}

/// Estimated tokens per part and for the joined text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub domain: usize,
    pub entity: usize,
    pub session: usize,
    /// Estimate of the full joined context, separators included
    pub total: usize,
}

/// Statistics for a single layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStats {
    pub layer: Layer,
    pub present: bool,
    /// Tokens allotted by the split
    pub budget: usize,
    /// Tokens actually used
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items a layer gave up to stay within budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: Layer,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub domain_id: String,
    pub entity_id: Option<String>,
    pub session_id: Option<String>,
    pub total_budget: usize,
    /// `total / total_budget * 100`
    pub utilization_pct: f32,
    pub layers: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
}

impl AssemblyMetadata {
    pub fn layer(&self, layer: Layer) -> Option<&LayerStats> {
        self.layers.iter().find(|s| s.layer == layer)
    }
}

/// The assembled context. Transient; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub domain_part: String,
    pub entity_part: String,
    pub session_part: String,
    pub token_breakdown: TokenBreakdown,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// Non-empty parts joined in domain → entity → session order.
    pub fn text(&self) -> String {
        join_parts(&self.domain_part, &self.entity_part, &self.session_part)
    }

    pub fn is_within_budget(&self) -> bool {
        self.token_breakdown.total <= self.metadata.total_budget
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Orchestrates the domain registry, entity store and session manager.
/// Holds no per-request state; share it behind an `Arc`.
pub struct ContextAssembler {
    domains: Arc<DomainRegistry>,
    entities: Arc<EntityMemoryStore>,
    sessions: Arc<SessionManager>,
    split: BudgetSplit,
    default_domain: Option<String>,
    sweep_interval: Option<Duration>,
}

impl ContextAssembler {
    pub fn new(
        domains: Arc<DomainRegistry>,
        entities: Arc<EntityMemoryStore>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            domains,
            entities,
            sessions,
            split: BudgetSplit::default(),
            default_domain: None,
            sweep_interval: None,
        }
    }

    /// Wire every component from configuration over the given block store.
    pub fn from_config(config: &EngineConfig, backend: Arc<dyn BlockStore>) -> Result<Self> {
        let domains = Arc::new(DomainRegistry::from_config(&config.domains));
        if let Some(default) = &config.default_domain {
            domains.lookup(default)?;
        }
        let entities = Arc::new(EntityMemoryStore::from_config(backend, config));
        let sessions = Arc::new(SessionManager::new(&config.session));

        Ok(Self::new(domains, entities, sessions)
            .with_split(config.budget)
            .with_default_domain(config.default_domain.clone())
            .with_sweep_interval(config.session.sweep_interval_secs.map(Duration::from_secs)))
    }

    pub fn with_split(mut self, split: BudgetSplit) -> Self {
        self.split = split;
        self
    }

    pub fn with_default_domain(mut self, domain_id: Option<String>) -> Self {
        self.default_domain = domain_id;
        self
    }

    pub fn with_sweep_interval(mut self, every: Option<Duration>) -> Self {
        self.sweep_interval = every;
        self
    }

    /// Start the periodic expired-session sweep, if an interval is configured.
    pub fn spawn_housekeeping(&self) -> Option<JoinHandle<()>> {
        self.sweep_interval
            .map(|every| self.sessions.spawn_sweeper(every))
    }

    pub fn domains(&self) -> &Arc<DomainRegistry> {
        &self.domains
    }

    pub fn entities(&self) -> &Arc<EntityMemoryStore> {
        &self.entities
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Assemble context for a domain, optionally enriched with an entity's
    /// memory and a session.
    ///
    /// # Algorithm
    ///
    /// 1. Resolve the domain (unknown → `Configuration` error)
    /// 2. Split the total budget into per-layer budgets
    /// 3. Render each layer within its own budget
    /// 4. If the joined text still exceeds the total, shrink the session layer
    pub async fn assemble(
        &self,
        domain_id: &str,
        entity_id: Option<&str>,
        session_id: Option<&str>,
        options: AssembleOptions,
    ) -> Result<AssembledContext> {
        let domain = self.domains.lookup(domain_id)?;
        let total_budget = options.total_budget.unwrap_or(domain.token_budget);
        let budgets = LayerBudgets::split(total_budget, &self.split);

        let mut layers = Vec::with_capacity(3);
        let mut drops = Vec::new();

        // ── Layer 1: Domain ────────────────────────────────────────────────
        let (domain_part, domain_stats, domain_drop) = render_domain_layer(&domain, budgets.domain);
        layers.push(domain_stats);
        drops.extend(domain_drop);

        // ── Layer 2: Entity memory ─────────────────────────────────────────
        let (entity_part, entity_stats, entity_drop) = match entity_id {
            Some(id) => self.render_entity_layer(id, budgets.entity).await?,
            None => (String::new(), empty_stats(Layer::Entity, budgets.entity, 0), None),
        };
        layers.push(entity_stats);
        drops.extend(entity_drop);

        // ── Layer 3: Session ───────────────────────────────────────────────
        let session = match session_id {
            Some(id) => {
                let found = self.sessions.get(id).await;
                if found.is_none() {
                    debug!(session_id = id, "Session absent or expired, skipping layer");
                }
                found
            }
            None => None,
        };
        let mut session_render = session
            .as_ref()
            .map(|s| session::render_within_budget(s, budgets.session))
            .unwrap_or_default();

        // ── Final budget check: the session layer gives way last ───────────
        let mut text = join_parts(&domain_part, &entity_part, &session_render.text);
        let mut total = token::estimate_tokens(&text);
        if let Some(s) = &session {
            while total > total_budget && !session_render.text.is_empty() {
                let overflow = total - total_budget;
                session_render =
                    session::render_within_budget(s, session_render.tokens.saturating_sub(overflow));
                text = join_parts(&domain_part, &entity_part, &session_render.text);
                total = token::estimate_tokens(&text);
            }
        }

        let (session_stats, session_drop) =
            session_layer_stats(session.as_ref(), &session_render, budgets.session);
        layers.push(session_stats);
        drops.extend(session_drop);

        let token_breakdown = TokenBreakdown {
            domain: token::estimate_tokens(&domain_part),
            entity: token::estimate_tokens(&entity_part),
            session: session_render.tokens,
            total,
        };
        let utilization_pct = if total_budget == 0 {
            0.0
        } else {
            total as f32 / total_budget as f32 * 100.0
        };

        debug!(
            domain_id,
            total_tokens = total,
            total_budget,
            dropped_layers = drops.len(),
            "Context assembled"
        );

        Ok(AssembledContext {
            domain_part,
            entity_part,
            session_part: session_render.text,
            token_breakdown,
            metadata: AssemblyMetadata {
                domain_id: domain.domain_id.clone(),
                entity_id: entity_id.map(str::to_string),
                session_id: session_id.map(str::to_string),
                total_budget,
                utilization_pct,
                layers,
                drops,
            },
        })
    }

    /// Pick a domain for free text and assemble for it.
    ///
    /// Routes by keyword match, falling back to the configured default
    /// domain; with neither, fails with a `Configuration` error.
    pub async fn assemble_for_text(
        &self,
        text: &str,
        entity_id: Option<&str>,
        session_id: Option<&str>,
        options: AssembleOptions,
    ) -> Result<AssembledContext> {
        let domain_id = match self.domains.route(text) {
            Some(found) => {
                debug!(domain_id = %found.domain_id, score = found.score, "Routed request by keywords");
                found.domain_id
            }
            None => self.default_domain.clone().ok_or_else(|| {
                Error::Configuration(
                    "no domain matches the request and no default domain is configured".into(),
                )
            })?,
        };
        self.assemble(&domain_id, entity_id, session_id, options).await
    }

    // ── Private layer renderers ───────────────────────────────────────────

    async fn render_entity_layer(
        &self,
        entity_id: &str,
        budget: usize,
    ) -> Result<(String, LayerStats, Option<DropInfo>)> {
        let header = format!("{ENTITY_HEADER}\n");
        let body_budget = budget.saturating_sub(token::estimate_tokens(&header));

        let Some(result) = self.entities.compress_entity(entity_id, Some(body_budget)).await? else {
            debug!(entity_id, "Entity absent, skipping layer");
            return Ok((String::new(), empty_stats(Layer::Entity, budget, 0), None));
        };

        let items_total = result.stats.facts_in;
        let part = format!("{header}{}", result.context);
        let tokens = token::estimate_tokens(&part);

        if tokens > budget {
            // Even the profile alone does not fit.
            return Ok((
                String::new(),
                empty_stats(Layer::Entity, budget, items_total),
                Some(DropInfo {
                    layer: Layer::Entity,
                    items_dropped: result.selected_facts.len() + result.trimmed_facts.len(),
                    tokens_dropped: tokens,
                    reason: "No budget available for entity layer".into(),
                }),
            ));
        }

        let tokens_dropped = result
            .trimmed_facts
            .iter()
            .map(|f| token::estimate_tokens(&compression::render_fact(f)))
            .sum();

        Ok((
            part,
            LayerStats {
                layer: Layer::Entity,
                present: true,
                budget,
                tokens,
                items_included: result.selected_facts.len(),
                items_total,
            },
            maybe_drop(
                Layer::Entity,
                result.trimmed_facts.len(),
                tokens_dropped,
                "Lowest-priority facts dropped",
            ),
        ))
    }
}

/// Wrap an assembled context in the instruction template. Pure formatting.
pub fn to_prompt(context: &AssembledContext) -> String {
    let body = context.text();
    let body = if body.is_empty() { PROMPT_EMPTY } else { body.as_str() };
    format!("{PROMPT_PREAMBLE}{PART_SEPARATOR}{body}")
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn join_parts(domain: &str, entity: &str, session: &str) -> String {
    [domain, entity, session]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR)
}

fn render_domain_layer(
    domain: &DomainContext,
    budget: usize,
) -> (String, LayerStats, Option<DropInfo>) {
    let layer = Layer::Domain;
    let knowledge: Vec<&str> = domain
        .knowledge
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if knowledge.is_empty() {
        return (String::new(), empty_stats(layer, budget, 0), None);
    }

    let header = format!("[Domain: {}]", domain.name);
    let mut kept = knowledge.len();
    let render = |n: usize| {
        std::iter::once(header.as_str())
            .chain(knowledge[..n].iter().copied())
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut section = render(kept);
    let mut tokens = token::estimate_tokens(&section);
    while tokens > budget && kept > 0 {
        kept -= 1;
        section = render(kept);
        tokens = token::estimate_tokens(&section);
    }

    let dropped = knowledge.len() - kept;
    let tokens_dropped = knowledge[kept..]
        .iter()
        .map(|line| token::estimate_tokens(line))
        .sum();

    if kept == 0 {
        return (
            String::new(),
            empty_stats(layer, budget, knowledge.len()),
            Some(DropInfo {
                layer,
                items_dropped: dropped,
                tokens_dropped,
                reason: "No budget available for domain layer".into(),
            }),
        );
    }

    (
        section,
        LayerStats {
            layer,
            present: true,
            budget,
            tokens,
            items_included: kept,
            items_total: knowledge.len(),
        },
        maybe_drop(layer, dropped, tokens_dropped, "Trailing knowledge lines dropped"),
    )
}

fn session_layer_stats(
    session: Option<&SessionContext>,
    render: &SessionRender,
    budget: usize,
) -> (LayerStats, Option<DropInfo>) {
    let Some(session) = session else {
        return (empty_stats(Layer::Session, budget, 0), None);
    };

    let total = session.messages.len();
    let dropped_tokens = session
        .messages
        .iter()
        .take(render.messages_dropped)
        .map(|m| token::estimate_tokens(&m.render()))
        .sum();

    let stats = LayerStats {
        layer: Layer::Session,
        present: !render.text.is_empty(),
        budget,
        tokens: render.tokens,
        items_included: render.messages_included,
        items_total: total,
    };
    let reason = if render.text.is_empty() {
        "No budget available for session layer"
    } else {
        "Oldest messages dropped"
    };
    (
        stats,
        maybe_drop(Layer::Session, render.messages_dropped, dropped_tokens, reason),
    )
}

fn empty_stats(layer: Layer, budget: usize, total: usize) -> LayerStats {
    LayerStats {
        layer,
        present: false,
        budget,
        tokens: 0,
        items_included: 0,
        items_total: total,
    }
}

fn maybe_drop(layer: Layer, count: usize, tokens: usize, reason: &str) -> Option<DropInfo> {
    (count > 0).then(|| DropInfo {
        layer,
        items_dropped: count,
        tokens_dropped: tokens,
        reason: reason.into(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────
