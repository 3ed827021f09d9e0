//! Fact compression — turns a profile and a pile of facts into a few lines
//! of natural language.
//!
//! # Pipeline
//!
//! | Stage | Rule |
//! |-------|------|
//! | 1. Dedup | Highest confidence first; drop facts ≥ threshold similar to a kept one |
//! | 2. Filter | Drop facts below `min_confidence` |
//! | 3. Select | Sort by (type rank, confidence, input order); keep `max_facts` |
//! | 4. Render | Profile line, qualifications, history, one line per fact |
//! | 5. Measure | Token estimate of serialized input vs rendered output |
//!
//! # Determinism
//!
//! Compression is a pure function: no clock, no randomness, and every sort
//! has an explicit final tie-break on input position, so identical inputs
//! always produce byte-identical output.

pub mod similarity;

use crate::context::token;
use contexta_config::CompressionConfig;
use contexta_core::fact::Fact;
use contexta_core::memory::CompressionStats;
use contexta_core::profile::EntityProfile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use similarity::{jaccard, similarity, tokenize};

/// Separator between rendered lines.
pub const LINE_SEPARATOR: &str = "\n";

/// Qualifications listed before the `(+N more)` suffix.
pub const MAX_LISTED_QUALIFICATIONS: usize = 4;

/// Output of [`compress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    /// Rendered natural-language context
    pub context: String,
    /// Facts that made it into `context`, in rendering order
    pub selected_facts: Vec<Fact>,
    /// Selected facts later dropped to fit a token budget, highest priority first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trimmed_facts: Vec<Fact>,
    pub stats: CompressionStats,
    pub breakdown: CompressionBreakdown,
}

/// Token cost of each rendered section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionBreakdown {
    pub profile_tokens: usize,
    pub qualification_tokens: usize,
    pub history_tokens: usize,
    pub fact_tokens: usize,
}

/// Compress `facts` about `profile` according to `config`.
///
/// Never fails: an empty fact list yields profile-only text.
pub fn compress(
    profile: &EntityProfile,
    facts: &[Fact],
    config: &CompressionConfig,
) -> CompressionResult {
    let deduped = dedup_indexed(facts, config.dedup_threshold);
    let after_dedup = deduped.len();

    let filtered: Vec<(usize, &Fact)> = deduped
        .into_iter()
        .filter(|(_, f)| f.confidence >= config.min_confidence)
        .collect();
    let after_filter = filtered.len();

    let selected: Vec<Fact> = select_indexed(filtered, config.max_facts)
        .into_iter()
        .map(|(_, f)| f.clone())
        .collect();

    let (context, breakdown) = render(profile, &selected);
    let original_tokens = original_tokens(profile, facts);
    let compressed_tokens = token::estimate_tokens(&context);

    CompressionResult {
        context,
        stats: CompressionStats {
            original_tokens,
            compressed_tokens,
            ratio: CompressionStats::ratio_for(original_tokens, compressed_tokens),
            facts_in: facts.len(),
            facts_after_dedup: after_dedup,
            facts_after_filter: after_filter,
            facts_selected: selected.len(),
        },
        selected_facts: selected,
        trimmed_facts: Vec::new(),
        breakdown,
    }
}

/// Compress, then drop the lowest-priority selected fact until the rendered
/// text fits `token_budget` or no facts remain.
pub fn compress_within_budget(
    profile: &EntityProfile,
    facts: &[Fact],
    config: &CompressionConfig,
    token_budget: usize,
) -> CompressionResult {
    let mut result = compress(profile, facts, config);
    while result.stats.compressed_tokens > token_budget {
        let Some(dropped) = result.selected_facts.pop() else {
            break;
        };
        result.trimmed_facts.insert(0, dropped);
        let (context, breakdown) = render(profile, &result.selected_facts);
        result.stats.compressed_tokens = token::estimate_tokens(&context);
        result.stats.facts_selected = result.selected_facts.len();
        result.stats.ratio =
            CompressionStats::ratio_for(result.stats.original_tokens, result.stats.compressed_tokens);
        result.context = context;
        result.breakdown = breakdown;
    }
    result
}

/// Semantic dedup stage on its own: returns the surviving facts, highest
/// confidence first.
pub fn deduplicate(facts: &[Fact], threshold: f32) -> Vec<Fact> {
    dedup_indexed(facts, threshold)
        .into_iter()
        .map(|(_, f)| f.clone())
        .collect()
}

/// Render a profile and an already-selected fact list.
pub fn render(profile: &EntityProfile, selected: &[Fact]) -> (String, CompressionBreakdown) {
    let mut lines = Vec::new();
    let mut breakdown = CompressionBreakdown::default();

    let profile_line = render_profile(profile);
    breakdown.profile_tokens = token::estimate_tokens(&profile_line);
    lines.push(profile_line);

    if let Some(line) = render_qualifications(&profile.qualifications) {
        breakdown.qualification_tokens = token::estimate_tokens(&line);
        lines.push(line);
    }

    if let Some(line) = render_history(profile) {
        breakdown.history_tokens = token::estimate_tokens(&line);
        lines.push(line);
    }

    for fact in selected {
        let line = render_fact(fact);
        breakdown.fact_tokens += token::estimate_tokens(&line);
        lines.push(line);
    }

    (lines.join(LINE_SEPARATOR), breakdown)
}

/// One rendered fact line: `- [Label] content`.
pub fn render_fact(fact: &Fact) -> String {
    format!("- [{}] {}", fact.fact_type.label(), fact.content.trim())
}

// ── Stages ────────────────────────────────────────────────────────────────

fn dedup_indexed(facts: &[Fact], threshold: f32) -> Vec<(usize, &Fact)> {
    let mut ordered: Vec<(usize, &Fact)> = facts.iter().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| ia.cmp(ib))
    });

    let mut kept: Vec<(usize, &Fact, std::collections::BTreeSet<String>)> = Vec::new();
    for (idx, fact) in ordered {
        let tokens = tokenize(&fact.content);
        let duplicate = kept.iter().any(|(_, other, other_tokens)| {
            let score = if fact.content.trim().is_empty() || other.content.trim().is_empty() {
                0.0
            } else if fact.content == other.content {
                1.0
            } else {
                jaccard(&tokens, other_tokens)
            };
            score >= threshold
        });
        if !duplicate {
            kept.push((idx, fact, tokens));
        }
    }

    kept.into_iter().map(|(idx, fact, _)| (idx, fact)).collect()
}

fn select_indexed(mut candidates: Vec<(usize, &Fact)>, max_facts: usize) -> Vec<(usize, &Fact)> {
    candidates.sort_by(|(ia, a), (ib, b)| priority_order(*ia, a, *ib, b));
    candidates.truncate(max_facts);
    candidates
}

/// `(rank desc, confidence desc, input position asc)`.
fn priority_order(ia: usize, a: &Fact, ib: usize, b: &Fact) -> Ordering {
    b.fact_type
        .rank()
        .cmp(&a.fact_type.rank())
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| ia.cmp(&ib))
}

fn original_tokens(profile: &EntityProfile, facts: &[Fact]) -> usize {
    let serialized = serde_json::to_string(&(profile, facts)).unwrap_or_default();
    token::estimate_tokens(&serialized)
}

// ── Rendering ─────────────────────────────────────────────────────────────

fn render_profile(profile: &EntityProfile) -> String {
    let name = profile.name.trim();
    let mut parts = vec![if name.is_empty() {
        "Unnamed entity".to_string()
    } else {
        name.to_string()
    }];

    if let Some(industry) = profile.industry.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(industry.to_string());
    }
    if let Some(years) = profile.years_in_business {
        parts.push(format!("{years} years in business"));
    }
    if let Some(employees) = profile.employee_count {
        parts.push(format!("{employees} employees"));
    }
    if let Some(revenue) = profile.annual_revenue {
        parts.push(format!("revenue {revenue}"));
    }
    if let Some(region) = profile.region.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(region.to_string());
    }

    parts.join(" | ")
}

fn render_qualifications(qualifications: &[String]) -> Option<String> {
    let listed: Vec<&str> = qualifications
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .collect();
    if listed.is_empty() {
        return None;
    }

    let shown = listed.len().min(MAX_LISTED_QUALIFICATIONS);
    let mut line = format!("Qualifications: {}", listed[..shown].join(", "));
    if listed.len() > shown {
        line.push_str(&format!(" (+{} more)", listed.len() - shown));
    }
    Some(line)
}

fn render_history(profile: &EntityProfile) -> Option<String> {
    let history = profile.history?;
    let rate = history.success_rate_pct()?;
    Some(format!(
        "History: {}/{} applications selected ({rate}%)",
        history.successes.min(history.attempts),
        history.attempts
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use contexta_core::fact::{FactInput, FactSource, FactType};
    use contexta_core::profile::ApplicationHistory;

    // ── Helpers ────────────────────────────────────────────────────────

    fn fixed_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_790_000_000, 0).unwrap()
    }

    fn fact(id: &str, fact_type: FactType, content: &str, confidence: f32) -> Fact {
        Fact {
            id: id.into(),
            fact_type,
            content: content.into(),
            confidence,
            source: FactSource::UserInput,
            created_at: fixed_time(),
            expires_at: None,
            related_id: None,
        }
    }

    fn acme() -> EntityProfile {
        EntityProfile {
            name: "Acme".into(),
            years_in_business: Some(5),
            employee_count: Some(50),
            ..EntityProfile::default()
        }
    }

    fn config(max_facts: usize) -> CompressionConfig {
        CompressionConfig {
            max_facts,
            ..CompressionConfig::default()
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn scenario_rejection_pattern_beats_profile_fact() {
        let facts = vec![
            fact("f1", FactType::RejectionPattern, "기술성 평가 미달", 0.95),
            fact("f2", FactType::Profile, "기본 정보 보유", 1.0),
        ];

        let result = compress(&acme(), &facts, &config(1));

        assert_eq!(result.selected_facts.len(), 1);
        assert_eq!(result.selected_facts[0].id, "f1");
        assert!(result.context.contains("Acme"));
        assert!(result.context.contains("기술성 평가 미달"));
        assert!(!result.context.contains("기본 정보 보유"));
    }

    #[test]
    fn scenario_identical_contents_collapse_to_higher_confidence() {
        let facts = vec![
            fact("low", FactType::Insight, "AI 기술 역량 보유", 0.8),
            fact("high", FactType::Insight, "AI 기술 역량 보유", 0.9),
        ];

        let deduped = deduplicate(&facts, 0.85);

        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.9);
        assert_eq!(deduped[0].id, "high");
    }

    #[test]
    fn compression_is_idempotent() {
        let mut profile = acme();
        profile.qualifications = vec!["Venture certified".into(), "ISO 9001".into()];
        let facts = vec![
            fact("a", FactType::Insight, "Strong export record", 0.7),
            fact("b", FactType::SuccessPattern, "Clear market analysis", 0.7),
            fact("c", FactType::Insight, "Strong export record in Asia", 0.7),
        ];

        let first = compress(&profile, &facts, &CompressionConfig::default());
        let second = compress(&profile, &facts, &CompressionConfig::default());

        assert_eq!(first.context, second.context);
        assert_eq!(first.stats, second.stats);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_facts_render_profile_only() {
        let result = compress(&acme(), &[], &CompressionConfig::default());
        assert_eq!(result.context, "Acme | 5 years in business | 50 employees");
        assert!(result.selected_facts.is_empty());
        assert_eq!(result.stats.facts_in, 0);
        assert_eq!(result.breakdown.fact_tokens, 0);
    }

    #[test]
    fn single_fact_is_never_deduplicated_against_itself() {
        let facts = vec![fact("only", FactType::Insight, "Patent pending", 0.9)];
        let result = compress(&acme(), &facts, &CompressionConfig::default());
        assert_eq!(result.stats.facts_after_dedup, 1);
        assert_eq!(result.selected_facts.len(), 1);
    }

    #[test]
    fn max_facts_is_exact() {
        let facts: Vec<Fact> = (0..8)
            .map(|i| {
                fact(
                    &format!("f{i}"),
                    FactType::Insight,
                    &format!("distinct insight number{i} topic{i}"),
                    0.9,
                )
            })
            .collect();

        let result = compress(&acme(), &facts, &config(5));
        assert_eq!(result.stats.facts_after_dedup, 8);
        assert_eq!(result.selected_facts.len(), 5);

        let result = compress(&acme(), &facts[..3], &config(5));
        assert_eq!(result.selected_facts.len(), 3);
    }

    #[test]
    fn low_confidence_facts_are_filtered_after_dedup() {
        let facts = vec![
            fact("keep", FactType::Insight, "Owns a research lab", 0.6),
            fact("drop", FactType::RejectionPattern, "Missed the deadline", 0.3),
        ];
        let result = compress(&acme(), &facts, &CompressionConfig::default());
        assert_eq!(result.stats.facts_after_dedup, 2);
        assert_eq!(result.stats.facts_after_filter, 1);
        assert_eq!(result.selected_facts[0].id, "keep");
    }

    #[test]
    fn ties_break_on_input_order() {
        let facts = vec![
            fact("first", FactType::Constraint, "Seoul headquarters required", 0.8),
            fact("second", FactType::Constraint, "Under seven years since founding", 0.8),
        ];
        let result = compress(&acme(), &facts, &config(1));
        assert_eq!(result.selected_facts[0].id, "first");

        let reversed: Vec<Fact> = facts.into_iter().rev().collect();
        let result = compress(&acme(), &reversed, &config(1));
        assert_eq!(result.selected_facts[0].id, "second");
    }

    #[test]
    fn selection_orders_by_rank_then_confidence() {
        let facts = vec![
            fact("pref", FactType::Preference, "Prefers R&D grants", 0.99),
            fact("out_low", FactType::ApplicationOutcome, "TIPS: rejected", 0.7),
            fact("out_high", FactType::ApplicationOutcome, "Startup package: selected", 0.9),
            fact("rej", FactType::RejectionPattern, "Weak commercialization plan", 0.6),
        ];
        let result = compress(&acme(), &facts, &CompressionConfig::default());
        let ids: Vec<&str> = result.selected_facts.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["rej", "out_high", "out_low", "pref"]);
    }

    #[test]
    fn qualifications_are_capped() {
        let mut profile = acme();
        profile.qualifications = (1..=7).map(|i| format!("Cert {i}")).collect();
        let result = compress(&profile, &[], &CompressionConfig::default());
        assert!(
            result
                .context
                .contains("Qualifications: Cert 1, Cert 2, Cert 3, Cert 4 (+3 more)")
        );
        assert!(!result.context.contains("Cert 5"));
        assert!(result.breakdown.qualification_tokens > 0);
    }

    #[test]
    fn history_rendered_only_when_present() {
        let mut profile = acme();
        let result = compress(&profile, &[], &CompressionConfig::default());
        assert!(!result.context.contains("History"));

        profile.history = Some(ApplicationHistory {
            attempts: 4,
            successes: 1,
        });
        let result = compress(&profile, &[], &CompressionConfig::default());
        assert!(result.context.contains("History: 1/4 applications selected (25%)"));
        assert!(result.breakdown.history_tokens > 0);

        profile.history = Some(ApplicationHistory::default());
        let result = compress(&profile, &[], &CompressionConfig::default());
        assert!(!result.context.contains("History"));
    }

    #[test]
    fn redundant_input_compresses_at_least_half() {
        let mut profile = acme();
        profile.industry = Some("Software".into());
        profile.qualifications = vec![
            "Venture company certification".into(),
            "Venture company certification (renewed)".into(),
            "InnoBiz certification".into(),
            "InnoBiz certification (renewed)".into(),
            "Main-Biz certification".into(),
            "Corporate R&D center".into(),
            "Corporate R&D center (branch)".into(),
            "ISO 9001".into(),
        ];
        let base = FactInput::new(FactType::Insight, "AI 기술 역량 보유", 0.9);
        let facts: Vec<Fact> = (0..6)
            .map(|i| {
                let mut f = base.clone().into_fact(fixed_time());
                f.id = format!("dup-{i}");
                f.confidence = 0.9 - i as f32 * 0.05;
                f
            })
            .chain([fact("rej", FactType::RejectionPattern, "기술성 평가 미달", 0.95)])
            .collect();

        let result = compress(&profile, &facts, &CompressionConfig::default());

        assert_eq!(result.stats.facts_after_dedup, 2);
        assert!(result.stats.ratio >= 50, "ratio was {}", result.stats.ratio);
        assert!(result.stats.compressed_tokens < result.stats.original_tokens);
    }

    #[test]
    fn budget_trimming_drops_lowest_priority_first() {
        let facts = vec![
            fact("rej", FactType::RejectionPattern, "기술성 평가 미달", 0.95),
            fact("ins", FactType::Insight, "Strong engineering team", 0.9),
            fact("pro", FactType::Profile, "Located in Pangyo techno valley", 0.9),
        ];
        let full = compress(&acme(), &facts, &CompressionConfig::default());
        let profile_only = compress(&acme(), &[], &CompressionConfig::default());

        // Budget that fits everything except the last (lowest-priority) line.
        let budget = full.stats.compressed_tokens - 1;
        let trimmed = compress_within_budget(&acme(), &facts, &CompressionConfig::default(), budget);
        assert!(trimmed.stats.compressed_tokens <= budget);
        assert!(trimmed.context.contains("기술성 평가 미달"));
        assert!(!trimmed.context.contains("Pangyo"));
        assert_eq!(trimmed.stats.facts_selected, trimmed.selected_facts.len());
        let trimmed_ids: Vec<&str> = trimmed.trimmed_facts.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(trimmed_ids, vec!["pro"]);

        // A budget below the profile line drops every fact and stops.
        let starved = compress_within_budget(&acme(), &facts, &CompressionConfig::default(), 1);
        assert!(starved.selected_facts.is_empty());
        let starved_ids: Vec<&str> = starved.trimmed_facts.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(starved_ids, vec!["rej", "ins", "pro"]);
        assert_eq!(starved.context, profile_only.context);
    }

    #[test]
    fn fact_lines_use_type_labels() {
        let facts = vec![fact("c", FactType::Constraint, "  Must be SME  ", 0.9)];
        let result = compress(&acme(), &facts, &CompressionConfig::default());
        assert!(result.context.ends_with("- [constraint] Must be SME"));
    }
}
