//! `contexta compress` — Compress a profile and facts from a JSON file.

use chrono::Utc;
use contexta_core::fact::{Fact, FactInput};
use contexta_core::profile::EntityProfile;
use contexta_engine::compression;
use serde::Deserialize;

use super::{CmdResult, load_config};
use crate::CompressArgs;

#[derive(Deserialize)]
struct CompressInput {
    profile: EntityProfile,
    #[serde(default)]
    facts: Vec<FactInput>,
}

pub async fn run(args: CompressArgs) -> CmdResult {
    let config = load_config()?;
    let mut settings = config.compression;
    if let Some(max) = args.max_facts {
        settings.max_facts = max;
    }
    if let Some(min) = args.min_confidence {
        settings.min_confidence = min;
    }
    if let Some(threshold) = args.threshold {
        settings.dedup_threshold = threshold;
    }

    let raw = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("Failed to read {}: {e}", args.file.display()))?;
    let input: CompressInput = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid input in {}: {e}", args.file.display()))?;

    let now = Utc::now();
    let mut facts: Vec<Fact> = Vec::with_capacity(input.facts.len());
    for (i, fact) in input.facts.into_iter().enumerate() {
        fact.validate().map_err(|e| format!("fact #{i}: {e}"))?;
        facts.push(fact.into_fact(now));
    }

    let result = match args.budget {
        Some(budget) => compression::compress_within_budget(&input.profile, &facts, &settings, budget),
        None => compression::compress(&input.profile, &facts, &settings),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let stats = &result.stats;
    println!("{}", result.context);
    println!();
    println!(
        "🗜️  {} → {} tokens ({}% smaller)",
        stats.original_tokens, stats.compressed_tokens, stats.ratio
    );
    println!(
        "   facts: {} in, {} after dedup, {} after filter, {} selected",
        stats.facts_in, stats.facts_after_dedup, stats.facts_after_filter, stats.facts_selected
    );
    if !result.trimmed_facts.is_empty() {
        println!("   {} fact(s) trimmed to fit the budget", result.trimmed_facts.len());
    }
    Ok(())
}
