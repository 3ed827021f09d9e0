//! `contexta entity` — Entity memory management.

use chrono::{DateTime, Utc};
use contexta_core::event::LearningEvent;
use contexta_core::fact::{FactInput, FactType};
use contexta_core::profile::EntityProfile;

use super::{CmdResult, load_config, open_engine};
use crate::EntityCreateArgs;

pub async fn create(args: EntityCreateArgs) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    let profile = match &args.profile {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            serde_json::from_str::<EntityProfile>(&raw)
                .map_err(|e| format!("Invalid profile in {}: {e}", path.display()))?
        }
        None => EntityProfile {
            name: args.name.clone().unwrap_or_else(|| args.id.clone()),
            industry: args.industry.clone(),
            years_in_business: args.years,
            employee_count: args.employees,
            annual_revenue: args.revenue,
            region: args.region.clone(),
            qualifications: args.qualifications.clone(),
            history: None,
        },
    };

    let block = match &args.domain {
        Some(domain_id) => {
            let domain = engine.domains().lookup(domain_id)?;
            engine
                .entities()
                .create_seeded(&args.id, profile, &domain)
                .await?
        }
        None => engine.entities().create(&args.id, profile).await?,
    };

    println!(
        "✅ Created entity {} ({} seed fact(s))",
        block.entity_id,
        block.facts.len()
    );
    Ok(())
}

pub async fn show(id: &str, json: bool) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    let Some(block) = engine.entities().get(id).await? else {
        println!("No entity named {id}");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&block)?);
        return Ok(());
    }

    println!("🏢 {} ({})", block.profile.name, block.entity_id);
    println!("   updated: {}", block.updated_at.to_rfc3339());
    println!("   facts:   {}", block.facts.len());
    for fact in &block.facts {
        let expiry = fact
            .expires_at
            .map(|t| format!(" (expires {})", t.to_rfc3339()))
            .unwrap_or_default();
        println!(
            "   - {} [{}] {:.2} {}{expiry}",
            fact.id,
            fact.fact_type.label(),
            fact.confidence,
            fact.content
        );
    }

    let context = engine.entities().get_compressed_context(id, None).await?;
    let stats = block.compression_stats;
    println!("\n{context}");
    println!(
        "\n🗜️  {} → {} tokens ({}% smaller)",
        stats.original_tokens, stats.compressed_tokens, stats.ratio
    );
    Ok(())
}

pub async fn add_fact(
    id: &str,
    fact_type: &str,
    content: String,
    confidence: f32,
    expires: Option<&str>,
) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    let fact_type: FactType = fact_type.parse()?;
    let mut input = FactInput::new(fact_type, content, confidence);
    if let Some(raw) = expires {
        let at = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| format!("Invalid expiry '{raw}': {e}"))?
            .with_timezone(&Utc);
        input = input.expiring_at(at);
    }

    let fact = engine.entities().add_fact(id, input).await?;
    println!("✅ Added fact {} to {id}", fact.id);
    Ok(())
}

pub async fn remove_fact(id: &str, fact_id: &str) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    if engine.entities().remove_fact(id, fact_id).await? {
        println!("🗑️  Removed fact {fact_id}");
    } else {
        println!("No fact {fact_id} on {id}");
    }
    Ok(())
}

pub async fn learn(id: &str, event: &str) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    let event: LearningEvent =
        serde_json::from_str(event).map_err(|e| format!("Invalid event: {e}"))?;
    match engine.entities().learn_from_event(id, &event).await {
        Some(fact) => println!(
            "🧠 Learned [{}] {}",
            fact.fact_type.label(),
            fact.content
        ),
        None => println!("Nothing learned (unknown entity {id}?)"),
    }
    Ok(())
}

pub async fn cleanup(id: &str) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    let removed = engine.entities().cleanup_expired_facts(id).await?;
    println!("🧹 Removed {removed} expired fact(s) from {id}");
    Ok(())
}

pub async fn delete(id: &str) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    if engine.entities().delete(id).await? {
        println!("🗑️  Deleted {id}");
    } else {
        println!("No entity named {id}");
    }
    Ok(())
}
