//! `contexta domains` / `contexta route` — Inspect domain knowledge.

use contexta_engine::DomainRegistry;

use super::{CmdResult, load_config};

pub async fn list() -> CmdResult {
    let config = load_config()?;
    let registry = DomainRegistry::from_config(&config.domains);

    println!("📚 Domains ({})", registry.len());
    for domain in registry.list() {
        println!(
            "  {:<18} {:<32} budget={:<5} seeds={}",
            domain.domain_id,
            domain.name,
            domain.token_budget,
            domain.seed_facts.len()
        );
        if !domain.keywords.is_empty() {
            println!("  {:<18} keywords: {}", "", domain.keywords.join(", "));
        }
    }
    Ok(())
}

pub async fn route(text: &str) -> CmdResult {
    let config = load_config()?;
    let registry = DomainRegistry::from_config(&config.domains);

    let matches = registry.match_by_keywords(text);
    if matches.is_empty() {
        match &config.default_domain {
            Some(default) => println!("No keyword match; default domain is {default}"),
            None => println!("No keyword match and no default domain configured"),
        }
        return Ok(());
    }

    for (i, m) in matches.iter().enumerate() {
        println!(
            "  {:>2}. {:<18} score={:.2}  matched: {}",
            i + 1,
            m.domain_id,
            m.score,
            m.matched.join(", ")
        );
    }
    Ok(())
}
