//! `contexta status` — Show the effective configuration.

use contexta_config::{CreatePolicy, EngineConfig, StoreBackend};
use contexta_engine::DomainRegistry;

use super::{CmdResult, load_config};

pub async fn run() -> CmdResult {
    let config = load_config()?;
    let domains = DomainRegistry::from_config(&config.domains);

    let backend = match config.store.backend {
        StoreBackend::Memory => "memory (not persisted)".to_string(),
        StoreBackend::File => format!("file ({})", config.store.resolved_path().display()),
    };
    let on_create = match config.store.on_existing_create {
        CreatePolicy::Overwrite => "overwrite",
        CreatePolicy::Reject => "reject",
    };

    println!("Contexta Status");
    println!("===============");
    println!("  Config dir:     {}", EngineConfig::config_dir().display());
    println!("  Store:          {backend}");
    println!("  Existing ids:   {on_create}");
    println!(
        "  Compression:    threshold={:.2}, min_confidence={:.2}, max_facts={}",
        config.compression.dedup_threshold,
        config.compression.min_confidence,
        config.compression.max_facts
    );
    println!(
        "  Budget split:   domain={}%, entity={}%, session={}%, headroom={}%",
        config.budget.domain_pct,
        config.budget.entity_pct,
        config.budget.session_pct,
        config.budget.headroom_pct()
    );
    println!(
        "  Sessions:       ttl={}s, max_messages={}",
        config.session.ttl_secs, config.session.max_messages
    );
    println!("  Domains:        {}", domains.len());
    if let Some(default) = &config.default_domain {
        println!("  Default domain: {default}");
    }

    let config_path = EngineConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `contexta onboard` first");
    }

    Ok(())
}
