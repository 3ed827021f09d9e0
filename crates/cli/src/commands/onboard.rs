//! `contexta onboard` — First-time setup.

use contexta_config::EngineConfig;

use super::CmdResult;

pub async fn run() -> CmdResult {
    let config_dir = EngineConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Contexta — First-Time Setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let config = if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        EngineConfig::load_from(&config_path).map_err(|e| format!("Failed to load config: {e}"))?
    } else {
        std::fs::write(&config_path, EngineConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        EngineConfig::default()
    };

    let store_path = config.store.resolved_path();
    if let Some(parent) = store_path.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
        println!("✅ Created memory directory: {}", parent.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. contexta entity create acme --name Acme --years 5 --employees 50");
    println!("   2. contexta entity add-fact acme -t constraint -c \"SME only\"");
    println!("   3. contexta assemble --domain government_rnd --entity acme\n");

    Ok(())
}
