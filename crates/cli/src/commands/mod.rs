//! Subcommand implementations.

pub mod assemble;
pub mod compress;
pub mod domains;
pub mod entity;
pub mod onboard;
pub mod status;

use contexta_config::EngineConfig;
use contexta_engine::ContextAssembler;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    Ok(EngineConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build the full engine over the configured block store.
pub fn open_engine(config: &EngineConfig) -> Result<ContextAssembler, Box<dyn std::error::Error>> {
    let store = contexta_memory::open_store(&config.store)?;
    tracing::debug!(backend = store.name(), "Opened block store");
    Ok(ContextAssembler::from_config(config, store)?)
}
