//! Configuration loading, validation, and management for Contexta.
//!
//! Loads configuration from `~/.contexta/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use contexta_core::fact::FactInput;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.contexta/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Domain used when free-text routing finds no keyword match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_domain: Option<String>,

    /// Fact deduplication, filtering and selection
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Per-layer token budget split
    #[serde(default)]
    pub budget: BudgetSplit,

    /// Session TTL and bounds
    #[serde(default)]
    pub session: SessionConfig,

    /// Entity memory persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Extra domains (override built-ins with the same id)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<DomainConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Facts at or above this Jaccard similarity to a kept fact are dropped
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,

    /// Facts below this confidence are dropped
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Maximum number of facts rendered
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
}

fn default_dedup_threshold() -> f32 {
    0.85
}
fn default_min_confidence() -> f32 {
    0.5
}
fn default_max_facts() -> usize {
    5
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: default_dedup_threshold(),
            min_confidence: default_min_confidence(),
            max_facts: default_max_facts(),
        }
    }
}

/// Percentages of the total budget given to each layer. Whatever is not
/// handed out stays as headroom for instruction/system tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSplit {
    #[serde(default = "default_domain_pct")]
    pub domain_pct: u8,
    #[serde(default = "default_entity_pct")]
    pub entity_pct: u8,
    #[serde(default = "default_session_pct")]
    pub session_pct: u8,
}

fn default_domain_pct() -> u8 {
    20
}
fn default_entity_pct() -> u8 {
    50
}
fn default_session_pct() -> u8 {
    20
}

impl BudgetSplit {
    /// Percentage left unallocated.
    pub fn headroom_pct(&self) -> u8 {
        100u8.saturating_sub(self.allocated_pct())
    }

    fn allocated_pct(&self) -> u8 {
        self.domain_pct
            .saturating_add(self.entity_pct)
            .saturating_add(self.session_pct)
    }
}

impl Default for BudgetSplit {
    fn default() -> Self {
        Self {
            domain_pct: default_domain_pct(),
            entity_pct: default_entity_pct(),
            session_pct: default_session_pct(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sliding time-to-live in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Oldest messages are dropped beyond this count
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Run a background sweep of expired sessions at this interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,
}

fn default_ttl_secs() -> u64 {
    1800
}
fn default_max_messages() -> usize {
    20
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_messages: default_max_messages(),
            sweep_interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Lost when the process exits
    Memory,
    /// JSON-lines file
    #[default]
    File,
}

/// What `create` does when the entity already has a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatePolicy {
    /// Replace the existing block
    #[default]
    Overwrite,
    /// Fail with `AlreadyExists`
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// File backend location (default: `~/.contexta/memory/blocks.jsonl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub on_existing_create: CreatePolicy,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| EngineConfig::config_dir().join("memory").join("blocks.jsonl"))
    }
}

/// A knowledge domain declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Static knowledge injected into every assembly for this domain
    pub knowledge: String,

    /// Keywords for free-text routing
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Recommended total token budget
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Facts seeded into new entities created for this domain
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed_facts: Vec<FactInput>,
}

fn default_token_budget() -> usize {
    2000
}

impl EngineConfig {
    /// Load configuration from the default location.
    ///
    /// Priority: environment variables > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(ttl) = std::env::var("CONTEXTA_SESSION_TTL_SECS") {
            self.session.ttl_secs = ttl.parse().map_err(|_| {
                ConfigError::ValidationError(format!("CONTEXTA_SESSION_TTL_SECS is not a number: {ttl}"))
            })?;
        }

        if let Ok(max) = std::env::var("CONTEXTA_MAX_FACTS") {
            self.compression.max_facts = max.parse().map_err(|_| {
                ConfigError::ValidationError(format!("CONTEXTA_MAX_FACTS is not a number: {max}"))
            })?;
        }

        if let Ok(path) = std::env::var("CONTEXTA_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contexta")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.compression;
        if !(0.0..=1.0).contains(&c.dedup_threshold) {
            return Err(ConfigError::ValidationError(
                "compression.dedup_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.min_confidence) {
            return Err(ConfigError::ValidationError(
                "compression.min_confidence must be between 0.0 and 1.0".into(),
            ));
        }
        if c.max_facts == 0 {
            return Err(ConfigError::ValidationError(
                "compression.max_facts must be > 0".into(),
            ));
        }

        let b = &self.budget;
        let allocated =
            u16::from(b.domain_pct) + u16::from(b.entity_pct) + u16::from(b.session_pct);
        if allocated > 100 {
            return Err(ConfigError::ValidationError(format!(
                "budget split allocates {allocated}% (must be <= 100)"
            )));
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_secs must be > 0".into(),
            ));
        }
        if self.session.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_messages must be > 0".into(),
            ));
        }
        if self.session.sweep_interval_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "session.sweep_interval_secs must be > 0 when set".into(),
            ));
        }

        for domain in &self.domains {
            if domain.id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "domain id must not be empty".into(),
                ));
            }
            if domain.token_budget == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "domain '{}' must have a token_budget > 0",
                    domain.id
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for contexta_core::Error {
    fn from(err: ConfigError) -> Self {
        contexta_core::Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contexta_core::fact::FactType;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.compression.dedup_threshold, 0.85);
        assert_eq!(config.compression.min_confidence, 0.5);
        assert_eq!(config.compression.max_facts, 5);
        assert_eq!(config.session.ttl_secs, 1800);
        assert_eq!(config.budget.headroom_pct(), 10);
        assert_eq!(config.store.on_existing_create, CreatePolicy::Overwrite);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.compression, config.compression);
        assert_eq!(parsed.budget, config.budget);
        assert_eq!(parsed.session, config.session);
    }

    #[test]
    fn invalid_threshold_rejected() {
        let mut config = EngineConfig::default();
        config.compression.dedup_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_facts_rejected() {
        let mut config = EngineConfig::default();
        config.compression.max_facts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn over_allocated_split_rejected() {
        let mut config = EngineConfig::default();
        config.budget.session_pct = 40;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("110%"));
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut config = EngineConfig::default();
        config.session.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = EngineConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().compression.max_facts, 5);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_domain = "manufacturing"

[compression]
max_facts = 3

[store]
backend = "memory"
on_existing_create = "reject"
"#,
        )
        .unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.compression.max_facts, 3);
        assert_eq!(config.compression.dedup_threshold, 0.85);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.on_existing_create, CreatePolicy::Reject);
        assert_eq!(config.default_domain.as_deref(), Some("manufacturing"));
    }

    #[test]
    fn unparsable_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "compression = 12").unwrap();
        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn domain_config_parsing() {
        let toml_str = r#"
[[domains]]
id = "fintech"
name = "Fintech"
knowledge = "Electronic financial transactions require registration."
keywords = ["fintech", "payment", "핀테크"]
token_budget = 1500

[[domains.seed_facts]]
type = "constraint"
content = "Electronic finance registration required"
confidence = 0.9
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.domains.len(), 1);
        let domain = &config.domains[0];
        assert_eq!(domain.keywords.len(), 3);
        assert_eq!(domain.token_budget, 1500);
        assert_eq!(domain.seed_facts[0].fact_type, FactType::Constraint);
    }

    #[test]
    fn domain_with_zero_budget_rejected() {
        let config = EngineConfig {
            domains: vec![DomainConfig {
                id: "x".into(),
                name: "X".into(),
                knowledge: "k".into(),
                keywords: vec![],
                token_budget: 0,
                seed_facts: vec![],
            }],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_error_maps_to_configuration() {
        let err: contexta_core::Error = ConfigError::ValidationError("bad".into()).into();
        assert!(matches!(err, contexta_core::Error::Configuration(_)));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = EngineConfig::default_toml();
        assert!(toml_str.contains("dedup_threshold"));
        assert!(toml_str.contains("ttl_secs = 1800"));
    }
}
