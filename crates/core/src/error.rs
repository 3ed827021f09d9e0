//! Error types for the Contexta domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Write-style operations fail loudly with these variants; read-style
//! operations degrade to empty results instead of erroring.

use thiserror::Error;

/// The top-level error type for all Contexta operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors (fatal, never retried) ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    // --- Missing entity / session on a write-style call ---
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    // --- Rejected input, nothing was stored ---
    #[error("Validation failed: {0}")]
    Validation(String),

    // --- Create on an existing entity when overwrite is disabled ---
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    // --- Persistence backend errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a missing entity.
    pub fn entity_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Entity,
            id: id.into(),
        }
    }

    /// Shorthand for a missing or expired session.
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Session,
            id: id.into(),
        }
    }

    /// Only backend failures are worth retrying; everything else is
    /// deterministic and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// What kind of resource a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Entity,
    Session,
    Fact,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Entity => "Entity",
            Self::Session => "Session",
            Self::Fact => "Fact",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted block for {key}: {reason}")]
    Corrupted { key: String, reason: String },
}
