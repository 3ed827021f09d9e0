//! Facts — atomic, typed, confidence-scored knowledge about an entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The category of a fact. Each category has a fixed selection rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    /// Why past applications were rejected. Highest priority.
    RejectionPattern,
    /// The result of a concrete application.
    ApplicationOutcome,
    /// What worked in past applications.
    SuccessPattern,
    /// Hard limits (eligibility, deadlines, exclusions).
    Constraint,
    Preference,
    Qualification,
    Insight,
    /// Generic profile information. Lowest priority.
    Profile,
}

impl FactType {
    /// All fact types, highest rank first.
    pub const ALL: [FactType; 8] = [
        Self::RejectionPattern,
        Self::ApplicationOutcome,
        Self::SuccessPattern,
        Self::Constraint,
        Self::Preference,
        Self::Qualification,
        Self::Insight,
        Self::Profile,
    ];

    /// Static selection rank. Higher is selected first.
    pub const fn rank(self) -> u8 {
        match self {
            Self::RejectionPattern => 100,
            Self::ApplicationOutcome => 90,
            Self::SuccessPattern => 80,
            Self::Constraint => 70,
            Self::Preference => 60,
            Self::Qualification => 50,
            Self::Insight => 40,
            Self::Profile => 10,
        }
    }

    /// Human-readable label used when rendering facts.
    pub const fn label(self) -> &'static str {
        match self {
            Self::RejectionPattern => "rejection pattern",
            Self::ApplicationOutcome => "application outcome",
            Self::SuccessPattern => "success pattern",
            Self::Constraint => "constraint",
            Self::Preference => "preference",
            Self::Qualification => "qualification",
            Self::Insight => "insight",
            Self::Profile => "profile",
        }
    }
}

impl std::str::FromStr for FactType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| {
                let snake = t.label().replace(' ', "_");
                s.eq_ignore_ascii_case(&snake) || s.eq_ignore_ascii_case(t.label())
            })
            .ok_or_else(|| Error::Validation(format!("unknown fact type: {s}")))
    }
}

/// Where a fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    #[default]
    UserInput,
    Document,
    /// Derived from a workflow event (see [`crate::event::LearningEvent`]).
    Event,
    /// Seeded from domain knowledge when the entity was created.
    DomainSeed,
    Inferred,
}

/// A stored fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Unique within the owning block
    pub id: String,

    #[serde(rename = "type")]
    pub fact_type: FactType,

    pub content: String,

    /// Always within [0, 1]
    pub confidence: f32,

    #[serde(default)]
    pub source: FactSource,

    pub created_at: DateTime<Utc>,

    /// Facts past this instant are removed by `cleanup_expired_facts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Optional link to an external record (program, document, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
}

impl Fact {
    /// Whether this fact has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// Caller-supplied data for a new fact. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactInput {
    #[serde(rename = "type")]
    pub fact_type: FactType,
    pub content: String,
    pub confidence: f32,
    #[serde(default)]
    pub source: FactSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
}

impl FactInput {
    pub fn new(fact_type: FactType, content: impl Into<String>, confidence: f32) -> Self {
        Self {
            fact_type,
            content: content.into(),
            confidence,
            source: FactSource::default(),
            expires_at: None,
            related_id: None,
        }
    }

    pub fn with_source(mut self, source: FactSource) -> Self {
        self.source = source;
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn related_to(mut self, related_id: impl Into<String>) -> Self {
        self.related_id = Some(related_id.into());
        self
    }

    /// Reject out-of-range confidence and blank content.
    pub fn validate(&self) -> Result<()> {
        validate_parts(&self.content, self.confidence)
    }

    /// Turn this input into a stored fact with a fresh id.
    pub fn into_fact(self, created_at: DateTime<Utc>) -> Fact {
        Fact {
            id: Uuid::new_v4().to_string(),
            fact_type: self.fact_type,
            content: self.content,
            confidence: self.confidence,
            source: self.source,
            created_at,
            expires_at: self.expires_at,
            related_id: self.related_id,
        }
    }
}

/// Validate an already-built fact (used when a caller replaces the whole list).
pub fn validate_fact(fact: &Fact) -> Result<()> {
    if fact.id.trim().is_empty() {
        return Err(Error::Validation("fact id must not be empty".into()));
    }
    validate_parts(&fact.content, fact.confidence)
}

fn validate_parts(content: &str, confidence: f32) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("fact content must not be empty".into()));
    }
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(Error::Validation(format!(
            "fact confidence must be within [0, 1], got {confidence}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_pattern_outranks_everything() {
        for t in FactType::ALL.iter().skip(1) {
            assert!(FactType::RejectionPattern.rank() > t.rank(), "{t:?}");
        }
        assert_eq!(
            FactType::ALL.iter().map(|t| t.rank()).min(),
            Some(FactType::Profile.rank())
        );
    }

    #[test]
    fn all_is_sorted_by_rank() {
        let ranks: Vec<u8> = FactType::ALL.iter().map(|t| t.rank()).collect();
        let mut sorted = ranks.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn fact_type_parses_snake_and_label() {
        assert_eq!(
            "rejection_pattern".parse::<FactType>().unwrap(),
            FactType::RejectionPattern
        );
        assert_eq!(
            "Success Pattern".parse::<FactType>().unwrap(),
            FactType::SuccessPattern
        );
        assert!("nonsense".parse::<FactType>().is_err());
    }

    #[test]
    fn validation_rejects_bad_input() {
        assert!(FactInput::new(FactType::Insight, "ok", 0.5).validate().is_ok());
        assert!(FactInput::new(FactType::Insight, "ok", 0.0).validate().is_ok());
        assert!(FactInput::new(FactType::Insight, "ok", 1.0).validate().is_ok());
        assert!(FactInput::new(FactType::Insight, "   ", 0.5).validate().is_err());
        assert!(FactInput::new(FactType::Insight, "ok", 1.01).validate().is_err());
        assert!(FactInput::new(FactType::Insight, "ok", -0.1).validate().is_err());
        assert!(FactInput::new(FactType::Insight, "ok", f32::NAN).validate().is_err());
    }

    #[test]
    fn serializes_type_field_in_snake_case() {
        let fact = FactInput::new(FactType::RejectionPattern, "기술성 평가 미달", 0.95)
            .into_fact(Utc::now());
        let json = serde_json::to_string(&fact).unwrap();
        assert!(json.contains("\"type\":\"rejection_pattern\""));
        assert!(!json.contains("expires_at"));
        assert!(!json.contains("related_id"));
    }

    #[test]
    fn expiry_is_strict() {
        let now = Utc::now();
        let fact = FactInput::new(FactType::Constraint, "deadline", 0.9)
            .expiring_at(now)
            .into_fact(now);
        assert!(!fact.is_expired(now));
        assert!(fact.is_expired(now + chrono::Duration::seconds(1)));
    }
}
