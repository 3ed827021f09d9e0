//! Learning events — structured signals from external workflows.
//!
//! An event (application outcome, detected failure pattern) is turned into
//! exactly one fact. Delivery mechanism is up to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fact::{FactInput, FactSource, FactType};

/// Result of a submitted application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Selected,
    Rejected,
    Withdrawn,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }
}

/// All events the entity memory store can learn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningEvent {
    /// An application finished with a known outcome
    ApplicationOutcome {
        program: String,
        outcome: Outcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        program_id: Option<String>,
    },

    /// A recurring weakness was detected across submissions
    FailurePattern {
        pattern: String,
        #[serde(default = "default_occurrences")]
        occurrences: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        program_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
}

fn default_occurrences() -> u32 {
    1
}

impl LearningEvent {
    /// Event kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApplicationOutcome { .. } => "application_outcome",
            Self::FailurePattern { .. } => "failure_pattern",
        }
    }

    /// Derive the single fact this event contributes.
    ///
    /// Failure-pattern confidence grows with repeat occurrences:
    /// `0.6` for one sighting, `+0.1` per repeat, capped at `0.95`.
    pub fn to_fact_input(&self) -> FactInput {
        match self {
            Self::ApplicationOutcome {
                program,
                outcome,
                reason,
                program_id,
            } => {
                let content = match reason {
                    Some(r) if !r.trim().is_empty() => {
                        format!("{program}: {} ({})", outcome.label(), r.trim())
                    }
                    _ => format!("{program}: {}", outcome.label()),
                };
                let mut input = FactInput::new(FactType::ApplicationOutcome, content, 1.0)
                    .with_source(FactSource::Event);
                input.related_id = program_id.clone();
                input
            }
            Self::FailurePattern {
                pattern,
                occurrences,
                program_id,
                expires_at,
            } => {
                let repeats = occurrences.saturating_sub(1).min(10) as f32;
                let confidence = (0.6 + 0.1 * repeats).min(0.95);
                let mut input = FactInput::new(FactType::RejectionPattern, pattern.clone(), confidence)
                    .with_source(FactSource::Event);
                input.related_id = program_id.clone();
                input.expires_at = *expires_at;
                input
            }
        }
    }
}
