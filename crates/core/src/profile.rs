//! Entity profile — structured identity, scale, qualifications and history.
//!
//! Profiles are replaced wholesale on update, never diffed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    /// Display name of the entity (company, applicant, ...)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_in_business: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u32>,

    /// Annual revenue in the entity's reporting currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_revenue: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Certifications, registrations, patents, ...
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifications: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<ApplicationHistory>,
}

impl EntityProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Track record of past applications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationHistory {
    pub attempts: u32,
    pub successes: u32,
}

impl ApplicationHistory {
    /// Success rate in whole percent, `None` when nothing was attempted.
    pub fn success_rate_pct(&self) -> Option<u32> {
        if self.attempts == 0 {
            return None;
        }
        let rate = f64::from(self.successes.min(self.attempts)) / f64::from(self.attempts);
        Some((rate * 100.0).round() as u32)
    }
}
