//! Session message and active-document value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System notes injected by the host application
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A single message in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// One-line rendering used in the session layer.
    pub fn render(&self) -> String {
        format!("{}: {}", self.role.as_str(), self.content)
    }
}

/// The document the user is currently working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDocument {
    pub document_id: String,
    pub title: String,
    /// Section currently being edited, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl ActiveDocument {
    pub fn new(document_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            title: title.into(),
            section: None,
        }
    }

    pub fn render(&self) -> String {
        match &self.section {
            Some(section) => format!("{} (section: {})", self.title, section),
            None => self.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_render() {
        let msg = Message::new(Role::User, "사업계획서 검토해줘", Utc::now());
        assert_eq!(msg.render(), "user: 사업계획서 검토해줘");
    }

    #[test]
    fn document_render_includes_section() {
        let mut doc = ActiveDocument::new("doc-1", "Business Plan");
        assert_eq!(doc.render(), "Business Plan");
        doc.section = Some("Market Analysis".into());
        assert_eq!(doc.render(), "Business Plan (section: Market Analysis)");
    }
}
