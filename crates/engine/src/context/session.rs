//! Session context — ephemeral conversation and task state with a sliding TTL.
//!
//! Sessions are:
//!
//! - **Ephemeral**: never persisted, gone once `expires_at` passes
//! - **Sliding**: every mutation pushes `expires_at` out by the TTL
//! - **Bounded**: only the newest `max_messages` messages are retained
//! - **Lazily expired**: reads treat `now >= expires_at` as absent; an
//!   optional sweeper reclaims memory under the same lock

use chrono::{DateTime, Duration, Utc};
use contexta_config::SessionConfig;
use contexta_core::clock::{Clock, SystemClock};
use contexta_core::error::{Error, Result};
use contexta_core::message::{ActiveDocument, Message, Role};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::token;

/// Header of the rendered session section.
pub const SESSION_HEADER: &str = "[Session]";

/// Upper bound on the TTL (ten years) so expiry arithmetic cannot overflow.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

// ── Data Structures ───────────────────────────────────────────────────────

/// State of one live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,

    /// Oldest first
    pub messages: VecDeque<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_document: Option<ActiveDocument>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionContext {
    /// Readable only while `now < expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.intent.is_none() && self.active_document.is_none()
    }
}

/// A session rendered into a bounded text section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRender {
    /// Empty when nothing fits or there is nothing to say
    pub text: String,
    pub tokens: usize,
    pub messages_included: usize,
    pub messages_dropped: usize,
}

// ── Rendering ─────────────────────────────────────────────────────────────

/// Render a session section that fits in `budget` tokens.
///
/// Session text is never compressed. When over budget the oldest messages
/// are dropped first; if the section still does not fit, nothing is rendered.
pub fn render_within_budget(session: &SessionContext, budget: usize) -> SessionRender {
    let total_messages = session.messages.len();
    if session.is_empty() {
        return SessionRender::default();
    }

    let mut head = vec![SESSION_HEADER.to_string()];
    if let Some(intent) = &session.intent {
        head.push(format!("Intent: {intent}"));
    }
    if let Some(doc) = &session.active_document {
        head.push(format!("Active document: {}", doc.render()));
    }

    let message_lines: Vec<String> = session.messages.iter().map(Message::render).collect();

    // Drop from the front (oldest) until the section fits.
    for skip in 0..=message_lines.len() {
        let kept = &message_lines[skip..];
        let mut lines = head.clone();
        if !kept.is_empty() {
            lines.push("Recent messages:".to_string());
            lines.extend(kept.iter().cloned());
        }
        if lines.len() == 1 {
            // Header alone carries no information.
            break;
        }
        let tokens = token::estimate_lines_tokens(&lines);
        if tokens <= budget {
            return SessionRender {
                text: lines.join("\n"),
                tokens,
                messages_included: kept.len(),
                messages_dropped: skip,
            };
        }
    }

    SessionRender {
        messages_dropped: total_messages,
        ..SessionRender::default()
    }
}

// ── Manager ───────────────────────────────────────────────────────────────

/// Owns all live sessions. Construct one and share it by `Arc`.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionContext>>,
    ttl: Duration,
    max_messages: usize,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl_secs = config.ttl_secs.min(MAX_TTL_SECS) as i64;
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs),
            max_messages: config.max_messages.max(1),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start (or restart) a session. Any previous state under the id is discarded.
    pub async fn create(
        &self,
        session_id: &str,
        entity_id: Option<String>,
        domain_id: Option<String>,
    ) -> SessionContext {
        let now = self.clock.now();
        let session = SessionContext {
            session_id: session_id.to_string(),
            entity_id,
            domain_id,
            messages: VecDeque::new(),
            intent: None,
            active_document: None,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), session.clone());
        debug!(session_id, "Session created");
        session
    }

    /// A snapshot of the session, or `None` if it is missing or expired.
    pub async fn get(&self, session_id: &str) -> Option<SessionContext> {
        let sessions = self.sessions.read().await;
        let now = self.clock.now();
        sessions
            .get(session_id)
            .filter(|s| !s.is_expired(now))
            .cloned()
    }

    /// Append a message, dropping the oldest beyond the configured bound.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Result<()> {
        let content = content.into();
        let max_messages = self.max_messages;
        self.mutate(session_id, move |session, now| {
            session.messages.push_back(Message::new(role, content, now));
            while session.messages.len() > max_messages {
                session.messages.pop_front();
            }
        })
        .await
    }

    pub async fn set_intent(&self, session_id: &str, intent: impl Into<String>) -> Result<()> {
        let intent = intent.into();
        self.mutate(session_id, move |session, _| session.intent = Some(intent))
            .await
    }

    /// Set or clear the document being worked on.
    pub async fn set_active_document(
        &self,
        session_id: &str,
        document: Option<ActiveDocument>,
    ) -> Result<()> {
        self.mutate(session_id, move |session, _| {
            session.active_document = document
        })
        .await
    }

    /// Extend the TTL without changing anything else.
    pub async fn touch(&self, session_id: &str) -> Result<()> {
        self.mutate(session_id, |_, _| {}).await
    }

    /// End a session explicitly. Returns whether a live session was removed.
    pub async fn end(&self, session_id: &str) -> bool {
        let now = self.clock.now();
        self.sessions
            .write()
            .await
            .remove(session_id)
            .is_some_and(|s| !s.is_expired(now))
    }

    /// Remove every expired session. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = self.clock.now();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }

    /// Live (unexpired) sessions.
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        let now = self.clock.now();
        sessions.values().filter(|s| !s.is_expired(now)).count()
    }

    /// Stored sessions, including expired ones not yet swept.
    pub async fn stored_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Periodically sweep expired sessions in the background.
    ///
    /// The task stops on its own once the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let removed = manager.sweep_expired().await;
                if removed > 0 {
                    debug!(removed, "Swept expired sessions");
                }
            }
        })
    }

    async fn mutate<F>(&self, session_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut SessionContext, DateTime<Utc>),
    {
        let mut sessions = self.sessions.write().await;
        let now = self.clock.now();
        match sessions.get(session_id).map(|s| s.is_expired(now)) {
            None => Err(Error::session_not_found(session_id)),
            Some(true) => {
                sessions.remove(session_id);
                Err(Error::session_not_found(session_id))
            }
            Some(false) => {
                if let Some(session) = sessions.get_mut(session_id) {
                    apply(session, now);
                    session.expires_at = now + self.ttl;
                }
                Ok(())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use contexta_core::clock::ManualClock;

    fn manager(ttl_secs: u64, max_messages: usize) -> (Arc<SessionManager>, ManualClock) {
        let clock = ManualClock::at(DateTime::from_timestamp(1_800_000_000, 0).unwrap());
        let config = SessionConfig {
            ttl_secs,
            max_messages,
            sweep_interval_secs: None,
        };
        let manager = SessionManager::with_clock(&config, Arc::new(clock.clone()));
        (Arc::new(manager), clock)
    }

    #[tokio::test]
    async fn readable_until_expiry_boundary() {
        let (sessions, clock) = manager(1800, 20);
        let created = sessions.create("s1", None, None).await;
        assert_eq!(created.expires_at - created.created_at, Duration::seconds(1800));

        clock.advance(Duration::milliseconds(1_799_999));
        assert!(sessions.get("s1").await.is_some());

        clock.advance(Duration::milliseconds(1));
        assert!(sessions.get("s1").await.is_none());

        clock.advance(Duration::seconds(1));
        assert!(sessions.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn mutators_slide_the_ttl() {
        let (sessions, clock) = manager(60, 20);
        sessions.create("s1", Some("acme".into()), None).await;

        clock.advance(Duration::seconds(50));
        sessions.append_message("s1", Role::User, "hello").await.unwrap();
        clock.advance(Duration::seconds(50));
        sessions.set_intent("s1", "draft business plan").await.unwrap();
        clock.advance(Duration::seconds(50));
        sessions
            .set_active_document("s1", Some(ActiveDocument::new("d1", "Plan")))
            .await
            .unwrap();
        clock.advance(Duration::seconds(50));

        let session = sessions.get("s1").await.unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.intent.as_deref(), Some("draft business plan"));
        assert_eq!(session.entity_id.as_deref(), Some("acme"));

        clock.advance(Duration::seconds(10));
        assert!(sessions.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn mutating_missing_or_expired_session_fails() {
        let (sessions, clock) = manager(10, 20);
        let err = sessions.set_intent("nope", "x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        sessions.create("s1", None, None).await;
        clock.advance(Duration::seconds(10));
        assert!(sessions.append_message("s1", Role::User, "late").await.is_err());
        assert!(sessions.touch("s1").await.is_err());
        assert_eq!(sessions.stored_count().await, 0);
    }

    #[tokio::test]
    async fn messages_are_bounded_oldest_dropped() {
        let (sessions, _) = manager(60, 3);
        sessions.create("s1", None, None).await;
        for i in 0..5 {
            sessions
                .append_message("s1", Role::User, format!("message {i}"))
                .await
                .unwrap();
        }
        let session = sessions.get("s1").await.unwrap();
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let (sessions, clock) = manager(60, 20);
        sessions.create("old", None, None).await;
        clock.advance(Duration::seconds(30));
        sessions.create("new", None, None).await;
        clock.advance(Duration::seconds(30));

        assert_eq!(sessions.stored_count().await, 2);
        assert_eq!(sessions.active_count().await, 1);
        assert_eq!(sessions.sweep_expired().await, 1);
        assert_eq!(sessions.stored_count().await, 1);
        assert!(sessions.get("new").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_reclaims_expired_sessions() {
        let (sessions, clock) = manager(60, 20);
        sessions.create("s1", None, None).await;
        clock.advance(Duration::seconds(61));

        let handle = sessions.spawn_sweeper(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(sessions.stored_count().await, 0);

        drop(sessions);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn end_removes_live_session() {
        let (sessions, _) = manager(60, 20);
        sessions.create("s1", None, None).await;
        assert!(sessions.end("s1").await);
        assert!(!sessions.end("s1").await);
        assert!(sessions.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn recreate_discards_previous_state() {
        let (sessions, _) = manager(60, 20);
        sessions.create("s1", None, None).await;
        sessions.append_message("s1", Role::User, "hi").await.unwrap();
        sessions.create("s1", None, Some("manufacturing".into())).await;
        let session = sessions.get("s1").await.unwrap();
        assert!(session.messages.is_empty());
        assert_eq!(session.domain_id.as_deref(), Some("manufacturing"));
    }

    // ── Rendering ──

    fn session_with(messages: &[&str]) -> SessionContext {
        let now = Utc::now();
        SessionContext {
            session_id: "s".into(),
            entity_id: None,
            domain_id: None,
            messages: messages
                .iter()
                .map(|m| Message::new(Role::User, *m, now))
                .collect(),
            intent: Some("review plan".into()),
            active_document: None,
            created_at: now,
            expires_at: now + Duration::seconds(60),
        }
    }

    #[test]
    fn render_includes_everything_when_it_fits() {
        let session = session_with(&["first", "second"]);
        let render = render_within_budget(&session, 1000);
        assert!(render.text.starts_with(SESSION_HEADER));
        assert!(render.text.contains("Intent: review plan"));
        assert!(render.text.contains("user: first\nuser: second"));
        assert_eq!(render.messages_included, 2);
        assert_eq!(render.messages_dropped, 0);
        assert_eq!(render.tokens, token::estimate_tokens(&render.text));
    }

    #[test]
    fn render_drops_oldest_messages_first() {
        let session = session_with(&[
            "an old message that is rather long and wordy",
            "newest",
        ]);
        let full = render_within_budget(&session, 1000);
        let render = render_within_budget(&session, full.tokens - 1);
        assert!(render.tokens < full.tokens);
        assert!(render.text.contains("newest"));
        assert!(!render.text.contains("old message"));
        assert_eq!(render.messages_dropped, 1);
    }

    #[test]
    fn render_is_empty_when_nothing_fits() {
        let session = session_with(&["hello"]);
        let render = render_within_budget(&session, 1);
        assert!(render.text.is_empty());
        assert_eq!(render.tokens, 0);
        assert_eq!(render.messages_dropped, 1);
    }

    #[test]
    fn empty_session_renders_nothing() {
        let mut session = session_with(&[]);
        session.intent = None;
        assert_eq!(render_within_budget(&session, 1000), SessionRender::default());
    }
}
