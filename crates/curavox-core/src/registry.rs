//! Session registry: owns every live conversation.
//!
//! The registry is the only state shared across connections. Orchestrators
//! hold a session id and delegate all mutation here; they never touch
//! session state directly. Operations on an unknown id are silent no-ops
//! (empty result), not errors -- callers rely on this when a connection
//! races its own teardown.
//!
//! Backed by a [`DashMap`], which gives per-entry locking: operations on
//! one session id are linearizable relative to that session's orchestrator
//! and its STT event-delivery path, with no ordering guarantee across
//! different sessions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use curavox_types::message::{ConversationTurn, Message, Role};

/// A single conversation session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            messages: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Concurrent registry of live sessions.
///
/// Safe for use from arbitrarily many simultaneously active orchestrators.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session and return its id.
    pub fn create(&self) -> Uuid {
        let id = Uuid::now_v7();
        self.sessions.insert(id, Session::new(id));
        tracing::info!(session_id = %id, "session created");
        id
    }

    /// Snapshot of a session, or `None` if the id is unknown.
    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.get(&id).map(|entry| entry.clone())
    }

    /// Append a message to a session. No-op if the id is unknown.
    pub fn add_message(&self, id: Uuid, role: Role, content: &str) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.messages.push(Message {
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// The conversation in insertion order with timestamps stripped,
    /// as handed to the LLM. Empty if the id is unknown.
    pub fn get_conversation(&self, id: Uuid) -> Vec<ConversationTurn> {
        self.sessions
            .get(&id)
            .map(|entry| entry.messages.iter().map(ConversationTurn::from).collect())
            .unwrap_or_default()
    }

    /// End a session: set its end timestamp, remove it from the live set,
    /// and return the full message history. `None` if the id is unknown.
    pub fn end(&self, id: Uuid) -> Option<Vec<Message>> {
        let (_, mut session) = self.sessions.remove(&id)?;
        session.ended_at = Some(Utc::now());
        tracing::info!(session_id = %id, messages = session.messages.len(), "session ended");
        Some(session.messages)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
