//! Session and Turn domain types.
//!
//! These are the value objects that flow through the response pipeline:
//! the user sends a message → the session store resolves a Session → the
//! model (or the fallback generator) produces a reply → both turns are
//! appended to the Session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an in-process chat session.
///
/// Always a random UUID — never derived from wall-clock hashes or object
/// identity, which can collide or be predictable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of an utterance within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The generative model (or the fallback generator speaking for it)
    Model,
}

/// A single utterance within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,

    /// The utterance content, non-empty for well-formed turns
    pub text: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Whether a session talks to the remote model or is served locally.
///
/// Fallback mode is decided at the service level when the session is
/// created; a Fallback session never reaches the remote model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Live,
    Fallback,
}

/// One ongoing multi-turn conversation, scoped to process memory.
///
/// Sessions are created seeded with a single model-role greeting turn and
/// grow by exactly two turns (user, then model) per successful exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: SessionId,

    /// Ordered turns, insertion order = conversation order
    pub turns: Vec<Turn>,

    /// Live or fallback
    pub mode: SessionMode,

    /// When this session was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was appended
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session seeded with a greeting turn from the model.
    pub fn new(mode: SessionMode, greeting: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            turns: vec![Turn::model(greeting)],
            mode,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn to the session.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }

    /// The last `limit` turns, oldest first — the bounded slice of prior
    /// conversation sent to the remote model alongside a new message.
    pub fn context_window(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }
}
