//! HistoryStore trait — the durable, relational chat log.
//!
//! The in-process session store (kokua-service) holds only process-lifetime
//! conversation state; the HistoryStore is what survives restarts. The web
//! layer writes each completed exchange here, keyed by the session id the
//! pipeline returned, and serves the sidebar listing / transcript reads
//! from it.
//!
//! Implementations: SQLite (production), in-memory (tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

/// A registered user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,

    pub username: String,

    pub email: String,

    /// Argon2 password hash — never exposed in API responses
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

/// The fields needed to register a user. Hashing happens in the caller.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// A persisted chat session, optionally owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_message_at: DateTime<Utc>,
}

/// One persisted message within a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,

    pub session_id: String,

    pub content: String,

    /// True for the user's message, false for the model's reply
    pub is_user: bool,

    pub created_at: DateTime<Utc>,
}

/// The core HistoryStore trait.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    // --- Users ---

    /// Register a new user. Fails on duplicate username or email.
    async fn create_user(&self, user: NewUser) -> std::result::Result<UserRecord, HistoryError>;

    async fn user_by_username(
        &self,
        username: &str,
    ) -> std::result::Result<Option<UserRecord>, HistoryError>;

    async fn user_by_id(&self, id: i64)
    -> std::result::Result<Option<UserRecord>, HistoryError>;

    // --- Sessions ---

    /// Persist a session row with the given id (the id comes from the
    /// response pipeline, not the store).
    async fn create_session(
        &self,
        id: &str,
        user_id: Option<i64>,
    ) -> std::result::Result<SessionRecord, HistoryError>;

    async fn session(&self, id: &str)
    -> std::result::Result<Option<SessionRecord>, HistoryError>;

    /// Sessions owned by a user, most recent message first.
    async fn sessions_for_user(
        &self,
        user_id: i64,
    ) -> std::result::Result<Vec<SessionRecord>, HistoryError>;

    async fn update_title(
        &self,
        id: &str,
        title: &str,
    ) -> std::result::Result<SessionRecord, HistoryError>;

    /// Delete a session and all of its messages.
    async fn delete_session(&self, id: &str) -> std::result::Result<bool, HistoryError>;

    // --- Messages ---

    /// Append a message and bump the session's `last_message_at`.
    async fn add_message(
        &self,
        session_id: &str,
        content: &str,
        is_user: bool,
    ) -> std::result::Result<MessageRecord, HistoryError>;

    /// Messages for a session, oldest first.
    async fn messages(
        &self,
        session_id: &str,
    ) -> std::result::Result<Vec<MessageRecord>, HistoryError>;

    /// Delete all messages from a session. Returns whether any were removed.
    async fn clear_messages(&self, session_id: &str) -> std::result::Result<bool, HistoryError>;
}
