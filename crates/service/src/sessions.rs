//! In-process session store.
//!
//! Resolves a caller-supplied identifier to a live `Session`, creating one
//! when the identifier is absent, unknown, or one of the junk sentinels
//! naive clients serialize for an unset field. Resolution is total — it
//! always hands back a usable session.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use kokua_core::{Session, SessionMode, Turn};

/// Literal strings produced by client-side serialization bugs when an unset
/// session field is stringified. Each must be treated as "no session id".
const SENTINEL_IDS: [&str; 5] = ["string", "null", "undefined", "None", ""];

/// Process-lifetime mapping from session id to conversation state.
///
/// Mutated concurrently by request handlers; the map is guarded so a reader
/// never observes a partially-constructed session. Turn appends for one
/// session land in arrival order, but two requests racing on the *same*
/// session id may interleave their exchanges — an accepted limitation.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Normalize a candidate identifier: sentinel junk and whitespace-only
    /// strings mean "absent".
    pub fn sanitize(candidate: Option<&str>) -> Option<&str> {
        let candidate = candidate?.trim();
        if SENTINEL_IDS.contains(&candidate) {
            return None;
        }
        Some(candidate)
    }

    /// Resolve a candidate id to a live session, creating a fresh one seeded
    /// with the given greeting when the id does not resolve. Never fails.
    pub async fn resolve(
        &self,
        candidate: Option<&str>,
        mode: SessionMode,
        greeting: &str,
    ) -> Session {
        if let Some(id) = Self::sanitize(candidate) {
            if let Some(session) = self.sessions.read().await.get(id) {
                debug!(session_id = %id, "Using existing chat session");
                return session.clone();
            }
        }

        let session = Session::new(mode, greeting);
        self.sessions
            .write()
            .await
            .insert(session.id.to_string(), session.clone());
        info!(session_id = %session.id, ?mode, "Created new chat session");
        session
    }

    /// Remove a session after a failed remote call so the next resolve
    /// creates a fresh one rather than replaying a poisoned context.
    pub async fn discard(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "Removed problematic session");
        }
        removed
    }

    /// Append a completed exchange (user turn, then model turn) to a session.
    ///
    /// A no-op if the session was discarded in the meantime.
    pub async fn append_exchange(&self, id: &str, user_turn: Turn, model_turn: Turn) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id) {
            session.push(user_turn);
            session.push(model_turn);
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
