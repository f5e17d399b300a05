//! In-memory backend — useful for testing and ephemeral deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use kokua_core::error::HistoryError;
use kokua_core::history::{HistoryStore, MessageRecord, NewUser, SessionRecord, UserRecord};

#[derive(Default)]
struct Inner {
    users: Vec<UserRecord>,
    next_user_id: i64,
    sessions: HashMap<String, SessionRecord>,
    messages: Vec<MessageRecord>,
    next_message_id: i64,
}

/// A history backend that keeps everything in process memory.
pub struct InMemoryHistory {
    inner: RwLock<Inner>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, HistoryError> {
        let mut inner = self.inner.write().await;

        if inner
            .users
            .iter()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(HistoryError::Conflict("user already exists".into()));
        }

        inner.next_user_id += 1;
        let record = UserRecord {
            id: inner.next_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            created_at: Utc::now(),
        };
        inner.users.push(record.clone());
        Ok(record)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>, HistoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>, HistoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_session(
        &self,
        id: &str,
        user_id: Option<i64>,
    ) -> Result<SessionRecord, HistoryError> {
        let mut inner = self.inner.write().await;

        if inner.sessions.contains_key(id) {
            return Err(HistoryError::Conflict(format!("session {id} already exists")));
        }

        let now = Utc::now();
        let record = SessionRecord {
            id: id.to_string(),
            user_id,
            title: None,
            created_at: now,
            updated_at: now,
            last_message_at: now,
        };
        inner.sessions.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn session(&self, id: &str) -> Result<Option<SessionRecord>, HistoryError> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(id).cloned())
    }

    async fn sessions_for_user(&self, user_id: i64) -> Result<Vec<SessionRecord>, HistoryError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<SessionRecord> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == Some(user_id))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(sessions)
    }

    async fn update_title(&self, id: &str, title: &str) -> Result<SessionRecord, HistoryError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| HistoryError::NotFound(format!("session {id}")))?;
        session.title = Some(title.to_string());
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn delete_session(&self, id: &str) -> Result<bool, HistoryError> {
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(id).is_some();
        if removed {
            inner.messages.retain(|m| m.session_id != id);
        }
        Ok(removed)
    }

    async fn add_message(
        &self,
        session_id: &str,
        content: &str,
        is_user: bool,
    ) -> Result<MessageRecord, HistoryError> {
        let mut inner = self.inner.write().await;

        let now = Utc::now();
        match inner.sessions.get_mut(session_id) {
            Some(session) => {
                session.last_message_at = now;
                session.updated_at = now;
            }
            None => return Err(HistoryError::NotFound(format!("session {session_id}"))),
        }

        inner.next_message_id += 1;
        let record = MessageRecord {
            id: inner.next_message_id,
            session_id: session_id.to_string(),
            content: content.to_string(),
            is_user,
            created_at: now,
        };
        inner.messages.push(record.clone());
        Ok(record)
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, HistoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn clear_messages(&self, session_id: &str) -> Result<bool, HistoryError> {
        let mut inner = self.inner.write().await;
        let before = inner.messages.len();
        inner.messages.retain(|m| m.session_id != session_id);
        Ok(inner.messages.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn create_and_find_user() {
        let store = InMemoryHistory::new();
        let user = store.create_user(new_user("kai")).await.unwrap();
        assert_eq!(user.id, 1);

        let found = store.user_by_username("kai").await.unwrap();
        assert!(found.is_some());

        let duplicate = store.create_user(new_user("kai")).await;
        assert!(matches!(duplicate, Err(HistoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn message_ordering_and_clear() {
        let store = InMemoryHistory::new();
        store.create_session("s", None).await.unwrap();
        store.add_message("s", "one", true).await.unwrap();
        store.add_message("s", "two", false).await.unwrap();

        let messages = store.messages("s").await.unwrap();
        assert_eq!(messages[0].content, "one");
        assert_eq!(messages[1].content, "two");

        assert!(store.clear_messages("s").await.unwrap());
        assert!(store.messages("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_session_removes_messages() {
        let store = InMemoryHistory::new();
        store.create_session("s", None).await.unwrap();
        store.add_message("s", "one", true).await.unwrap();

        assert!(store.delete_session("s").await.unwrap());
        assert!(store.messages("s").await.unwrap().is_empty());
        assert!(store.session("s").await.unwrap().is_none());
    }
}
