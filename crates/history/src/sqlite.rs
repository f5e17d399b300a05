//! SQLite chat history backend.
//!
//! Uses a single SQLite database file with three tables:
//! - `users`         — registered accounts
//! - `chat_sessions` — one row per conversation, optionally owned by a user
//! - `chat_messages` — the ordered message log per session
//!
//! Foreign keys cascade so deleting a session removes its messages.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use kokua_core::error::HistoryError;
use kokua_core::history::{HistoryStore, MessageRecord, NewUser, SessionRecord, UserRecord};

/// A production SQLite chat history backend.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Create a new SQLite backend from a connection URL
    /// (e.g. `sqlite://kokua.db`).
    ///
    /// The database and all tables/indexes are created automatically.
    pub async fn new(url: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| HistoryError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite history backend initialized at {url}");
        Ok(backend)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, HistoryError> {
        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Run schema migrations — creates tables and indexes.
    pub async fn run_migrations(&self) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT UNIQUE NOT NULL,
                email         TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_active     INTEGER NOT NULL DEFAULT 1,
                created_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("users table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id              TEXT PRIMARY KEY,
                user_id         INTEGER REFERENCES users(id) ON DELETE CASCADE,
                title           TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                last_message_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("chat_sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
                content    TEXT NOT NULL,
                is_user    INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("chat_messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON chat_sessions(user_id, last_message_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("sessions index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_timestamp(value: &str) -> chrono::DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserRecord, HistoryError> {
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| HistoryError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(UserRecord {
            id: row
                .try_get("id")
                .map_err(|e| HistoryError::QueryFailed(format!("id column: {e}")))?,
            username: row
                .try_get("username")
                .map_err(|e| HistoryError::QueryFailed(format!("username column: {e}")))?,
            email: row
                .try_get("email")
                .map_err(|e| HistoryError::QueryFailed(format!("email column: {e}")))?,
            password_hash: row
                .try_get("password_hash")
                .map_err(|e| HistoryError::QueryFailed(format!("password_hash column: {e}")))?,
            is_active: row.try_get::<i64, _>("is_active").unwrap_or(1) != 0,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, HistoryError> {
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| HistoryError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| HistoryError::QueryFailed(format!("updated_at column: {e}")))?;
        let last_message_at: String = row
            .try_get("last_message_at")
            .map_err(|e| HistoryError::QueryFailed(format!("last_message_at column: {e}")))?;

        Ok(SessionRecord {
            id: row
                .try_get("id")
                .map_err(|e| HistoryError::QueryFailed(format!("id column: {e}")))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| HistoryError::QueryFailed(format!("user_id column: {e}")))?,
            title: row
                .try_get("title")
                .map_err(|e| HistoryError::QueryFailed(format!("title column: {e}")))?,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
            last_message_at: Self::parse_timestamp(&last_message_at),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, HistoryError> {
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| HistoryError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(MessageRecord {
            id: row
                .try_get("id")
                .map_err(|e| HistoryError::QueryFailed(format!("id column: {e}")))?,
            session_id: row
                .try_get("session_id")
                .map_err(|e| HistoryError::QueryFailed(format!("session_id column: {e}")))?,
            content: row
                .try_get("content")
                .map_err(|e| HistoryError::QueryFailed(format!("content column: {e}")))?,
            is_user: row.try_get::<i64, _>("is_user").unwrap_or(1) != 0,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    /// Map a sqlx error, turning unique-constraint violations into conflicts.
    fn map_write_error(e: sqlx::Error, what: &str) -> HistoryError {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return HistoryError::Conflict(format!("{what} already exists"));
            }
        }
        HistoryError::Storage(format!("{what}: {e}"))
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, HistoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, is_active, created_at)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, "user"))?;

        Ok(UserRecord {
            id: result.last_insert_rowid(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            created_at: now,
        })
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>, HistoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("user by username: {e}")))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>, HistoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("user by id: {e}")))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn create_session(
        &self,
        id: &str,
        user_id: Option<i64>,
    ) -> Result<SessionRecord, HistoryError> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, user_id, title, created_at, updated_at, last_message_at)
            VALUES (?, ?, NULL, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&stamp)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, "session"))?;

        Ok(SessionRecord {
            id: id.to_string(),
            user_id,
            title: None,
            created_at: now,
            updated_at: now,
            last_message_at: now,
        })
    }

    async fn session(&self, id: &str) -> Result<Option<SessionRecord>, HistoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("session: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn sessions_for_user(&self, user_id: i64) -> Result<Vec<SessionRecord>, HistoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? ORDER BY last_message_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::QueryFailed(format!("sessions for user: {e}")))?;

        rows.iter().map(Self::row_to_session).collect()
    }

    async fn update_title(&self, id: &str, title: &str) -> Result<SessionRecord, HistoryError> {
        let result = sqlx::query("UPDATE chat_sessions SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("update title: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(HistoryError::NotFound(format!("session {id}")));
        }

        self.session(id)
            .await?
            .ok_or_else(|| HistoryError::NotFound(format!("session {id}")))
    }

    async fn delete_session(&self, id: &str) -> Result<bool, HistoryError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("delete session: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_message(
        &self,
        session_id: &str,
        content: &str,
        is_user: bool,
    ) -> Result<MessageRecord, HistoryError> {
        let now = Utc::now();

        // Bump the session's last_message_at; zero rows means no such session.
        let touched =
            sqlx::query("UPDATE chat_sessions SET last_message_at = ?, updated_at = ? WHERE id = ?")
                .bind(now.to_rfc3339())
                .bind(now.to_rfc3339())
                .bind(session_id)
                .execute(&self.pool)
                .await
                .map_err(|e| HistoryError::Storage(format!("touch session: {e}")))?;

        if touched.rows_affected() == 0 {
            return Err(HistoryError::NotFound(format!("session {session_id}")));
        }

        let result = sqlx::query(
            "INSERT INTO chat_messages (session_id, content, is_user, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(content)
        .bind(is_user)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("add message: {e}")))?;

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            is_user,
            created_at: now,
        })
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, HistoryError> {
        let rows =
            sqlx::query("SELECT * FROM chat_messages WHERE session_id = ? ORDER BY created_at, id")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| HistoryError::QueryFailed(format!("messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn clear_messages(&self, session_id: &str) -> Result<bool, HistoryError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("clear messages: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
