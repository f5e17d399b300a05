//! Chat history backends for Kokua.
//!
//! The durable relational log of users, sessions, and messages that the web
//! layer writes each completed exchange into. All backends implement the
//! `kokua_core::HistoryStore` trait.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryHistory;
pub use sqlite::SqliteHistory;
