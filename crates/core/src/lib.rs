//! # Kokua Core
//!
//! Domain types, traits, and error definitions for the Kokua conversational
//! backend. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod history;
pub mod model;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{Error, HistoryError, ModelError, Result};
pub use history::{HistoryStore, MessageRecord, NewUser, SessionRecord, UserRecord};
pub use model::{GenerateRequest, GenerationConfig, ModelProvider};
pub use session::{Role, Session, SessionId, SessionMode, Turn};
