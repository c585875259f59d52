//! Durable storage for sessions and events.
//!
//! Two narrow async traits abstract the backing store: [`SessionStore`] holds
//! the single current [`Session`] snapshot per id, and [`EventLog`] is an
//! append-only, per-session ordered log with gapless increasing ids and
//! range reads.
//!
//! # Backends
//!
//! - [`MemoryStore`] - volatile, for tests and DB-less builds
//! - [`SqliteStore`] - durable sqlx/SQLite persistence (feature `sqlite`)
//!
//! Append is durable before it returns: a successfully appended event can
//! always be recovered via [`EventLog::read`], regardless of what happens to
//! any live publish issued afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;

use crate::event::{EventKind, EventRecord};
use crate::session::Session;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Errors produced by the storage layer.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("session not found: {session_id}")]
    #[diagnostic(
        code(session_relay::store::not_found),
        help("The session id is unknown to this store; create the session first.")
    )]
    NotFound { session_id: String },

    #[error("session already exists: {session_id}")]
    #[diagnostic(code(session_relay::store::conflict))]
    Conflict { session_id: String },

    #[error("storage backend error: {message}")]
    #[diagnostic(
        code(session_relay::store::backend),
        help("Check that the database is reachable and migrations have run.")
    )]
    Backend { message: String },

    #[error("serialization error: {0}")]
    #[diagnostic(code(session_relay::store::serde))]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable record of session state: one current snapshot per `session_id`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a brand new session. Fails with [`StoreError::Conflict`] if the
    /// id is taken.
    async fn create_session(&self, session: &Session) -> Result<()>;

    /// Load the current snapshot.
    async fn load_session(&self, session_id: &str) -> Result<Session>;

    /// Replace the whole snapshot (read-modify-write semantics).
    async fn save_session(&self, session: &Session) -> Result<()>;
}

/// Append-only, per-session ordered event log.
///
/// The log does not validate session existence; that check belongs to the
/// caller (see [`StreamCoordinator`](crate::stream::StreamCoordinator)).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event, atomically assigning the next id for the session
    /// (starting at 1, no gaps, no duplicates even under concurrent appends).
    /// `ts` defaults to the append time.
    async fn append(
        &self,
        session_id: &str,
        kind: EventKind,
        ts: Option<DateTime<Utc>>,
    ) -> Result<EventRecord>;

    /// Events with `id > after_id`, ascending, at most `limit` of them.
    /// Repeated calls with an advancing `after_id` paginate the full range.
    async fn read(&self, session_id: &str, after_id: u64, limit: u32) -> Result<Vec<EventRecord>>;
}
