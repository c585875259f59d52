//! In-process store, used by tests and DB-less builds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::event::{EventKind, EventRecord};
use crate::session::Session;

use super::{EventLog, Result, SessionStore, StoreError};

/// Volatile [`SessionStore`] + [`EventLog`] backed by mutex-guarded maps.
///
/// Append order is serialized by the event mutex, which also makes id
/// assignment atomic: the next id is always `existing.len() + 1`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<FxHashMap<String, Session>>,
    events: Mutex<FxHashMap<String, Vec<EventRecord>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events for a session, for test assertions.
    pub fn events_snapshot(&self, session_id: &str) -> Vec<EventRecord> {
        self.events
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict {
                session_id: session.session_id.clone(),
            });
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(session_id))
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if !sessions.contains_key(&session.session_id) {
            return Err(StoreError::not_found(&session.session_id));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn append(
        &self,
        session_id: &str,
        kind: EventKind,
        ts: Option<DateTime<Utc>>,
    ) -> Result<EventRecord> {
        let mut events = self.events.lock();
        let entries = events.entry(session_id.to_string()).or_default();
        let record = EventRecord {
            id: entries.len() as u64 + 1,
            session_id: session_id.to_string(),
            ts: ts.unwrap_or_else(Utc::now),
            kind,
        };
        entries.push(record.clone());
        Ok(record)
    }

    async fn read(&self, session_id: &str, after_id: u64, limit: u32) -> Result<Vec<EventRecord>> {
        let events = self.events.lock();
        let entries = match events.get(session_id) {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };
        // Ids are dense, so `after_id` is also the index of the first match.
        let start = (after_id as usize).min(entries.len());
        let end = start.saturating_add(limit as usize).min(entries.len());
        Ok(entries[start..end].to_vec())
    }
}
