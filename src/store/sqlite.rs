/*!
SQLite-backed session and event storage.

`SqliteStore` implements both [`SessionStore`] and [`EventLog`] over a shared
`sqlx` connection pool.

## Behavior

- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) are executed on connect;
  disabling the feature assumes external migration orchestration.
- Event ids are assigned inside a single INSERT statement via a
  `COALESCE(MAX(seq), 0) + 1` subselect. SQLite holds the write lock for the
  whole statement, so concurrent appends can neither duplicate nor skip an
  id; the `(session_id, seq)` primary key turns any anomaly into a hard
  constraint error instead of a silent gap.
- `append` returns only after the row is committed, so a crash between append
  and any dependent live publish loses nothing durable.
*/

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::event::{EventKind, EventRecord};
use crate::session::Session;

use super::{EventLog, Result, SessionStore, StoreError};

/// Durable store over a SQLite database.
pub struct SqliteStore {
    /// Shared pool for concurrent session and log operations.
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

impl SqliteStore {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: "sqlite://session_relay.db"
    #[must_use = "store must be used to persist sessions and events"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::backend(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| StoreError::backend(format!("connect error: {e}")))?;

        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(StoreError::backend(format!("migration failure: {e}")));
            }
        }

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn row_to_event(session_id: &str, row: &SqliteRow) -> Result<EventRecord> {
        let seq: i64 = row.get("seq");
        let ts_str: String = row.get("ts");
        let kind_name: String = row.get("kind");
        let payload_json: String = row.get("payload_json");

        let payload: serde_json::Value = serde_json::from_str(&payload_json)?;
        let kind = EventKind::from_parts(&kind_name, payload)?;
        let ts = DateTime::parse_from_rfc3339(&ts_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(EventRecord {
            id: seq as u64,
            session_id: session_id.to_string(),
            ts,
            kind,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    #[instrument(skip(self, session), fields(session_id = %session.session_id), err)]
    async fn create_session(&self, session: &Session) -> Result<()> {
        let snapshot = serde_json::to_string(session)?;
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (id, status, created_at, updated_at, snapshot_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(&snapshot)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
                Err(StoreError::Conflict {
                    session_id: session.session_id.clone(),
                })
            }
            Err(e) => Err(StoreError::backend(format!("insert session: {e}"))),
        }
    }

    #[instrument(skip(self), err)]
    async fn load_session(&self, session_id: &str) -> Result<Session> {
        let row = sqlx::query("SELECT snapshot_json FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| StoreError::backend(format!("select session: {e}")))?;

        let row = row.ok_or_else(|| StoreError::not_found(session_id))?;
        let snapshot: String = row.get("snapshot_json");
        Ok(serde_json::from_str(&snapshot)?)
    }

    #[instrument(skip(self, session), fields(session_id = %session.session_id), err)]
    async fn save_session(&self, session: &Session) -> Result<()> {
        let snapshot = serde_json::to_string(session)?;
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?2, updated_at = ?3, snapshot_json = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&session.session_id)
        .bind(session.status.as_str())
        .bind(session.updated_at.to_rfc3339())
        .bind(&snapshot)
        .execute(&*self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("update session: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(&session.session_id));
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for SqliteStore {
    #[instrument(skip(self, kind, ts), fields(kind = kind.name()), err)]
    async fn append(
        &self,
        session_id: &str,
        kind: EventKind,
        ts: Option<DateTime<Utc>>,
    ) -> Result<EventRecord> {
        let ts = ts.unwrap_or_else(Utc::now);
        let payload = serde_json::to_string(&kind.payload()?)?;

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (session_id, seq, ts, kind, payload_json)
            VALUES (
                ?1,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE session_id = ?1),
                ?2, ?3, ?4
            )
            RETURNING seq
            "#,
        )
        .bind(session_id)
        .bind(ts.to_rfc3339())
        .bind(kind.name())
        .bind(&payload)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("insert event: {e}")))?;

        Ok(EventRecord {
            id: seq as u64,
            session_id: session_id.to_string(),
            ts,
            kind,
        })
    }

    #[instrument(skip(self), err)]
    async fn read(&self, session_id: &str, after_id: u64, limit: u32) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, ts, kind, payload_json
            FROM events
            WHERE session_id = ?1 AND seq > ?2
            ORDER BY seq ASC
            LIMIT ?3
            "#,
        )
        .bind(session_id)
        .bind(after_id as i64)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("select events: {e}")))?;

        rows.iter()
            .map(|row| Self::row_to_event(session_id, row))
            .collect()
    }
}
