//! Transport-facing facade.
//!
//! [`SessionService`] is what an HTTP layer calls into: create/read sessions,
//! post a message (which kicks off a pipeline run), and stream events. It
//! owns no state of its own; everything is shared `Arc`s constructed at
//! process start and passed in explicitly.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

use crate::bus::LiveBus;
use crate::pipeline::PipelineEngine;
use crate::session::{Session, SessionStatus};
use crate::store::{EventLog, SessionStore, StoreError};
use crate::stream::{ConnectionProbe, FrameSink, StreamCoordinator, StreamError, StreamOptions};

/// Errors from the service surface.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("message content must not be empty")]
    #[diagnostic(code(session_relay::service::empty_message))]
    EmptyMessage,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Handle to a spawned pipeline run.
///
/// Gives the caller first-class task lifetime: await completion, or abort.
/// Dropping the handle detaches the run; it keeps executing and reports its
/// own failures through the engine's error boundary.
#[derive(Debug)]
pub struct RunHandle {
    session_id: String,
    handle: JoinHandle<()>,
}

impl RunHandle {
    /// Session this run belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the run to finish. The run itself never fails (failures are
    /// absorbed by the engine boundary); an error here means the task was
    /// cancelled or panicked.
    pub async fn join(self) -> Result<(), JoinError> {
        self.handle.await
    }

    /// Abort the spawned run.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// The session/event subsystem behind one process's transport layer.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    engine: Arc<PipelineEngine>,
    streams: StreamCoordinator,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        log: Arc<dyn EventLog>,
        bus: Arc<LiveBus>,
        engine: Arc<PipelineEngine>,
        stream_options: StreamOptions,
    ) -> Self {
        let streams = StreamCoordinator::new(Arc::clone(&store), log, bus, stream_options);
        Self {
            store,
            engine,
            streams,
        }
    }

    /// Create a fresh session with a generated id and persist it.
    pub async fn create_session(&self) -> Result<Session, ServiceError> {
        let session = Session::new(uuid::Uuid::new_v4().simple().to_string());
        self.store.create_session(&session).await?;
        tracing::info!(session_id = %session.session_id, "session created");
        Ok(session)
    }

    /// Current snapshot for a session.
    pub async fn read_session(&self, session_id: &str) -> Result<Session, ServiceError> {
        Ok(self.store.load_session(session_id).await?)
    }

    /// Append a user message, flip the session to `running`, and spawn a
    /// pipeline run. Returns once the message is persisted; the run proceeds
    /// in the background, observable through the returned [`RunHandle`] and
    /// the event stream.
    ///
    /// Known race, accepted by design: the snapshot save here is
    /// last-writer-wins against a pipeline run that is mid-flight for the
    /// same session. A second message posted while a run is writing
    /// artifacts can clobber those artifacts with the pre-run snapshot.
    pub async fn post_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<RunHandle, ServiceError> {
        if content.trim().is_empty() {
            return Err(ServiceError::EmptyMessage);
        }

        let mut session = self.store.load_session(session_id).await?;
        session.push_user(content);
        session.status = SessionStatus::Running;
        self.store.save_session(&session).await?;

        let engine = Arc::clone(&self.engine);
        let run_session = session_id.to_string();
        let handle = tokio::spawn(async move {
            engine.run_reported(&run_session).await;
        });

        Ok(RunHandle {
            session_id: session_id.to_string(),
            handle,
        })
    }

    /// Stream events for a session into `sink`: durable replay after
    /// `after_id`, then live delivery, until disconnect.
    pub async fn stream_events<S, C>(
        &self,
        session_id: &str,
        after_id: u64,
        sink: &mut S,
        conn: &C,
    ) -> Result<(), StreamError>
    where
        S: FrameSink,
        C: ConnectionProbe,
    {
        self.streams.run(session_id, after_id, sink, conn).await
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService").finish()
    }
}
