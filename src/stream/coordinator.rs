//! Replay-then-live stream coordination.

use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::bus::LiveBus;
use crate::store::{EventLog, SessionStore, StoreError};

use super::frame::{ConnectionProbe, FrameSink, SseFrame};

/// Tuning knobs for one coordinator instance.
#[derive(Clone, Copy, Debug)]
pub struct StreamOptions {
    /// Page size for durable replay reads.
    pub replay_page_size: u32,
    /// Idle interval after which a keepalive frame is emitted. Documented
    /// minimum liveness cadence clients must tolerate.
    pub keepalive_interval: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            replay_page_size: 500,
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

/// Errors surfaced to the transport layer from a stream request.
///
/// Client disconnects are not errors; the coordinator treats them as normal
/// termination and returns `Ok`.
#[derive(Debug, Error, Diagnostic)]
pub enum StreamError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("event encoding failed: {0}")]
    #[diagnostic(code(session_relay::stream::encode))]
    Encode(#[from] serde_json::Error),
}

/// Drives one client connection: bounded replay from the durable log, then a
/// live subscription, merged into a single ordered frame sequence.
///
/// Ordering guarantee per connection: no frame ever carries a lower event id
/// than a previously emitted frame. Replay covers every event that existed at
/// replay time with `id > after_id`; the live phase covers everything
/// published after the subscribe takes effect. The narrow window between the
/// two is recoverable by reconnecting with the last seen id, since ids are
/// visibly sequential.
#[derive(Clone)]
pub struct StreamCoordinator {
    store: Arc<dyn SessionStore>,
    log: Arc<dyn EventLog>,
    bus: Arc<LiveBus>,
    options: StreamOptions,
}

impl StreamCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        log: Arc<dyn EventLog>,
        bus: Arc<LiveBus>,
        options: StreamOptions,
    ) -> Self {
        Self {
            store,
            log,
            bus,
            options,
        }
    }

    /// Stream events for `session_id` with `after_id` as the client's
    /// low-water mark, until the client disconnects or the sink closes.
    ///
    /// Fails with [`StoreError::NotFound`] if the session does not exist.
    /// The live subscription is released on every exit path, including
    /// cancellation of the calling task.
    pub async fn run<S, C>(
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
        // Session existence check belongs here, not in the log.
        self.store.load_session(session_id).await?;

        let mut last_id = after_id;

        // Replay phase: page through the durable log in ascending id order.
        loop {
            if conn.is_disconnected().await {
                return Ok(());
            }
            let page = self
                .log
                .read(session_id, last_id, self.options.replay_page_size)
                .await?;
            let page_len = page.len() as u32;
            for record in page {
                if conn.is_disconnected().await {
                    return Ok(());
                }
                last_id = record.id;
                if sink.send(SseFrame::from_record(&record)?).await.is_err() {
                    return Ok(());
                }
            }
            if page_len < self.options.replay_page_size {
                break;
            }
        }

        tracing::debug!(session_id, last_id, "replay complete, switching to live feed");

        // Live phase. The subscription guard unsubscribes on drop, so this
        // cannot leak even if the surrounding task is cancelled mid-send.
        let subscription = self.bus.subscribe(session_id);
        loop {
            if conn.is_disconnected().await {
                return Ok(());
            }
            match tokio::time::timeout(self.options.keepalive_interval, subscription.recv()).await
            {
                // Idle too long: emit a keepalive so intermediaries do not
                // tear the connection down, then re-check liveness.
                Err(_) => {
                    if sink.send(SseFrame::Keepalive).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Ok(Some(record)) => {
                    // Suppress anything at or below the replay high-water
                    // mark; live delivery must never reorder the feed.
                    if record.id <= last_id {
                        continue;
                    }
                    last_id = record.id;
                    if sink.send(SseFrame::from_record(&record)?).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("options", &self.options)
            .finish()
    }
}
