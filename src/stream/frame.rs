//! Wire framing and transport seams for event streams.

use async_trait::async_trait;
use thiserror::Error;

use crate::event::EventRecord;

/// One record on the outgoing event stream.
///
/// Encodes to server-sent-event framing: `id:`/`event:`/`data:` lines with a
/// blank-line terminator, or a comment-only keepalive record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseFrame {
    Event {
        id: u64,
        event: &'static str,
        data: String,
    },
    Keepalive,
}

impl SseFrame {
    /// Build a frame from a durable event record.
    ///
    /// The `data` payload wraps the typed payload in the envelope clients
    /// expect: `{"ts": <rfc3339>, "payload": {…}}`.
    pub fn from_record(record: &EventRecord) -> Result<Self, serde_json::Error> {
        let data = serde_json::json!({
            "ts": record.ts.to_rfc3339(),
            "payload": record.kind.payload()?,
        });
        Ok(SseFrame::Event {
            id: record.id,
            event: record.kind.name(),
            data: serde_json::to_string(&data)?,
        })
    }

    /// Encode to the on-wire byte form, including the blank-line terminator.
    pub fn encode(&self) -> String {
        match self {
            SseFrame::Event { id, event, data } => {
                format!("id: {id}\nevent: {event}\ndata: {data}\n\n")
            }
            SseFrame::Keepalive => ": keep-alive\n\n".to_string(),
        }
    }

    /// Durable event id carried by this frame, if any.
    pub fn event_id(&self) -> Option<u64> {
        match self {
            SseFrame::Event { id, .. } => Some(*id),
            SseFrame::Keepalive => None,
        }
    }
}

/// The client side of the stream went away.
#[derive(Debug, Error)]
#[error("frame sink closed")]
pub struct SinkClosed;

/// Where encoded frames go: the transport's response body, or a channel in
/// tests.
#[async_trait]
pub trait FrameSink: Send {
    /// Deliver one frame. An error means the receiving side is gone.
    async fn send(&mut self, frame: SseFrame) -> Result<(), SinkClosed>;
}

#[async_trait]
impl FrameSink for tokio::sync::mpsc::Sender<SseFrame> {
    async fn send(&mut self, frame: SseFrame) -> Result<(), SinkClosed> {
        tokio::sync::mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| SinkClosed)
    }
}

/// Poll-based disconnect detection for one connection.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn is_disconnected(&self) -> bool;
}

/// Probe for callers without disconnect signaling; never reports a disconnect.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysConnected;

#[async_trait]
impl ConnectionProbe for AlwaysConnected {
    async fn is_disconnected(&self) -> bool {
        false
    }
}
