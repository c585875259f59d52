//! In-memory per-session live fan-out.
//!
//! [`LiveBus`] multicasts freshly appended [`EventRecord`]s to the active
//! subscribers of a session. It is purely a transient relay: nothing is
//! persisted, delivery is best-effort, and a full subscriber queue means the
//! message is dropped for that subscriber only. Durable replay from the
//! [`EventLog`](crate::store::EventLog) is the correctness backstop, so a
//! client that missed a live event recovers it by reconnecting with its last
//! seen id.
//!
//! Single-process only by design; cross-process consumers go through the
//! durable log.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::event::EventRecord;

/// Default bounded capacity of each subscriber queue.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 200;

struct SubscriberEntry {
    id: u64,
    tx: flume::Sender<EventRecord>,
}

/// Per-session multicast of events to zero or more subscribers.
///
/// All subscriber-set mutation and the publish snapshot are guarded by one
/// mutex; sends happen outside the lock so a slow consumer never blocks
/// publishers or other readers.
pub struct LiveBus {
    subscribers: Mutex<FxHashMap<String, Vec<SubscriberEntry>>>,
    capacity: usize,
    next_subscriber_id: AtomicU64,
    dropped_events: AtomicU64,
}

impl LiveBus {
    /// Create a bus whose subscriber queues hold at most `capacity` messages.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(FxHashMap::default()),
            capacity: capacity.max(1),
            next_subscriber_id: AtomicU64::new(1),
            dropped_events: AtomicU64::new(0),
        })
    }

    /// Create a bus with [`DEFAULT_SUBSCRIBER_CAPACITY`].
    pub fn with_default_capacity() -> Arc<Self> {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Register a new bounded subscription for `session_id`.
    ///
    /// The returned [`Subscription`] unsubscribes itself on drop, so holders
    /// cannot leak a registration even when their task is cancelled.
    pub fn subscribe(self: &Arc<Self>, session_id: &str) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::bounded(self.capacity);
        self.subscribers
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(SubscriberEntry { id, tx });
        Subscription {
            session_id: session_id.to_string(),
            id,
            rx,
            bus: Arc::clone(self),
        }
    }

    /// Remove one subscription; drops the session entry when it was the last.
    pub fn unsubscribe(&self, session_id: &str, subscriber_id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(entries) = subscribers.get_mut(session_id) {
            entries.retain(|entry| entry.id != subscriber_id);
            if entries.is_empty() {
                subscribers.remove(session_id);
            }
        }
    }

    /// Deliver `event` to every current subscriber of the session.
    ///
    /// Non-blocking: a full queue drops the message for that subscriber only.
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, session_id: &str, event: &EventRecord) -> usize {
        // Snapshot before iterating so a subscriber arriving mid-publish
        // never receives a partial broadcast.
        let senders: Vec<(u64, flume::Sender<EventRecord>)> = {
            let subscribers = self.subscribers.lock();
            match subscribers.get(session_id) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| (entry.id, entry.tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (subscriber_id, tx) in senders {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(flume::TrySendError::Full(_)) => {
                    self.dropped_events.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        session_id,
                        subscriber_id,
                        event_id = event.id,
                        "live event dropped for slow subscriber"
                    );
                }
                Err(flume::TrySendError::Disconnected(_)) => {
                    // Receiver gone; its guard will clean up the entry.
                }
            }
        }
        delivered
    }

    /// Number of active subscriptions for a session.
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.subscribers
            .lock()
            .get(session_id)
            .map_or(0, |entries| entries.len())
    }

    /// Number of sessions with at least one registered subscription.
    pub fn session_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Total messages dropped because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for LiveBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBus")
            .field("capacity", &self.capacity)
            .field("sessions", &self.session_count())
            .finish()
    }
}

/// One live connection's ephemeral subscription.
///
/// Holds a bounded queue of events published since [`LiveBus::subscribe`].
/// No identity survives process restart; dropping the subscription removes
/// its registration.
pub struct Subscription {
    session_id: String,
    id: u64,
    rx: flume::Receiver<EventRecord>,
    bus: Arc<LiveBus>,
}

impl Subscription {
    /// Wait for the next published event; `None` once the bus side is gone.
    pub async fn recv(&self) -> Option<EventRecord> {
        self.rx.recv_async().await.ok()
    }

    /// Take an event without waiting, if one is queued.
    pub fn try_recv(&self) -> Option<EventRecord> {
        self.rx.try_recv().ok()
    }

    /// Session this subscription belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.session_id, self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.session_id)
            .field("id", &self.id)
            .finish()
    }
}
