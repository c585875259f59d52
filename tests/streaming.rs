use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use session_relay::bus::LiveBus;
use session_relay::event::{EventKind, EventRecord};
use session_relay::session::Session;
use session_relay::store::{EventLog, MemoryStore, SessionStore, StoreError};
use session_relay::stream::{SseFrame, StreamCoordinator, StreamError, StreamOptions};

mod common;
use common::FlagProbe;

fn error_kind(n: usize) -> EventKind {
    EventKind::Error {
        message: format!("e{n}"),
    }
}

async fn seeded_store(session_id: &str, events: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .create_session(&Session::new(session_id))
        .await
        .unwrap();
    for n in 0..events {
        store.append(session_id, error_kind(n), None).await.unwrap();
    }
    store
}

fn coordinator(
    store: &Arc<MemoryStore>,
    bus: &Arc<LiveBus>,
    options: StreamOptions,
) -> StreamCoordinator {
    StreamCoordinator::new(store.clone(), store.clone(), bus.clone(), options)
}

async fn collect_event_ids(
    rx: &mut mpsc::Receiver<SseFrame>,
    count: usize,
) -> Vec<u64> {
    let mut ids = Vec::new();
    while ids.len() < count {
        let frame = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame within deadline")
            .expect("stream still open");
        if let Some(id) = frame.event_id() {
            ids.push(id);
        }
    }
    ids
}

#[tokio::test]
async fn unknown_session_fails_with_not_found() {
    let store = Arc::new(MemoryStore::new());
    let bus = LiveBus::new(8);
    let coord = coordinator(&store, &bus, StreamOptions::default());

    let (tx, _rx) = mpsc::channel(8);
    let mut sink = tx;
    let err = coord
        .run("missing", 0, &mut sink, &FlagProbe::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StreamError::Store(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn replay_pages_then_live_events_in_one_ordered_feed() {
    let store = seeded_store("s1", 3).await;
    let bus = LiveBus::new(8);
    // Page size 2 forces multi-page replay.
    let coord = coordinator(
        &store,
        &bus,
        StreamOptions {
            replay_page_size: 2,
            keepalive_interval: Duration::from_millis(100),
        },
    );

    let probe = FlagProbe::new();
    let (tx, mut rx) = mpsc::channel(32);
    let task = tokio::spawn({
        let coord = coord.clone();
        let probe = probe.clone();
        async move {
            let mut sink = tx;
            coord.run("s1", 0, &mut sink, &probe).await
        }
    });

    // Wait for the live subscription before publishing the live tail.
    timeout(Duration::from_secs(5), async {
        while bus.subscriber_count("s1") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    for n in 3..5 {
        let record = store.append("s1", error_kind(n), None).await.unwrap();
        bus.publish("s1", &record);
    }

    let ids = collect_event_ids(&mut rx, 5).await;
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    probe.disconnect();
    task.await.unwrap().unwrap();
    assert_eq!(bus.subscriber_count("s1"), 0);
}

#[tokio::test]
async fn after_id_skips_already_seen_events() {
    let store = seeded_store("s1", 5).await;
    let bus = LiveBus::new(8);
    let coord = coordinator(
        &store,
        &bus,
        StreamOptions {
            replay_page_size: 500,
            keepalive_interval: Duration::from_millis(50),
        },
    );

    let probe = FlagProbe::new();
    let (tx, mut rx) = mpsc::channel(32);
    let task = tokio::spawn({
        let coord = coord.clone();
        let probe = probe.clone();
        async move {
            let mut sink = tx;
            coord.run("s1", 2, &mut sink, &probe).await
        }
    });

    let ids = collect_event_ids(&mut rx, 3).await;
    assert_eq!(ids, vec![3, 4, 5]);

    probe.disconnect();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_connection_gets_keepalives() {
    let store = seeded_store("s1", 0).await;
    let bus = LiveBus::new(8);
    let coord = coordinator(&store, &bus, StreamOptions::default());

    let probe = FlagProbe::new();
    let (tx, mut rx) = mpsc::channel(8);
    let task = tokio::spawn({
        let coord = coord.clone();
        let probe = probe.clone();
        async move {
            let mut sink = tx;
            coord.run("s1", 0, &mut sink, &probe).await
        }
    });

    // No events: the first frame must be the 15s keepalive comment.
    let frame = timeout(Duration::from_secs(60), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, SseFrame::Keepalive);

    probe.disconnect();
    task.await.unwrap().unwrap();
    assert_eq!(bus.subscriber_count("s1"), 0);
}

#[tokio::test]
async fn disconnect_during_replay_aborts_before_subscribing() {
    let store = seeded_store("s1", 4).await;
    let bus = LiveBus::new(8);
    let coord = coordinator(&store, &bus, StreamOptions::default());

    let probe = FlagProbe::new();
    probe.disconnect();

    let (tx, mut rx) = mpsc::channel(8);
    let mut sink = tx;
    coord.run("s1", 0, &mut sink, &probe).await.unwrap();

    drop(sink);
    assert!(rx.recv().await.is_none());
    assert_eq!(bus.session_count(), 0);
}

#[tokio::test]
async fn closed_sink_ends_the_stream_cleanly() {
    let store = seeded_store("s1", 3).await;
    let bus = LiveBus::new(8);
    let coord = coordinator(&store, &bus, StreamOptions::default());

    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    let mut sink = tx;

    coord
        .run("s1", 0, &mut sink, &FlagProbe::new())
        .await
        .unwrap();
    assert_eq!(bus.session_count(), 0);
}

#[tokio::test]
async fn live_events_below_the_replay_mark_are_suppressed() {
    let store = seeded_store("s1", 2).await;
    let bus = LiveBus::new(8);
    let coord = coordinator(
        &store,
        &bus,
        StreamOptions {
            replay_page_size: 500,
            keepalive_interval: Duration::from_millis(50),
        },
    );

    let probe = FlagProbe::new();
    let (tx, mut rx) = mpsc::channel(32);
    let task = tokio::spawn({
        let coord = coord.clone();
        let probe = probe.clone();
        async move {
            let mut sink = tx;
            coord.run("s1", 0, &mut sink, &probe).await
        }
    });

    timeout(Duration::from_secs(5), async {
        while bus.subscriber_count("s1") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // Re-publish an already replayed record, then a genuinely new one.
    let stale = EventRecord {
        id: 1,
        session_id: "s1".into(),
        ts: chrono::Utc::now(),
        kind: error_kind(0),
    };
    bus.publish("s1", &stale);
    let fresh = store.append("s1", error_kind(2), None).await.unwrap();
    bus.publish("s1", &fresh);

    let ids = collect_event_ids(&mut rx, 3).await;
    assert_eq!(ids, vec![1, 2, 3]);

    probe.disconnect();
    task.await.unwrap().unwrap();
}
