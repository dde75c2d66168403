//! Debounced application of realtime events into the store.
//!
//! Uses paused tokio time so debounce windows are deterministic.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::yield_now;
use tokio::time::advance;

use rockpool_client::{EventKind, EventLocks, EventOptions, EventReconciler, ServiceEvent};
use rockpool_store::{RecordId, RecordKey, Store, StoreOptions, StoreUpdate};

const WINDOW_MS: u64 = 20;

struct Fixture {
    store: Arc<Store>,
    locks: Arc<EventLocks>,
    events: mpsc::UnboundedSender<ServiceEvent>,
    _reconciler: EventReconciler,
}

fn fixture(guarantee: bool) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(Store::new(StoreOptions::default()));
    let locks = Arc::new(EventLocks::new());
    let (events, rx) = mpsc::unbounded_channel();
    let reconciler = EventReconciler::spawn(
        Arc::clone(&store),
        Arc::clone(&locks),
        EventOptions {
            debounce_ms: WINDOW_MS,
            guarantee,
        },
        rx,
    );
    Fixture {
        store,
        locks,
        events,
        _reconciler: reconciler,
    }
}

/// Let the intake/apply tasks drain, then step past the debounce window.
async fn settle() {
    for _ in 0..10 {
        yield_now().await;
    }
    advance(Duration::from_millis(WINDOW_MS * 2)).await;
    for _ in 0..10 {
        yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn a_burst_of_patches_applies_exactly_once() {
    let f = fixture(false);
    f.store.add_to_store(json!({"id": 1, "name": "v0"})).unwrap();

    let mut updates = f.store.subscribe();
    for n in 1..=5 {
        f.events
            .send(ServiceEvent::new(
                EventKind::Patched,
                json!({"id": 1, "name": format!("v{n}")}),
            ))
            .unwrap();
    }
    settle().await;

    // only the last event of the burst reached the store
    let record = f.store.get_by_id(1).unwrap();
    assert_eq!(record.get("name"), Some(&json!("v5")));

    let mut mutations = 0;
    while let Ok(update) = updates.try_recv() {
        if matches!(update, StoreUpdate::Updated { .. }) {
            mutations += 1;
        }
    }
    assert_eq!(mutations, 1);
}

#[tokio::test(start_paused = true)]
async fn identities_debounce_independently() {
    let f = fixture(false);
    f.events
        .send(ServiceEvent::new(EventKind::Created, json!({"id": 1, "name": "a"})))
        .unwrap();
    f.events
        .send(ServiceEvent::new(EventKind::Created, json!({"id": 2, "name": "b"})))
        .unwrap();
    settle().await;

    assert_eq!(f.store.item_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn a_trailing_remove_wins_over_earlier_patches() {
    let f = fixture(false);
    f.store.add_to_store(json!({"id": 1, "name": "a"})).unwrap();

    f.events
        .send(ServiceEvent::new(
            EventKind::Patched,
            json!({"id": 1, "name": "edited"}),
        ))
        .unwrap();
    f.events
        .send(ServiceEvent::new(EventKind::Removed, json!({"id": 1})))
        .unwrap();
    settle().await;

    assert!(f.store.get_by_id(1).is_none());
}

#[tokio::test(start_paused = true)]
async fn an_armed_lock_skips_exactly_one_echo() {
    let f = fixture(false);
    f.store.add_to_store(json!({"id": 1, "name": "a"})).unwrap();
    f.locks
        .lock(EventKind::Patched, RecordKey::Id(RecordId::from(1)));

    // the echo of our own patch is skipped
    f.events
        .send(ServiceEvent::new(
            EventKind::Patched,
            json!({"id": 1, "name": "echo"}),
        ))
        .unwrap();
    settle().await;
    assert_eq!(f.store.get_by_id(1).unwrap().get("name"), Some(&json!("a")));

    // the next patch for the same identity applies normally
    f.events
        .send(ServiceEvent::new(
            EventKind::Patched,
            json!({"id": 1, "name": "real"}),
        ))
        .unwrap();
    settle().await;
    assert_eq!(
        f.store.get_by_id(1).unwrap().get("name"),
        Some(&json!("real"))
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_events_are_dropped_without_stalling_others() {
    let f = fixture(false);

    f.events
        .send(ServiceEvent::new(EventKind::Created, json!("not an object")))
        .unwrap();
    f.events
        .send(ServiceEvent::new(EventKind::Created, json!({"name": "no id"})))
        .unwrap();
    f.events
        .send(ServiceEvent::new(EventKind::Created, json!({"id": 3, "name": "ok"})))
        .unwrap();
    settle().await;

    assert_eq!(f.store.item_count(), 1);
    assert!(f.store.get_by_id(3).is_some());
}

#[tokio::test(start_paused = true)]
async fn guarantee_mode_flushes_while_events_keep_arriving() {
    let f = fixture(true);
    f.store.add_to_store(json!({"id": 1, "name": "v0"})).unwrap();

    // a stream of patches spaced inside the window, lasting well past it
    for n in 1..=8 {
        f.events
            .send(ServiceEvent::new(
                EventKind::Patched,
                json!({"id": 1, "name": format!("v{n}")}),
            ))
            .unwrap();
        for _ in 0..5 {
            yield_now().await;
        }
        advance(Duration::from_millis(WINDOW_MS / 4)).await;
    }

    // the guarantee forced a flush during the stream
    let name = f
        .store
        .get_by_id(1)
        .unwrap()
        .get("name")
        .cloned()
        .unwrap();
    assert_ne!(name, json!("v0"));
}
