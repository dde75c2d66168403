//! Reconciliation of realtime change events into the store.
//!
//! Events merge into the store exactly like server responses, except that
//! bursts for one identity are coalesced within a debounce window and the
//! mirror's own echoes are skipped via event locks. Malformed payloads are
//! logged and dropped per-event; they never stall other identities.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use rockpool_store::{RecordId, RecordKey, Store};

use crate::debounce::Debouncer;
use crate::locks::EventLocks;

/// Kind of a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Patched,
    Removed,
}

/// A change notification from the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub kind: EventKind,
    pub record: Value,
}

impl ServiceEvent {
    /// Build an event.
    pub fn new(kind: EventKind, record: Value) -> Self {
        Self { kind, record }
    }
}

/// Configuration for event reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventOptions {
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Force a flush at most one window after the first event of a burst,
    /// even while events keep arriving.
    pub guarantee: bool,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 20,
            guarantee: false,
        }
    }
}

/// Applies debounced change events to a store.
///
/// Owns two tasks: intake (validate, lock-check, debounce) and apply
/// (merge or remove once a slot flushes). Dropping the reconciler aborts
/// both.
#[derive(Debug)]
pub struct EventReconciler {
    intake: JoinHandle<()>,
    apply: JoinHandle<()>,
}

impl EventReconciler {
    /// Spawn the reconciliation tasks over an event receiver.
    pub fn spawn(
        store: Arc<Store>,
        locks: Arc<EventLocks>,
        options: EventOptions,
        mut events: mpsc::UnboundedReceiver<ServiceEvent>,
    ) -> Self {
        let (debouncer, mut flushed) =
            Debouncer::new(Duration::from_millis(options.debounce_ms), options.guarantee);

        let intake_store = Arc::clone(&store);
        let intake = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(key) = event_key(&intake_store, &event.record) else {
                    warn!(kind = ?event.kind, "dropping malformed event payload");
                    continue;
                };
                if locks.clear(event.kind, &key) {
                    trace!(key = %key, kind = ?event.kind, "skipping echo of own mutation");
                    continue;
                }
                debouncer.push(key, event);
            }
            // channel closed: deliver whatever is still waiting
            debouncer.flush_all();
        });

        let apply = tokio::spawn(async move {
            while let Some((key, event)) = flushed.recv().await {
                apply_event(&store, key, event);
            }
        });

        Self { intake, apply }
    }

    /// Stop both tasks without waiting for a flush.
    pub fn abort(&self) {
        self.intake.abort();
        self.apply.abort();
    }
}

impl Drop for EventReconciler {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Resolve the identity an event applies to.
///
/// Events must carry an object with the store's id field; anything else
/// is malformed.
fn event_key(store: &Store, record: &Value) -> Option<RecordKey> {
    let fields = record.as_object()?;
    let id = fields.get(store.id_field()).and_then(RecordId::from_value)?;
    Some(RecordKey::Id(id))
}

fn apply_event(store: &Store, key: RecordKey, event: ServiceEvent) {
    match event.kind {
        EventKind::Removed => {
            store.remove_from_store(&key);
            trace!(key = %key, "event removed record");
        }
        EventKind::Created | EventKind::Updated | EventKind::Patched => {
            if let Err(error) = store.add_to_store(event.record) {
                warn!(key = %key, %error, "failed to apply event");
            }
        }
    }
}
