//! Event locks: skip the echo of your own mutation.
//!
//! After the mirror service creates, patches, or removes a record, the
//! realtime channel echoes a matching event back. A lock set at call time
//! makes the reconciler skip that one event instead of applying it twice.

use dashmap::DashMap;

use rockpool_store::RecordKey;

use crate::events::EventKind;

/// One-shot skip markers per (event kind, identity).
#[derive(Debug, Default)]
pub struct EventLocks {
    locks: DashMap<(EventKind, RecordKey), ()>,
}

impl EventLocks {
    /// Create an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot skip for the next matching event.
    pub fn lock(&self, kind: EventKind, key: RecordKey) {
        self.locks.insert((kind, key), ());
    }

    /// Consume a skip marker. Returns true when one was armed.
    pub fn clear(&self, kind: EventKind, key: &RecordKey) -> bool {
        self.locks.remove(&(kind, key.clone())).is_some()
    }

    /// Whether a skip marker is armed.
    pub fn is_locked(&self, kind: EventKind, key: &RecordKey) -> bool {
        self.locks.contains_key(&(kind, key.clone()))
    }

    /// Drop all markers.
    pub fn clear_all(&self) {
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockpool_store::RecordId;

    fn key(id: i64) -> RecordKey {
        RecordKey::Id(RecordId::Int(id))
    }

    #[test_case::test_case(EventKind::Created)]
    #[test_case::test_case(EventKind::Updated)]
    #[test_case::test_case(EventKind::Patched)]
    #[test_case::test_case(EventKind::Removed)]
    fn locks_are_one_shot(kind: EventKind) {
        let locks = EventLocks::new();
        locks.lock(kind, key(1));

        assert!(locks.clear(kind, &key(1)));
        assert!(!locks.clear(kind, &key(1)));
    }

    #[test]
    fn locks_are_scoped_to_kind_and_key() {
        let locks = EventLocks::new();
        locks.lock(EventKind::Removed, key(1));

        assert!(!locks.is_locked(EventKind::Patched, &key(1)));
        assert!(!locks.is_locked(EventKind::Removed, &key(2)));
        assert!(locks.is_locked(EventKind::Removed, &key(1)));
    }
}
