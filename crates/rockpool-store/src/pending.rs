//! In-flight request counters per method and per identity.
//!
//! The tracker only counts; it does not deduplicate concurrent fetches.
//! Callers wanting single-flight behavior must add that above the store.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::id::RecordKey;

/// A remote-service method being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Find,
    Count,
    Get,
    Create,
    Patch,
    Remove,
}

/// Counters for in-flight operations.
#[derive(Debug, Default)]
pub struct PendingTracker {
    methods: DashMap<Method, usize>,
    by_key: DashMap<(Method, RecordKey), usize>,
}

impl PendingTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the start of an operation.
    pub fn begin(&self, method: Method, key: Option<&RecordKey>) {
        *self.methods.entry(method).or_insert(0) += 1;
        if let Some(key) = key {
            *self.by_key.entry((method, key.clone())).or_insert(0) += 1;
        }
    }

    /// Count an operation settling, successful or not. Never goes below
    /// zero.
    pub fn settle(&self, method: Method, key: Option<&RecordKey>) {
        if let Some(mut count) = self.methods.get_mut(&method) {
            *count = count.saturating_sub(1);
        }
        if let Some(key) = key {
            let entry_key = (method, key.clone());
            let drained = match self.by_key.get_mut(&entry_key) {
                Some(mut count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            };
            if drained {
                self.by_key.remove(&entry_key);
            }
        }
    }

    /// In-flight count for a method.
    pub fn count(&self, method: Method) -> usize {
        self.methods.get(&method).map(|c| *c).unwrap_or(0)
    }

    /// Whether any call of `method` is in flight.
    pub fn is_pending(&self, method: Method) -> bool {
        self.count(method) > 0
    }

    /// In-flight count for a method on a specific identity.
    pub fn key_count(&self, method: Method, key: &RecordKey) -> usize {
        self.by_key
            .get(&(method, key.clone()))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Whether a call of `method` is in flight for `key`.
    pub fn is_key_pending(&self, method: Method, key: &RecordKey) -> bool {
        self.key_count(method, key) > 0
    }

    /// Reset all counters.
    pub fn clear(&self) {
        self.methods.clear();
        self.by_key.clear();
    }
}
