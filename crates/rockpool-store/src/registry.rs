//! Store registry: one store per service path.
//!
//! Replaces per-service global singletons with an explicit mapping the
//! application constructs once at setup and passes by reference.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::store::{Store, StoreOptions};

/// Mapping from service path to store instance.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: DashMap<String, Arc<Store>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the store for a service path, creating it with `options` on
    /// first use.
    pub fn get_or_create(&self, path: impl Into<String>, options: StoreOptions) -> Arc<Store> {
        let path = path.into();
        self.stores
            .entry(path.clone())
            .or_insert_with(|| {
                debug!(path = %path, "store registered");
                Arc::new(Store::new(options))
            })
            .clone()
    }

    /// Register an already-constructed store, replacing any previous one
    /// under the same path.
    pub fn register(&self, path: impl Into<String>, store: Arc<Store>) {
        self.stores.insert(path.into(), store);
    }

    /// The store for a service path, if registered.
    pub fn get(&self, path: &str) -> Option<Arc<Store>> {
        self.stores.get(path).map(|entry| entry.clone())
    }

    /// Registered service paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether no store is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Teardown: clear the data of every registered store. Registrations
    /// themselves are kept.
    pub fn clear_all(&self) {
        for entry in self.stores.iter() {
            entry.value().clear_all();
        }
        debug!(stores = self.stores.len(), "all stores cleared");
    }
}
