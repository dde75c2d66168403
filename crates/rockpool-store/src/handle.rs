//! Bound record handles: clone/commit/reset/diff tied to a store.
//!
//! Instead of attaching behavior onto record data, a [`BoundRecord`] is an
//! explicit capability struct pairing a store with one identity. The
//! record itself stays plain data.

use std::sync::Arc;

use rockpool_query::Fields;

use crate::clones::{CloneOptions, DiffDefinition, WithFields};
use crate::error::StoreError;
use crate::id::RecordKey;
use crate::record::Record;
use crate::store::Store;

/// A record identity bound to the store that owns it.
#[derive(Debug, Clone)]
pub struct BoundRecord {
    store: Arc<Store>,
    key: RecordKey,
}

impl BoundRecord {
    /// Bind a key to a store.
    pub fn new(store: Arc<Store>, key: RecordKey) -> Self {
        Self { store, key }
    }

    /// Bind a record by resolving its key against the store's id field.
    pub fn from_record(store: Arc<Store>, record: &Record) -> Result<Self, StoreError> {
        let key = record.key(store.id_field()).ok_or_else(|| {
            StoreError::InvalidState("record has no resolvable identity".to_string())
        })?;
        Ok(Self { store, key })
    }

    /// The bound identity.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// The owning store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The current authoritative record, if it is still stored.
    pub fn record(&self) -> Option<Record> {
        self.store.get_from_store(&self.key)
    }

    /// The live clone for this identity, if one exists.
    pub fn existing_clone(&self) -> Option<Record> {
        self.store.clones.get(&self.key)
    }

    /// Produce (or with `use_existing`, fetch) the editable snapshot.
    pub fn make_clone(
        &self,
        overrides: Option<Fields>,
        options: CloneOptions,
    ) -> Result<Record, StoreError> {
        let source = self
            .record()
            .ok_or_else(|| StoreError::NotFound(self.key.clone()))?;
        self.store.clone_record(&source, overrides, options)
    }

    /// Commit the live clone back onto the source.
    pub fn commit(&self, data: Option<Fields>) -> Result<Record, StoreError> {
        let clone = self.existing_clone().ok_or_else(|| {
            StoreError::InvalidState(format!("no clone exists for {}", self.key))
        })?;
        self.store.commit_clone(&clone, data)
    }

    /// Reset the live clone from current source state.
    pub fn reset(&self, data: Option<Fields>) -> Result<Record, StoreError> {
        let clone = self.existing_clone().ok_or_else(|| {
            StoreError::InvalidState(format!("no clone exists for {}", self.key))
        })?;
        self.store.reset_clone(&clone, data)
    }

    /// Diff the live clone against the source.
    pub fn diff(
        &self,
        definition: &DiffDefinition,
        with: Option<&WithFields>,
    ) -> Result<Fields, StoreError> {
        let clone = self.existing_clone().ok_or_else(|| {
            StoreError::InvalidState(format!("no clone exists for {}", self.key))
        })?;
        self.store.diff_clone(&clone, definition, with)
    }

    /// Merge `data` onto the stored record.
    pub fn patch(&self, data: Fields) -> Result<Record, StoreError> {
        self.store.patch_in_store(&self.key, data)
    }

    /// Remove the record from all tables.
    pub fn remove(&self) -> Option<Record> {
        self.store.remove_from_store(&self.key)
    }
}
