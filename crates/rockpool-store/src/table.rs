//! Insertion-ordered record tables.
//!
//! Three instances back a store: confirmed items, temps, and clones.
//! Tables are synchronous; locks are never held across an await point.

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::id::RecordKey;
use crate::record::Record;

/// A keyed, insertion-ordered container of records.
#[derive(Debug, Default)]
pub struct RecordTable {
    entries: RwLock<IndexMap<RecordKey, Record>>,
}

impl RecordTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if absent, else shallow-overwrite matching fields on the
    /// stored record. Returns the stored record after the merge.
    ///
    /// Merge is idempotent for identical input. An existing temp identity
    /// survives a merge that carries none.
    pub fn merge(&self, key: RecordKey, record: Record) -> Record {
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(existing) => {
                existing.merge_fields(record.fields());
                if let Some(temp) = record.temp_id() {
                    existing.set_temp_id(temp.clone());
                }
                existing.clone()
            }
            None => {
                entries.insert(key, record.clone());
                record
            }
        }
    }

    /// Insert or replace the record under `key`, discarding any previous
    /// entry. Returns the stored record.
    pub fn insert(&self, key: RecordKey, record: Record) -> Record {
        self.entries.write().insert(key, record.clone());
        record
    }

    /// Get a record by key.
    pub fn get(&self, key: &RecordKey) -> Option<Record> {
        self.entries.read().get(key).cloned()
    }

    /// Remove a record by key, preserving the order of the remaining
    /// entries. Removal of an absent key is a no-op.
    pub fn remove(&self, key: &RecordKey) -> Option<Record> {
        self.entries.write().shift_remove(key)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// All records in insertion order.
    pub fn list(&self) -> Vec<Record> {
        self.entries.read().values().cloned().collect()
    }

    /// All keys in insertion order.
    pub fn keys(&self) -> Vec<RecordKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove all records.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
