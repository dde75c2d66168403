//! The optimistic-edit lifecycle: clone, commit, reset, diff.
//!
//! A clone is an editable snapshot of a record. Callers mutate the clone
//! freely, then either commit it back onto its source or reset it from
//! current source state. `diff` computes the minimal patch a save needs
//! to send.

use serde_json::Value;
use tracing::trace;

use rockpool_query::Fields;

use crate::error::StoreError;
use crate::record::Record;
use crate::store::Store;

/// Options for requesting a clone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOptions {
    /// Reuse a live clone instead of failing with a conflict.
    pub use_existing: bool,
}

/// Constrains which fields `diff` compares.
#[derive(Debug, Clone, Default)]
pub enum DiffDefinition {
    /// Compare every clone field against the source (the default).
    #[default]
    Changed,
    /// Compare a single named field.
    Field(String),
    /// Compare the named fields.
    Fields(Vec<String>),
    /// Compare the provided values against the source, ignoring the
    /// clone's current state.
    Values(Fields),
    /// Skip comparison and send the clone's full field set.
    Disabled,
}

/// Fields to force into a patch regardless of the diff outcome.
#[derive(Debug, Clone)]
pub enum WithFields {
    /// Include the clone's current value for one field.
    Field(String),
    /// Include the clone's current values for the named fields.
    Fields(Vec<String>),
    /// Include these exact values.
    Values(Fields),
}

impl Store {
    /// Produce an editable snapshot of `source` and track it in the clone
    /// table.
    ///
    /// By default a second clone request for the same identity fails with
    /// a conflict; pass `use_existing` to get the live clone back instead.
    /// The snapshot is taken from current table state when the source is
    /// stored, falling back to the passed record otherwise.
    pub fn clone_record(
        &self,
        source: &Record,
        overrides: Option<Fields>,
        options: CloneOptions,
    ) -> Result<Record, StoreError> {
        let key = source.key(self.id_field()).ok_or_else(|| {
            StoreError::InvalidState("cannot clone a record with no resolvable identity".to_string())
        })?;

        if let Some(existing) = self.clones.get(&key) {
            if options.use_existing {
                return Ok(existing);
            }
            return Err(StoreError::CloneConflict(key));
        }

        let mut cloned = self
            .items
            .get(&key)
            .or_else(|| self.temps.get(&key))
            .unwrap_or_else(|| source.clone());
        if let Some(overrides) = &overrides {
            cloned.merge_fields(overrides);
        }
        cloned.mark_clone(true);

        trace!(key = %key, "clone created");
        Ok(self.clones.insert(key, cloned))
    }

    /// Merge the clone's edits back onto its source and discard the clone
    /// entry. Returns the updated source record.
    ///
    /// With `data`, only those fields are merged; otherwise the clone's
    /// full field set is. A vanished source fails with not-found and the
    /// clone entry is kept so the caller can retry.
    pub fn commit_clone(
        &self,
        clone: &Record,
        data: Option<Fields>,
    ) -> Result<Record, StoreError> {
        let key = clone.key(self.id_field()).ok_or_else(|| {
            StoreError::InvalidState("clone has no resolvable identity".to_string())
        })?;

        let patch = Record::new(data.unwrap_or_else(|| clone.fields().clone()));
        let stored = if self.items.contains(&key) {
            self.items.merge(key.clone(), patch)
        } else if self.temps.contains(&key) {
            self.temps.merge(key.clone(), patch)
        } else {
            return Err(StoreError::NotFound(key));
        };

        self.clones.remove(&key);
        trace!(key = %key, "clone committed");
        Ok(stored)
    }

    /// Discard the clone's uncommitted edits, re-deriving it from the
    /// current source record, optionally re-applying `data` overrides.
    /// The clone stays in the clone table.
    pub fn reset_clone(&self, clone: &Record, data: Option<Fields>) -> Result<Record, StoreError> {
        let key = clone.key(self.id_field()).ok_or_else(|| {
            StoreError::InvalidState("clone has no resolvable identity".to_string())
        })?;

        let mut fresh = self
            .items
            .get(&key)
            .or_else(|| self.temps.get(&key))
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if let Some(data) = &data {
            fresh.merge_fields(data);
        }
        fresh.mark_clone(true);

        trace!(key = %key, "clone reset");
        Ok(self.clones.insert(key, fresh))
    }

    /// The subset of fields that differ between the clone and its source,
    /// constrained by `definition`, with `with` fields force-included.
    ///
    /// The identity field is never part of the patch. An empty result with
    /// no `with` fields means a save can resolve as a no-op without
    /// contacting the server.
    pub fn diff_clone(
        &self,
        clone: &Record,
        definition: &DiffDefinition,
        with: Option<&WithFields>,
    ) -> Result<Fields, StoreError> {
        let key = clone.key(self.id_field()).ok_or_else(|| {
            StoreError::InvalidState("clone has no resolvable identity".to_string())
        })?;
        let source = self
            .items
            .get(&key)
            .or_else(|| self.temps.get(&key))
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let mut patch = Fields::new();
        match definition {
            DiffDefinition::Changed => {
                for (field, value) in clone.fields() {
                    if self.differs(field, Some(value), &source) {
                        patch.insert(field.clone(), value.clone());
                    }
                }
            }
            DiffDefinition::Field(field) => {
                self.diff_named(clone, &source, std::slice::from_ref(field), &mut patch);
            }
            DiffDefinition::Fields(fields) => {
                self.diff_named(clone, &source, fields, &mut patch);
            }
            DiffDefinition::Values(values) => {
                for (field, value) in values {
                    if self.differs(field, Some(value), &source) {
                        patch.insert(field.clone(), value.clone());
                    }
                }
            }
            DiffDefinition::Disabled => {
                for (field, value) in clone.fields() {
                    if field != self.id_field() {
                        patch.insert(field.clone(), value.clone());
                    }
                }
            }
        }

        match with {
            Some(WithFields::Field(field)) => {
                if let Some(value) = clone.get(field) {
                    patch.insert(field.clone(), value.clone());
                }
            }
            Some(WithFields::Fields(fields)) => {
                for field in fields {
                    if let Some(value) = clone.get(field) {
                        patch.insert(field.clone(), value.clone());
                    }
                }
            }
            Some(WithFields::Values(values)) => {
                for (field, value) in values {
                    patch.insert(field.clone(), value.clone());
                }
            }
            None => {}
        }

        Ok(patch)
    }

    fn diff_named(&self, clone: &Record, source: &Record, fields: &[String], patch: &mut Fields) {
        for field in fields {
            let value = clone.get(field);
            if self.differs(field, value, source) {
                patch.insert(
                    field.clone(),
                    value.cloned().unwrap_or(Value::Null),
                );
            }
        }
    }

    fn differs(&self, field: &str, value: Option<&Value>, source: &Record) -> bool {
        field != self.id_field() && value != source.get(field)
    }
}
