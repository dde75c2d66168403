//! Error types for the record store.

use thiserror::Error;

use crate::id::RecordKey;

/// Errors raised by store operations.
///
/// All failures are synchronous and detected at the offending call; the
/// store never silently swallows a structural invariant violation. Removal
/// of an absent identity is the one documented no-op.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record had no resolvable identity where one was required.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A missing or malformed query.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] rockpool_query::QueryError),

    /// The record a clone points at no longer exists in any table.
    #[error("record not found: {0}")]
    NotFound(RecordKey),

    /// A clone was requested for a record that already has one and the
    /// caller did not opt into reuse.
    #[error("a clone already exists for {0}")]
    CloneConflict(RecordKey),

    /// Record data that is not a JSON object.
    #[error("record data must be an object, got {0}")]
    NotAnObject(&'static str),
}
