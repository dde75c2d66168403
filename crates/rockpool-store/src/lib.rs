//! Local record store mirroring a remote record service.
//!
//! A store keeps a queryable local copy of one service's records so
//! callers can read, filter, and paginate without a network round trip,
//! while server responses and realtime events reconcile into the same
//! tables.
//!
//! ## Features
//!
//! - **Tables**: insertion-ordered items/temps/clones tables with
//!   merge/remove/clear
//! - **Identity**: permanent ids extracted from a configured field,
//!   sortable temp ids for unconfirmed records, temp-to-permanent
//!   promotion
//! - **Local queries**: `find_in_store` / `get_from_store` /
//!   `count_in_store` over current table state
//! - **Clones**: the optimistic-edit lifecycle (clone, commit, reset,
//!   diff)
//! - **Pagination**: per-qid bookkeeping of server-reported page state
//! - **Pending**: per-method and per-identity in-flight counters

mod clones;
mod error;
mod handle;
mod id;
mod pagination;
mod pending;
mod record;
mod registry;
mod store;
mod table;

pub use clones::{CloneOptions, DiffDefinition, WithFields};
pub use error::StoreError;
pub use handle::BoundRecord;
pub use id::{RecordId, RecordKey, TempId};
pub use pagination::{DEFAULT_QID, PageParams, PaginationCache, PaginationEntry, stable_query_id};
pub use pending::{Method, PendingTracker};
pub use record::Record;
pub use registry::StoreRegistry;
pub use store::{FindResult, Params, Store, StoreOptions, StoreUpdate};

pub use rockpool_query::{Fields, OperatorSet, Query};
