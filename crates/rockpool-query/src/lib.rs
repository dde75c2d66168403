//! MongoDB-style local query language for rockpool stores.
//!
//! This crate implements the predicate half of the local query engine:
//! splitting a query object into match criteria and reserved filters,
//! evaluating the criteria against a record's field map, sorting, and
//! field projection. The storage half lives in `rockpool-store`.
//!
//! ## Features
//!
//! - **Filters**: `$sort`, `$limit`, `$skip`, `$select` extraction and
//!   validation
//! - **Predicates**: equality, ranges, set membership, `$or`/`$and`,
//!   `$exists`, `$elemMatch`, `$regex`, SQL-style `$like` variants
//! - **Operator whitelist**: an [`OperatorSet`] callers can extend with
//!   custom operators without touching the evaluator

mod error;
mod filter;
mod predicate;
mod select;
mod sort;

pub use error::QueryError;
pub use filter::{Filters, RESERVED_FILTERS, split_query, strip_keys};
pub use predicate::{CustomOperator, OperatorSet, compare_values, lookup_path, record_matches};
pub use select::project;
pub use sort::{SortOrder, SortSpec, parse_sort, sorter};

/// A query object: ordinary field-match criteria plus reserved filter keys.
pub type Query = serde_json::Map<String, serde_json::Value>;

/// A record's field map, as evaluated by the predicate engine.
pub type Fields = serde_json::Map<String, serde_json::Value>;
