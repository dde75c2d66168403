//! Splitting a query into match criteria and reserved filters.

use serde_json::Value;

use crate::error::QueryError;
use crate::sort::{SortSpec, parse_sort};
use crate::Query;

/// Reserved filter keys stripped from the match criteria.
pub const RESERVED_FILTERS: &[&str] = &["$sort", "$limit", "$skip", "$select"];

/// Validated reserved filters of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    /// Sort fields in priority order.
    pub sort: Option<SortSpec>,
    /// Page size; `None` means unlimited.
    pub limit: Option<usize>,
    /// Records to skip before the page starts.
    pub skip: usize,
    /// Fields to project; the identity field is always retained.
    pub select: Option<Vec<String>>,
}

/// Split a query into plain match criteria and validated reserved filters.
///
/// `$or`/`$and` stay in the criteria; only `$sort`, `$limit`, `$skip`, and
/// `$select` are extracted. Malformed filter values fail with
/// [`QueryError::InvalidFilter`].
pub fn split_query(query: &Query) -> Result<(Query, Filters), QueryError> {
    let mut criteria = Query::new();
    let mut filters = Filters::default();

    for (key, value) in query {
        match key.as_str() {
            "$sort" => filters.sort = Some(parse_sort(value)?),
            "$limit" => filters.limit = Some(non_negative(key, value)?),
            "$skip" => filters.skip = non_negative(key, value)?,
            "$select" => filters.select = Some(string_list(key, value)?),
            _ => {
                criteria.insert(key.clone(), value.clone());
            }
        }
    }

    Ok((criteria, filters))
}

/// Return a copy of `query` with the given keys removed.
///
/// Used to strip server-only params before local evaluation and to strip
/// pagination filters for counting.
pub fn strip_keys(query: &Query, keys: &[impl AsRef<str>]) -> Query {
    let mut out = query.clone();
    for key in keys {
        out.remove(key.as_ref());
    }
    out
}

fn non_negative(filter: &str, value: &Value) -> Result<usize, QueryError> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| QueryError::InvalidFilter {
            filter: filter.to_string(),
            reason: "expects a non-negative integer".to_string(),
        })
}

fn string_list(filter: &str, value: &Value) -> Result<Vec<String>, QueryError> {
    let Value::Array(items) = value else {
        return Err(QueryError::InvalidFilter {
            filter: filter.to_string(),
            reason: "expects an array of field names".to_string(),
        });
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| QueryError::InvalidFilter {
                    filter: filter.to_string(),
                    reason: "expects an array of field names".to_string(),
                })
        })
        .collect()
}
