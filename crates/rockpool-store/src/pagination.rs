//! Per-query pagination bookkeeping.
//!
//! Each successful paginated server fetch records its page parameters and
//! matched total under a caller-supplied query identifier (qid). Entries
//! also carry a stable `query_id` derived from the non-pagination query
//! shape, so different pages of the same logical query share accounting.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use rockpool_query::Query;

/// The qid used when a caller does not partition its queries.
pub const DEFAULT_QID: &str = "default";

/// Page parameters of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    pub limit: usize,
    pub skip: usize,
}

/// The most recent server-reported state for one qid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationEntry {
    /// Caller-chosen query identifier.
    pub qid: String,
    /// Stable serialization of the non-pagination query shape.
    pub query_id: String,
    /// The query as issued, pagination filters included.
    pub query_params: Query,
    /// Page parameters of the fetch.
    pub page_params: PageParams,
    /// Matched total before pagination, as reported by the server.
    pub total: usize,
    /// When the fetch settled.
    pub queried_at: DateTime<Utc>,
    /// One-shot marker: this page came from a server-rendered snapshot.
    pub from_ssr: bool,
}

/// Pagination state per query identifier.
#[derive(Debug)]
pub struct PaginationCache {
    entries: RwLock<HashMap<String, PaginationEntry>>,
    ssr_ttl: Duration,
}

impl PaginationCache {
    /// Create a cache whose SSR markers expire after `ssr_ttl_ms`.
    pub fn new(ssr_ttl_ms: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ssr_ttl: Duration::milliseconds(ssr_ttl_ms as i64),
        }
    }

    /// Record (or overwrite) the entry for `qid` after a successful fetch.
    pub fn update_for_query(
        &self,
        qid: impl Into<String>,
        query: &Query,
        total: usize,
        page_params: PageParams,
        from_ssr: bool,
    ) {
        let qid = qid.into();
        let entry = PaginationEntry {
            query_id: stable_query_id(query),
            query_params: query.clone(),
            page_params,
            total,
            queried_at: Utc::now(),
            from_ssr,
            qid: qid.clone(),
        };
        trace!(qid = %entry.qid, total, "pagination updated");
        self.entries.write().insert(qid, entry);
    }

    /// The most recent entry for `qid`.
    pub fn get(&self, qid: &str) -> Option<PaginationEntry> {
        self.entries.read().get(qid).cloned()
    }

    /// Clear the one-shot SSR marker once the client has taken over, so a
    /// later identical query is not mistaken for already-fresh data.
    pub fn unflag_ssr(&self, qid: &str) {
        if let Some(entry) = self.entries.write().get_mut(qid) {
            entry.from_ssr = false;
        }
    }

    /// Whether `qid` still holds an unexpired SSR snapshot.
    pub fn is_ssr_fresh(&self, qid: &str) -> bool {
        self.entries
            .read()
            .get(qid)
            .is_some_and(|entry| entry.from_ssr && Utc::now() - entry.queried_at < self.ssr_ttl)
    }

    /// Number of tracked qids.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no qid is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop all entries. Called on full store clear.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Canonical serialization of a query's non-pagination shape.
///
/// Strips `$limit` and `$skip`, then serializes with recursively sorted
/// object keys so key order cannot split one logical query into several.
pub fn stable_query_id(query: &Query) -> String {
    let mut shape = query.clone();
    shape.remove("$limit");
    shape.remove("$skip");
    canonicalize(&Value::Object(shape)).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
