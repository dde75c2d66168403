//! The record store: three tables, local queries, pagination bookkeeping,
//! and pending counters for one mirrored service.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use rockpool_query::{
    Filters, OperatorSet, Query, RESERVED_FILTERS, record_matches, sorter, split_query, strip_keys,
};

use crate::clones::CloneOptions;
use crate::error::StoreError;
use crate::id::{RecordId, RecordKey, TempId};
use crate::pagination::PaginationCache;
use crate::pending::PendingTracker;
use crate::record::Record;
use crate::table::RecordTable;

/// Broadcast channel capacity for store updates.
/// High enough to ride out event-reconciliation bursts without lagging
/// subscribers.
const UPDATES_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for one store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    /// Field holding the permanent, server-assigned identity.
    pub id_field: String,
    /// `$limit` injected into service finds that carry none.
    pub default_limit: usize,
    /// Extra operator names allowed beyond the built-in set.
    pub whitelist: Vec<String>,
    /// Query keys meant for the server only, stripped before local
    /// evaluation.
    pub params_for_server: Vec<String>,
    /// Whether this store hydrates from a server-rendered snapshot.
    pub ssr: bool,
    /// How long an SSR pagination marker stays fresh.
    pub ssr_ttl_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            default_limit: 10,
            whitelist: Vec::new(),
            params_for_server: Vec::new(),
            ssr: false,
            ssr_ttl_ms: 2_000,
        }
    }
}

/// Caller parameters for local reads and removals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// The query object; required by `count_in_store`.
    pub query: Option<Query>,
    /// Include temp records in the candidate set.
    pub temps: bool,
    /// Map results through the use-existing-or-create clone path.
    pub clones: bool,
    /// Query identifier for pagination bookkeeping.
    pub qid: Option<String>,
}

impl Params {
    /// Params carrying only a query.
    pub fn with_query(query: Query) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }
}

/// Result of a local find: totals reflect the pre-pagination match count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindResult {
    pub total: usize,
    pub limit: Option<usize>,
    pub skip: usize,
    pub data: Vec<Record>,
}

/// Update event for store subscribers.
///
/// A thin adapter can wrap these into whatever observable container the
/// UI layer uses; the store itself stays synchronous.
#[derive(Debug, Clone)]
pub enum StoreUpdate {
    /// A record entered the items or temps table.
    Created { key: RecordKey, record: Record },
    /// A stored record was merged into.
    Updated { key: RecordKey, record: Record },
    /// A record left all tables.
    Removed { key: RecordKey },
    /// The store was cleared.
    Cleared,
}

/// The local mirror of one remote service.
///
/// Owns the three record tables, the pagination cache, and the pending
/// tracker. All mutation goes through identity resolution and the table
/// operations; readers always see current table state.
pub struct Store {
    options: StoreOptions,
    operators: OperatorSet,
    pub(crate) items: RecordTable,
    pub(crate) temps: RecordTable,
    pub(crate) clones: RecordTable,
    /// Promoted temp identities, kept as ephemeral aliases for matching.
    temp_aliases: RwLock<HashMap<TempId, RecordId>>,
    pagination: PaginationCache,
    pending: PendingTracker,
    updates_tx: broadcast::Sender<StoreUpdate>,
}

impl Store {
    /// Create a store with the default operator set.
    pub fn new(options: StoreOptions) -> Self {
        let operators =
            OperatorSet::default().with_operators(options.whitelist.iter().cloned());
        Self::with_operators(options, operators)
    }

    /// Create a store with a caller-supplied operator set.
    pub fn with_operators(options: StoreOptions, operators: OperatorSet) -> Self {
        let (updates_tx, _) = broadcast::channel(UPDATES_CHANNEL_CAPACITY);
        Self {
            pagination: PaginationCache::new(options.ssr_ttl_ms),
            options,
            operators,
            items: RecordTable::new(),
            temps: RecordTable::new(),
            clones: RecordTable::new(),
            temp_aliases: RwLock::new(HashMap::new()),
            pending: PendingTracker::new(),
            updates_tx,
        }
    }

    /// The store's configuration.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The configured identity field.
    pub fn id_field(&self) -> &str {
        &self.options.id_field
    }

    /// The operator set used by local queries.
    pub fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    /// Pagination bookkeeping for this store.
    pub fn pagination(&self) -> &PaginationCache {
        &self.pagination
    }

    /// In-flight request counters for this store.
    pub fn pending(&self) -> &PendingTracker {
        &self.pending
    }

    /// Subscribe to store updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates_tx.subscribe()
    }

    fn broadcast(&self, update: StoreUpdate) {
        if self.updates_tx.send(update).is_err() {
            trace!("no subscribers for store update");
        }
    }

    // =========================================================================
    // Writers
    // =========================================================================

    /// Add one record or an array of records to the store.
    ///
    /// Records with a permanent identity merge into the items table;
    /// records without one are assigned a temp identity and land in the
    /// temps table. A record whose temp identity matches an existing temps
    /// entry and that now carries a permanent identity is promoted: moved
    /// into the items table, with the temp identity retained only as an
    /// alias for matching.
    pub fn add_to_store(&self, data: Value) -> Result<Vec<Record>, StoreError> {
        match data {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.add_record(Record::from_value(item)?))
                .collect(),
            other => Ok(vec![self.add_record(Record::from_value(other)?)?]),
        }
    }

    /// Alias for [`Store::add_to_store`].
    pub fn create_in_store(&self, data: Value) -> Result<Vec<Record>, StoreError> {
        self.add_to_store(data)
    }

    /// Add a single, already-constructed record.
    pub fn add_record(&self, mut record: Record) -> Result<Record, StoreError> {
        let id_field = self.id_field();

        if record.is_clone() {
            let key = record.key(id_field).ok_or_else(|| {
                StoreError::InvalidState("clone has no identity or temp identity".to_string())
            })?;
            return Ok(self.clones.merge(key, record));
        }

        match record.id(id_field) {
            Some(id) => {
                let key = RecordKey::Id(id.clone());
                let was_present = self.items.contains(&key);

                if let Some(temp) = record.temp_id().cloned() {
                    let temp_key = RecordKey::Temp(temp.clone());
                    if let Some(mut confirmed) = self.temps.remove(&temp_key) {
                        confirmed.merge_fields(record.fields());
                        record = confirmed;
                        self.temp_aliases.write().insert(temp, id.clone());
                        debug!(key = %key, "promoted temp record");
                    }
                }

                let stored = self.items.merge(key.clone(), record);
                self.broadcast(if was_present {
                    StoreUpdate::Updated {
                        key,
                        record: stored.clone(),
                    }
                } else {
                    StoreUpdate::Created {
                        key,
                        record: stored.clone(),
                    }
                });
                Ok(stored)
            }
            None => {
                let temp = record.ensure_temp_id().clone();
                let key = RecordKey::Temp(temp);
                let was_present = self.temps.contains(&key);
                let stored = self.temps.merge(key.clone(), record);
                self.broadcast(if was_present {
                    StoreUpdate::Updated {
                        key,
                        record: stored.clone(),
                    }
                } else {
                    StoreUpdate::Created {
                        key,
                        record: stored.clone(),
                    }
                });
                Ok(stored)
            }
        }
    }

    /// Merge `data` onto the stored record for `key`.
    pub fn patch_in_store(
        &self,
        key: &RecordKey,
        data: rockpool_query::Fields,
    ) -> Result<Record, StoreError> {
        let key = self.locate(key).ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let patch = Record::new(data);
        let stored = if self.items.contains(&key) {
            self.items.merge(key.clone(), patch)
        } else {
            self.temps.merge(key.clone(), patch)
        };
        self.broadcast(StoreUpdate::Updated {
            key,
            record: stored.clone(),
        });
        Ok(stored)
    }

    /// Remove a record from all tables. Removal of an absent identity is
    /// an idempotent no-op.
    pub fn remove_from_store(&self, key: &RecordKey) -> Option<Record> {
        let key = self.locate(key).unwrap_or_else(|| key.clone());

        let removed = self.items.remove(&key);
        let removed = self.temps.remove(&key).or(removed);
        let from_clones = self.clones.remove(&key);
        let removed = removed.or(from_clones);

        if removed.is_some() {
            if let RecordKey::Id(id) = &key {
                self.temp_aliases.write().retain(|_, aliased| aliased != id);
            }
            if let RecordKey::Temp(temp) = &key {
                self.temp_aliases.write().remove(temp);
            }
            self.broadcast(StoreUpdate::Removed { key });
        }
        removed
    }

    /// Run the filter engine over items + clones (+ temps when requested)
    /// and remove every match from all tables.
    pub fn remove_by_query(&self, params: &Params) -> Result<Vec<Record>, StoreError> {
        let (matched, _) = self.filter_records(params, self.clones.list())?;

        let mut removed = Vec::with_capacity(matched.len());
        for record in matched {
            if let Some(key) = record.key(self.id_field())
                && let Some(record) = self.remove_from_store(&key)
            {
                removed.push(record);
            }
        }
        Ok(removed)
    }

    /// Clear all tables, pagination state, pending counters, and aliases.
    pub fn clear_all(&self) {
        self.items.clear();
        self.temps.clear();
        self.clones.clear();
        self.temp_aliases.write().clear();
        self.pagination.clear();
        self.pending.clear();
        self.broadcast(StoreUpdate::Cleared);
        debug!("store cleared");
    }

    // =========================================================================
    // Readers
    // =========================================================================

    /// Filter, sort, and paginate the current table state.
    ///
    /// `total` reflects the pre-pagination match count, not `data.len()`.
    pub fn find_in_store(&self, params: &Params) -> Result<FindResult, StoreError> {
        let (mut values, filters) = self.filter_records(params, Vec::new())?;
        let total = values.len();

        if let Some(spec) = &filters.sort {
            let compare = sorter(spec);
            values.sort_by(|a, b| compare(a.fields(), b.fields()));
        }

        let data: Vec<Record> = values
            .into_iter()
            .skip(filters.skip)
            .take(filters.limit.unwrap_or(usize::MAX))
            .collect();

        let data = if params.clones {
            data.into_iter()
                .map(|record| {
                    self.clone_record(&record, None, CloneOptions { use_existing: true })
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            data
        };

        let data = match &filters.select {
            Some(selected) => data
                .iter()
                .map(|record| record.select(selected, self.id_field()))
                .collect(),
            None => data,
        };

        Ok(FindResult {
            total,
            limit: filters.limit,
            skip: filters.skip,
            data,
        })
    }

    /// First match of `find_in_store`, if any.
    pub fn find_one_in_store(&self, params: &Params) -> Result<Option<Record>, StoreError> {
        let mut params = params.clone();
        let mut query = params.query.take().unwrap_or_default();
        query.insert("$limit".to_string(), Value::from(1));
        params.query = Some(query);
        Ok(self.find_in_store(&params)?.data.into_iter().next())
    }

    /// Count matches, ignoring pagination filters. Fails with an invalid
    /// query error when no query object is provided.
    pub fn count_in_store(&self, params: &Params) -> Result<usize, StoreError> {
        let query = params
            .query
            .as_ref()
            .ok_or(rockpool_query::QueryError::MissingQuery)?;

        let mut params = params.clone();
        params.query = Some(strip_keys(query, RESERVED_FILTERS));
        // counting must not create clones as a side effect
        params.clones = false;
        Ok(self.find_in_store(&params)?.total)
    }

    /// Look up a record: items first, then temps, then promoted-temp
    /// aliases. Returns `None` when absent everywhere.
    pub fn get_from_store(&self, key: &RecordKey) -> Option<Record> {
        self.items
            .get(key)
            .or_else(|| self.temps.get(key))
            .or_else(|| {
                let resolved = self.locate(key)?;
                self.items.get(&resolved)
            })
    }

    /// [`Store::get_from_store`] honoring `$select` and clone substitution
    /// from `params`, identically to find.
    pub fn get_from_store_with(
        &self,
        key: &RecordKey,
        params: &Params,
    ) -> Result<Option<Record>, StoreError> {
        let Some(record) = self.get_from_store(key) else {
            return Ok(None);
        };

        let record = if params.clones {
            self.clone_record(&record, None, CloneOptions { use_existing: true })?
        } else {
            record
        };

        let filters = match &params.query {
            Some(query) => split_query(query)?.1,
            None => Filters::default(),
        };
        let record = match &filters.select {
            Some(selected) => record.select(selected, self.id_field()),
            None => record,
        };
        Ok(Some(record))
    }

    /// Convenience lookup by permanent identity.
    pub fn get_by_id(&self, id: impl Into<RecordId>) -> Option<Record> {
        self.get_from_store(&RecordKey::Id(id.into()))
    }

    /// All confirmed records in insertion order.
    pub fn items(&self) -> Vec<Record> {
        self.items.list()
    }

    /// All temp records in insertion order.
    pub fn temps(&self) -> Vec<Record> {
        self.temps.list()
    }

    /// All clones in insertion order.
    pub fn clones(&self) -> Vec<Record> {
        self.clones.list()
    }

    /// Number of confirmed records.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Number of temp records.
    pub fn temp_count(&self) -> usize {
        self.temps.len()
    }

    /// Number of clones.
    pub fn clone_count(&self) -> usize {
        self.clones.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Resolve a key to where the record actually lives, following the
    /// temp alias left behind by promotion.
    pub(crate) fn locate(&self, key: &RecordKey) -> Option<RecordKey> {
        if self.items.contains(key) || self.temps.contains(key) {
            return Some(key.clone());
        }
        let temp = match key {
            RecordKey::Temp(temp) => temp.clone(),
            // a string id may be a stale reference to a promoted temp
            RecordKey::Id(RecordId::Str(s)) => TempId::from(s.clone()),
            RecordKey::Id(RecordId::Int(_)) => return None,
        };
        let aliased = self.temp_aliases.read().get(&temp).cloned()?;
        Some(RecordKey::Id(aliased))
    }

    /// Build the candidate set and evaluate match criteria.
    ///
    /// `starting` values are seeded before table records, so callers like
    /// `remove_by_query` can extend the search across clones.
    pub(crate) fn filter_records(
        &self,
        params: &Params,
        starting: Vec<Record>,
    ) -> Result<(Vec<Record>, Filters), StoreError> {
        let query = params.query.clone().unwrap_or_default();
        let query = strip_keys(&query, &self.options.params_for_server);
        let (criteria, filters) = split_query(&query)?;

        let mut candidates = starting;
        candidates.extend(self.items.list());
        if params.temps {
            candidates.extend(self.temps.list());
        }

        let mut matched = Vec::with_capacity(candidates.len());
        for record in candidates {
            if record_matches(&criteria, record.fields(), &self.operators)? {
                matched.push(record);
            }
        }
        Ok((matched, filters))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id_field", &self.options.id_field)
            .field("items", &self.items.len())
            .field("temps", &self.temps.len())
            .field("clones", &self.clones.len())
            .finish()
    }
}
