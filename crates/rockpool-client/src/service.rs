//! The mirror service: remote calls reconciled into the local store.
//!
//! Wraps an abstract [`RemoteService`] and a [`Store`]. Every call is
//! pending-tracked, every successful response merges into the store, and
//! paginated finds update the pagination cache. Concurrent fetches for the
//! same identity are not deduplicated here; the tracker only counts them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use rockpool_query::{Fields, Query};
use rockpool_store::{
    BoundRecord, DEFAULT_QID, DiffDefinition, FindResult, Method, PageParams, Params, Record,
    RecordId, RecordKey, Store, StoreError, WithFields,
};

use crate::error::{ClientError, TransportError};
use crate::events::EventKind;
use crate::locks::EventLocks;

/// A page of records as reported by the server.
#[derive(Debug, Clone)]
pub struct Page {
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
    pub data: Vec<Value>,
}

/// A find response: paginated metadata or a bare array.
#[derive(Debug, Clone)]
pub enum FindOutcome {
    Paginated(Page),
    Plain(Vec<Value>),
}

/// The abstract transport boundary.
///
/// Implementations perform the actual network or socket calls; the mirror
/// is format-agnostic as long as records come back as field maps with an
/// extractable identity.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn find(&self, query: &Query) -> Result<FindOutcome, TransportError>;
    async fn get(&self, id: &RecordId, query: &Query) -> Result<Value, TransportError>;
    async fn create(&self, data: Value) -> Result<Value, TransportError>;
    async fn patch(&self, id: &RecordId, data: Fields, query: &Query)
    -> Result<Value, TransportError>;
    async fn remove(&self, id: &RecordId, query: &Query) -> Result<Value, TransportError>;
}

/// Parameters for saving a clone's edits.
#[derive(Debug, Clone)]
pub struct SaveParams {
    /// Constrains which fields are diffed before the patch is sent.
    pub diff: DiffDefinition,
    /// Fields to include in the patch regardless of the diff outcome.
    pub with: Option<WithFields>,
    /// Apply the patch to the store before the server confirms, rolling
    /// back on transport failure.
    pub eager: bool,
}

impl Default for SaveParams {
    fn default() -> Self {
        Self {
            diff: DiffDefinition::default(),
            with: None,
            eager: true,
        }
    }
}

/// A remote service paired with the store that mirrors it.
pub struct MirrorService<S> {
    remote: S,
    store: Arc<Store>,
    locks: Arc<EventLocks>,
}

impl<S: RemoteService> MirrorService<S> {
    /// Pair a remote service with a store.
    pub fn new(remote: S, store: Arc<Store>) -> Self {
        Self {
            remote,
            store,
            locks: Arc::new(EventLocks::new()),
        }
    }

    /// Pair with a shared lock set, typically the one handed to the event
    /// reconciler.
    pub fn with_locks(remote: S, store: Arc<Store>, locks: Arc<EventLocks>) -> Self {
        Self {
            remote,
            store,
            locks,
        }
    }

    /// The mirrored store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The event locks armed by this service's mutations.
    pub fn locks(&self) -> &Arc<EventLocks> {
        &self.locks
    }

    /// The wrapped transport.
    pub fn remote(&self) -> &S {
        &self.remote
    }

    /// Fetch records from the server and merge them into the store.
    ///
    /// `$limit` defaults to the store's configured default limit and
    /// `$skip` to 0. A paginated response updates the pagination cache
    /// under the caller's qid; a bare array bypasses that bookkeeping.
    pub async fn find(&self, params: &Params) -> Result<FindResult, ClientError> {
        let mut query = params.query.clone().unwrap_or_default();
        let default_limit = self.store.options().default_limit;
        query
            .entry("$limit".to_string())
            .or_insert_with(|| Value::from(default_limit as u64));
        query
            .entry("$skip".to_string())
            .or_insert_with(|| Value::from(0u64));

        self.store.pending().begin(Method::Find, None);
        let outcome = self.remote.find(&query).await;
        self.store.pending().settle(Method::Find, None);

        match outcome? {
            FindOutcome::Paginated(page) => {
                let mut stored = Vec::with_capacity(page.data.len());
                for value in page.data {
                    stored.extend(self.store.add_to_store(value)?);
                }

                let qid = params
                    .qid
                    .clone()
                    .unwrap_or_else(|| DEFAULT_QID.to_string());
                self.store.pagination().update_for_query(
                    qid,
                    &query,
                    page.total,
                    PageParams {
                        limit: page.limit,
                        skip: page.skip,
                    },
                    self.store.options().ssr,
                );

                Ok(FindResult {
                    total: page.total,
                    limit: Some(page.limit),
                    skip: page.skip,
                    data: stored,
                })
            }
            FindOutcome::Plain(values) => {
                let mut stored = Vec::with_capacity(values.len());
                for value in values {
                    stored.extend(self.store.add_to_store(value)?);
                }
                Ok(FindResult {
                    total: stored.len(),
                    limit: None,
                    skip: 0,
                    data: stored,
                })
            }
        }
    }

    /// Count matches on the server without fetching a page.
    pub async fn count(&self, params: &Params) -> Result<usize, ClientError> {
        let mut query = params.query.clone().unwrap_or_default();
        query.insert("$limit".to_string(), Value::from(0u64));

        self.store.pending().begin(Method::Count, None);
        let outcome = self.remote.find(&query).await;
        self.store.pending().settle(Method::Count, None);

        match outcome? {
            FindOutcome::Paginated(page) => Ok(page.total),
            FindOutcome::Plain(values) => Ok(values.len()),
        }
    }

    /// Fetch one record and merge it into the store.
    ///
    /// A response that arrives after the caller lost interest still merges
    /// (last write wins by arrival order).
    pub async fn get(&self, id: &RecordId, params: &Params) -> Result<Record, ClientError> {
        let key = RecordKey::Id(id.clone());
        let query = params.query.clone().unwrap_or_default();

        self.store.pending().begin(Method::Get, Some(&key));
        let result = self.remote.get(id, &query).await;
        self.store.pending().settle(Method::Get, Some(&key));

        let record = Record::from_value(result?)?;
        Ok(self.store.add_record(record)?)
    }

    /// Create a record on the server.
    ///
    /// With `params.temps` the data lands in the temps table first, so the
    /// record is locally visible before the server confirms; the response
    /// then promotes it under its permanent identity. On transport failure
    /// the temp record stays for retry.
    pub async fn create(&self, data: Value, params: &Params) -> Result<Record, ClientError> {
        let temp = if params.temps {
            Some(self.store.add_to_store(data.clone())?.remove(0))
        } else {
            None
        };

        self.store.pending().begin(Method::Create, None);
        let result = self.remote.create(data).await;
        self.store.pending().settle(Method::Create, None);
        let value = result?;

        let mut record = Record::from_value(value)?;
        if let Some(temp) = &temp
            && let Some(temp_id) = temp.temp_id()
        {
            record = record.with_temp_id(temp_id.clone());
        }
        if let Some(key) = record.key(self.store.id_field()) {
            self.locks.lock(EventKind::Created, key);
        }
        Ok(self.store.add_record(record)?)
    }

    /// Patch a record on the server and merge the response.
    pub async fn patch(
        &self,
        id: &RecordId,
        data: Fields,
        params: &Params,
    ) -> Result<Record, ClientError> {
        let key = RecordKey::Id(id.clone());
        let query = params.query.clone().unwrap_or_default();

        self.store.pending().begin(Method::Patch, Some(&key));
        let result = self.remote.patch(id, data, &query).await;
        self.store.pending().settle(Method::Patch, Some(&key));
        let value = result?;

        self.locks.lock(EventKind::Patched, key);
        Ok(self.store.add_record(Record::from_value(value)?)?)
    }

    /// Remove a record on the server and from the store.
    pub async fn remove(
        &self,
        id: &RecordId,
        params: &Params,
    ) -> Result<Option<Record>, ClientError> {
        let key = RecordKey::Id(id.clone());
        let query = params.query.clone().unwrap_or_default();

        self.store.pending().begin(Method::Remove, Some(&key));
        let result = self.remote.remove(id, &query).await;
        self.store.pending().settle(Method::Remove, Some(&key));
        result?;

        self.locks.lock(EventKind::Removed, key.clone());
        Ok(self.store.remove_from_store(&key))
    }

    /// Local removal by id or by query.
    ///
    /// With neither an id nor a query there is nothing to address; that
    /// case is a documented no-op returning an empty list.
    pub fn remove_from_store(
        &self,
        id: Option<&RecordId>,
        params: Option<&Params>,
    ) -> Result<Vec<Record>, ClientError> {
        match (id, params) {
            (Some(id), _) => Ok(self
                .store
                .remove_from_store(&RecordKey::Id(id.clone()))
                .into_iter()
                .collect()),
            (None, Some(params)) if params.query.is_some() => {
                Ok(self.store.remove_by_query(params)?)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Save a clone's edits: diff, patch minimally, commit on success.
    ///
    /// An empty diff resolves as a no-op success without contacting the
    /// server, leaving the clone in place. Eager mode applies the patch to
    /// the store before the server confirms and rolls back on transport
    /// failure.
    pub async fn save(
        &self,
        handle: &BoundRecord,
        params: &SaveParams,
    ) -> Result<Record, ClientError> {
        let key = handle.key().clone();
        let id = key.id().cloned().ok_or_else(|| {
            StoreError::InvalidState("save requires a server-confirmed identity".to_string())
        })?;
        let clone = handle.existing_clone().ok_or_else(|| {
            StoreError::InvalidState(format!("no clone exists for {key}"))
        })?;

        let patch = self.store.diff_clone(&clone, &params.diff, params.with.as_ref())?;
        if patch.is_empty() {
            trace!(key = %key, "save diff is empty, skipping request");
            return self
                .store
                .get_from_store(&key)
                .ok_or_else(|| ClientError::from(StoreError::NotFound(key.clone())));
        }

        if params.eager {
            let snapshot = self.store.get_from_store(&key);
            self.store.patch_in_store(&key, patch.clone())?;
            match self.patch(&id, patch, &Params::default()).await {
                Ok(stored) => {
                    self.store.commit_clone(&clone, Some(Fields::new()))?;
                    Ok(stored)
                }
                Err(error) => {
                    if let Some(snapshot) = snapshot {
                        let _ = self.store.add_record(snapshot);
                    }
                    Err(error)
                }
            }
        } else {
            let stored = self.patch(&id, patch, &Params::default()).await?;
            self.store.commit_clone(&clone, Some(Fields::new()))?;
            Ok(stored)
        }
    }
}

impl<S> std::fmt::Debug for MirrorService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorService")
            .field("store", &self.store)
            .finish()
    }
}
