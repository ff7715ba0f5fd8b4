//! Thread-Safe Record Engine with Secondary Indexing
//!
//! This module implements the shared storage engine for EmberKV.
//! It holds every record, regardless of namespace, in one table set: the
//! record table keyed by id, and a secondary index mapping payload-field
//! values back to ids.
//!
//! ## Design Decisions
//!
//! 1. **One lock, two tables**: every mutation must update the record table
//!    and the secondary index together, so both live behind a single
//!    `RwLock`. Reads still run concurrently; writes serialize.
//! 2. **Reads never delete**: an expired record is invisible to lookups but
//!    stays in the table until a destroy, a revocation, or a purge sweep
//!    removes it.
//! 3. **Payloads stored encoded**: the opaque JSON payload is held as
//!    `bytes::Bytes` and decoded at the read boundary. The index terms a
//!    record contributed are cached on the row so replacing or removing it
//!    never reparses the payload.
//! 4. **Amortized purging**: a relaxed atomic counter of upserts triggers a
//!    full sweep every N writes ([`StorageEngine::maybe_sweep`]).
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      StorageEngine                         │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                  RwLock<Tables>                      │  │
//! │  │    records: id -> StoredRecord                       │  │
//! │  │    index:   (field, value) -> {ids}                  │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │    upserts_since_sweep: AtomicU64   (purge cadence)        │
//! │    stats counters:      AtomicU64   (relaxed)              │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is wrapped in an `Arc` and shared by every namespace-scoped
//! [`RecordStore`](crate::RecordStore) handle, so the purge cadence is
//! process-wide rather than per-namespace.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::{index_terms, is_live, IndexField, Payload, Record, CONSUMED_KEY};

/// Default number of upserts between purge sweeps.
pub const DEFAULT_PURGE_THRESHOLD: u64 = 10;

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of upserts between purge sweeps (default: 10).
    /// Values below 1 are treated as 1, i.e. a sweep on every upsert.
    pub purge_threshold: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            purge_threshold: DEFAULT_PURGE_THRESHOLD,
        }
    }
}

impl StoreConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of upserts between purge sweeps.
    pub fn with_purge_threshold(mut self, purge_threshold: u64) -> Self {
        self.purge_threshold = purge_threshold;
        self
    }
}

/// A record as the table holds it: payload encoded, index terms cached.
#[derive(Debug, Clone)]
struct StoredRecord {
    /// Namespace of the store handle that last wrote this record
    namespace: String,
    /// JSON-encoded payload
    payload: Bytes,
    /// When this record expires (None = never expires)
    expires_at: Option<DateTime<Utc>>,
    /// Last write time
    updated_at: DateTime<Utc>,
    /// The `(field, value)` pairs this record put into the secondary index
    index_terms: Vec<(IndexField, String)>,
}

impl StoredRecord {
    /// Checks whether lookups may still return this record at `now`.
    #[inline]
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        is_live(self.expires_at, now)
    }
}

/// The record table and its secondary index, mutated together.
#[derive(Debug, Default)]
struct Tables {
    /// All records, keyed by id across every namespace
    records: HashMap<String, StoredRecord>,
    /// Secondary index: payload field value back to the ids carrying it
    index: HashMap<(IndexField, String), HashSet<String>>,
}

impl Tables {
    /// Inserts or replaces a record, keeping the index in step.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new id was created, `false` if an existing record
    /// was replaced.
    fn insert(&mut self, id: &str, record: StoredRecord) -> bool {
        let replaced = match self.records.remove(id) {
            Some(old) => {
                self.unindex(id, &old.index_terms);
                true
            }
            None => false,
        };

        for term in &record.index_terms {
            self.index
                .entry(term.clone())
                .or_default()
                .insert(id.to_owned());
        }
        self.records.insert(id.to_owned(), record);

        !replaced
    }

    /// Removes a record and the index entries it contributed.
    ///
    /// # Returns
    ///
    /// Returns `true` if the record existed.
    fn remove(&mut self, id: &str) -> bool {
        match self.records.remove(id) {
            Some(old) => {
                self.unindex(id, &old.index_terms);
                true
            }
            None => false,
        }
    }

    /// Drops this id from the index sets it appears in.
    fn unindex(&mut self, id: &str, terms: &[(IndexField, String)]) {
        for term in terms {
            if let Some(ids) = self.index.get_mut(term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.index.remove(term);
                }
            }
        }
    }
}

/// The shared record engine for EmberKV.
///
/// Stores every record across all namespaces and owns the purge cadence.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// [`RecordStore`](crate::RecordStore) handles. All operations are
/// thread-safe.
///
/// # Example
///
/// ```
/// use emberkv::storage::StorageEngine;
/// use serde_json::json;
///
/// let engine = StorageEngine::new();
///
/// let mut payload = serde_json::Map::new();
/// payload.insert("uid".to_owned(), json!("u-42"));
///
/// // Store a record with no expiry
/// engine.upsert("session", "sess-1", &payload, None).unwrap();
///
/// // Primary lookup
/// assert_eq!(engine.find("sess-1").unwrap(), Some(payload));
/// ```
pub struct StorageEngine {
    /// The record table and secondary index
    tables: RwLock<Tables>,

    /// Upserts between purge sweeps (always >= 1)
    purge_threshold: u64,

    /// Upserts since the last sweep
    upserts_since_sweep: AtomicU64,

    /// Statistics: records currently stored (approximate)
    record_count: AtomicU64,

    /// Statistics: total upsert operations
    upsert_count: AtomicU64,

    /// Statistics: total lookup operations, primary and secondary
    find_count: AtomicU64,

    /// Statistics: total destroy operations
    destroy_count: AtomicU64,

    /// Statistics: expired records removed by sweeps
    purged_count: AtomicU64,

    /// Statistics: sweeps run
    sweep_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("records", &self.record_count.load(Ordering::Relaxed))
            .field("purge_threshold", &self.purge_threshold)
            .field("upserts", &self.upsert_count.load(Ordering::Relaxed))
            .field("finds", &self.find_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new engine with default settings.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a new engine with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            purge_threshold: config.purge_threshold.max(1),
            upserts_since_sweep: AtomicU64::new(0),
            record_count: AtomicU64::new(0),
            upsert_count: AtomicU64::new(0),
            find_count: AtomicU64::new(0),
            destroy_count: AtomicU64::new(0),
            purged_count: AtomicU64::new(0),
            sweep_count: AtomicU64::new(0),
        }
    }

    /// Takes the table read lock.
    #[inline]
    fn tables_read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::poisoned())
    }

    /// Takes the table write lock.
    #[inline]
    fn tables_write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::poisoned())
    }

    /// Inserts a record, or fully replaces the one holding this id.
    ///
    /// A replaced record keeps nothing: payload and expiry are overwritten
    /// and its namespace becomes `namespace`, whatever it was before. The
    /// secondary index is updated in the same critical section, so a lookup
    /// never observes a record without its index terms or vice versa.
    ///
    /// Expiry is never checked here: overwriting an expired record succeeds.
    pub fn upsert(
        &self,
        namespace: &str,
        id: &str,
        payload: &Payload,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.upsert_count.fetch_add(1, Ordering::Relaxed);

        let record = StoredRecord {
            namespace: namespace.to_owned(),
            payload: encode_payload(payload)?,
            expires_at,
            updated_at: Utc::now(),
            index_terms: index_terms(payload),
        };

        let mut tables = self.tables_write()?;
        if tables.insert(id, record) {
            self.record_count.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }

    /// Looks up a live record by id.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if no record holds this id or the one that does has
    /// expired; the two cases are indistinguishable to the caller.
    pub fn find(&self, id: &str) -> StoreResult<Option<Payload>> {
        self.find_count.fetch_add(1, Ordering::Relaxed);

        let tables = self.tables_read()?;
        let now = Utc::now();

        match tables.records.get(id) {
            Some(record) if record.is_live(now) => decode_payload(&record.payload).map(Some),
            _ => Ok(None),
        }
    }

    /// Looks up a live record by an indexed payload field.
    ///
    /// When historical records share a value, the most recently updated live
    /// one is authoritative.
    pub fn find_by_field(&self, field: IndexField, value: &str) -> StoreResult<Option<Payload>> {
        self.find_count.fetch_add(1, Ordering::Relaxed);

        let tables = self.tables_read()?;
        let now = Utc::now();

        let ids = match tables.index.get(&(field, value.to_owned())) {
            Some(ids) => ids,
            None => return Ok(None),
        };

        let newest = ids
            .iter()
            .filter_map(|id| tables.records.get(id))
            .filter(|record| record.is_live(now))
            .max_by_key(|record| record.updated_at);

        match newest {
            Some(record) => decode_payload(&record.payload).map(Some),
            None => Ok(None),
        }
    }

    /// Marks a record as consumed by writing the current timestamp into its
    /// payload under [`CONSUMED_KEY`].
    ///
    /// Presence, not liveness, is what is checked: consuming an expired but
    /// still-present record succeeds. `expires_at` and `updated_at` are left
    /// untouched, and consuming twice just overwrites the marker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record holds this id.
    pub fn consume(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables_write()?;
        let record = match tables.records.get_mut(id) {
            Some(record) => record,
            None => return Err(StoreError::not_found(id)),
        };

        let mut payload = decode_payload(&record.payload)?;
        payload.insert(
            CONSUMED_KEY.to_owned(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.payload = encode_payload(&payload)?;

        Ok(())
    }

    /// Deletes a record by id.
    ///
    /// # Returns
    ///
    /// Returns `true` if the record existed, `false` if there was nothing to
    /// delete. Absence is not an error.
    pub fn destroy(&self, id: &str) -> StoreResult<bool> {
        self.destroy_count.fetch_add(1, Ordering::Relaxed);

        let mut tables = self.tables_write()?;
        let removed = tables.remove(id);
        if removed {
            self.record_count.fetch_sub(1, Ordering::Relaxed);
        }

        Ok(removed)
    }

    /// Deletes every record whose payload carries `value` in the given
    /// indexed field, live and expired alike, in any namespace.
    ///
    /// # Returns
    ///
    /// Returns the number of records removed; zero matches is a successful
    /// no-op.
    pub fn remove_by_field(&self, field: IndexField, value: &str) -> StoreResult<u64> {
        let mut tables = self.tables_write()?;

        let ids: Vec<String> = match tables.index.get(&(field, value.to_owned())) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return Ok(0),
        };

        let mut removed = 0u64;
        for id in &ids {
            if tables.remove(id) {
                removed += 1;
            }
        }

        if removed > 0 {
            self.record_count.fetch_sub(removed, Ordering::Relaxed);
            debug!(field = %field, removed, "bulk removal by indexed field");
        }

        Ok(removed)
    }

    /// Lists every record in a namespace, most recently updated first.
    ///
    /// Expired records are included: this is the diagnostic path, not a
    /// lookup, and it reports the table as it actually is.
    pub fn list(&self, namespace: &str) -> StoreResult<Vec<Record>> {
        let tables = self.tables_read()?;

        let mut records = Vec::new();
        for (id, stored) in tables.records.iter() {
            if stored.namespace == namespace {
                records.push(Record {
                    namespace: stored.namespace.clone(),
                    id: id.clone(),
                    payload: decode_payload(&stored.payload)?,
                    expires_at: stored.expires_at,
                    updated_at: stored.updated_at,
                });
            }
        }
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(records)
    }

    /// Deletes every expired record, across all namespaces.
    ///
    /// This is the purge sweep: the only path besides [`destroy`] and
    /// [`remove_by_field`] that removes expired rows.
    ///
    /// # Returns
    ///
    /// Returns the number of records removed.
    ///
    /// [`destroy`]: StorageEngine::destroy
    /// [`remove_by_field`]: StorageEngine::remove_by_field
    pub fn purge_expired(&self) -> StoreResult<u64> {
        let mut tables = self.tables_write()?;
        let now = Utc::now();

        let expired: Vec<String> = tables
            .records
            .iter()
            .filter(|(_, record)| !record.is_live(now))
            .map(|(id, _)| id.clone())
            .collect();

        let mut purged = 0u64;
        for id in &expired {
            if tables.remove(id) {
                purged += 1;
            }
        }

        if purged > 0 {
            self.record_count.fetch_sub(purged, Ordering::Relaxed);
            self.purged_count.fetch_add(purged, Ordering::Relaxed);
            debug!(
                purged,
                remaining = tables.records.len(),
                "purged expired records"
            );
        }
        self.sweep_count.fetch_add(1, Ordering::Relaxed);

        Ok(purged)
    }

    /// Counts an upsert toward the purge cadence, sweeping when the
    /// configured threshold is reached.
    ///
    /// [`RecordStore::upsert`](crate::RecordStore::upsert) calls this before
    /// each write. The counter is atomic but the reset is not fenced against
    /// concurrent increments, so under contention a sweep may fire a write
    /// early or late, or twice. Cadence is approximate, never exact-every-Nth.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(purged))` when this call triggered a sweep,
    /// `Ok(None)` otherwise.
    pub fn maybe_sweep(&self) -> StoreResult<Option<u64>> {
        let writes = self.upserts_since_sweep.fetch_add(1, Ordering::Relaxed) + 1;
        if writes < self.purge_threshold {
            return Ok(None);
        }

        self.upserts_since_sweep.store(0, Ordering::Relaxed);
        self.purge_expired().map(Some)
    }

    /// Returns the approximate number of records, expired ones included.
    ///
    /// This is an approximation because it uses relaxed atomic ordering.
    pub fn len(&self) -> u64 {
        self.record_count.load(Ordering::Relaxed)
    }

    /// Returns true if the engine holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            records: self.record_count.load(Ordering::Relaxed),
            upserts: self.upsert_count.load(Ordering::Relaxed),
            finds: self.find_count.load(Ordering::Relaxed),
            destroys: self.destroy_count.load(Ordering::Relaxed),
            purged: self.purged_count.load(Ordering::Relaxed),
            sweeps: self.sweep_count.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Records currently stored, expired ones included
    pub records: u64,
    /// Total upsert operations
    pub upserts: u64,
    /// Total lookup operations, primary and secondary
    pub finds: u64,
    /// Total destroy operations
    pub destroys: u64,
    /// Expired records removed by sweeps
    pub purged: u64,
    /// Sweeps run
    pub sweeps: u64,
}

/// Encodes a payload into the stored blob form.
fn encode_payload(payload: &Payload) -> StoreResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(payload)?))
}

/// Decodes a stored blob back into a payload.
fn decode_payload(raw: &[u8]) -> StoreResult<Payload> {
    Ok(serde_json::from_slice(raw)?)
}
