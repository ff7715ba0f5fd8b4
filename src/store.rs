//! Namespace-Scoped Record Store
//!
//! [`RecordStore`] is the public contract of EmberKV: one handle per
//! namespace, all handles sharing one [`StorageEngine`]. The handle owns the
//! caller-side parts of an operation (turning a TTL in seconds into an expiry
//! deadline, triggering the purge cadence before each write) and delegates
//! the table work to the engine.
//!
//! Operations are `async` to match the storage contract the upstream layer
//! codes against. The embedded engine completes them without yielding, and no
//! lock is ever held across an await point.
//!
//! ```text
//! ┌────────────┐  ┌────────────┐  ┌────────────┐
//! │RecordStore │  │RecordStore │  │RecordStore │
//! │ "session"  │  │ "token"    │  │ "device"   │
//! └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!       └───────────────┼───────────────┘
//!                       ▼
//!             Arc<StorageEngine>
//! ```

use crate::error::StoreResult;
use crate::record::{IndexField, Payload, Record};
use crate::storage::StorageEngine;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

/// Upper bound applied to `ttl_seconds` before computing the expiry deadline
/// (100 years). Keeps the timestamp arithmetic total for absurd inputs.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// A namespace-scoped handle onto the shared record engine.
///
/// Lookups by id or by indexed payload field are namespace-agnostic (ids are
/// globally unique, index values are matched wherever they occur); listing is
/// scoped to this handle's namespace, and every record written through this
/// handle carries it.
///
/// # Example
///
/// ```
/// use emberkv::{RecordStore, StorageEngine};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let engine = Arc::new(StorageEngine::new());
/// let sessions = RecordStore::new(Arc::clone(&engine), "session");
///
/// let mut payload = serde_json::Map::new();
/// payload.insert("uid".to_owned(), json!("u-42"));
///
/// // One-hour TTL
/// sessions.upsert("sess-1", payload.clone(), 3600).await.unwrap();
///
/// assert_eq!(sessions.find("sess-1").await.unwrap(), Some(payload.clone()));
/// assert_eq!(sessions.find_by_uid("u-42").await.unwrap(), Some(payload));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct RecordStore {
    /// The shared engine
    engine: Arc<StorageEngine>,
    /// Namespace every write through this handle is filed under
    namespace: String,
}

impl RecordStore {
    /// Creates a store handle for the given namespace.
    pub fn new(engine: Arc<StorageEngine>, namespace: impl Into<String>) -> Self {
        Self {
            engine,
            namespace: namespace.into(),
        }
    }

    /// The namespace this handle writes under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Creates a record, or fully replaces the one holding this id.
    ///
    /// A `ttl_seconds` of zero stores the record with no expiry; any other
    /// value sets the deadline that far into the future. A replaced record
    /// takes this handle's namespace regardless of where it lived before.
    ///
    /// The purge cadence is counted before the write. A sweep failure is
    /// logged and swallowed; amortized cleanup is maintenance, not part of
    /// this write's contract, so the upsert itself only fails if its own
    /// write does.
    pub async fn upsert(&self, id: &str, payload: Payload, ttl_seconds: u64) -> StoreResult<()> {
        if let Err(error) = self.engine.maybe_sweep() {
            warn!(error = %error, "purge sweep failed; continuing with upsert");
        }

        let expires_at = expiry_deadline(Utc::now(), ttl_seconds);
        self.engine.upsert(&self.namespace, id, &payload, expires_at)
    }

    /// Looks up the live record with this id.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` whether the record never existed or has expired;
    /// the caller cannot tell the two apart.
    pub async fn find(&self, id: &str) -> StoreResult<Option<Payload>> {
        self.engine.find(id)
    }

    /// Looks up the live record whose payload `uid` field equals `uid`.
    ///
    /// The store does not enforce which namespaces carry a `uid`; calling
    /// this against the right namespace is the caller's convention. If
    /// several live records share the value, the most recently updated one
    /// is returned.
    pub async fn find_by_uid(&self, uid: &str) -> StoreResult<Option<Payload>> {
        self.engine.find_by_field(IndexField::Uid, uid)
    }

    /// Looks up the live record whose payload `userCode` field equals
    /// `user_code`.
    ///
    /// Same matching and tie-breaking rules as [`find_by_uid`](Self::find_by_uid).
    pub async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<Payload>> {
        self.engine.find_by_field(IndexField::UserCode, user_code)
    }

    /// Marks the record as consumed: its payload gains a `consumed` field
    /// holding the current time as an ISO-8601 string.
    ///
    /// The record is not deleted and its expiry does not move. Unlike the
    /// lookups, this fails loudly on a missing id: callers are expected to
    /// have confirmed presence first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if no
    /// record holds this id.
    pub async fn consume(&self, id: &str) -> StoreResult<()> {
        self.engine.consume(id)
    }

    /// Deletes the record with this id if present.
    ///
    /// Deleting a missing record is a successful no-op.
    pub async fn destroy(&self, id: &str) -> StoreResult<()> {
        self.engine.destroy(id).map(|_| ())
    }

    /// Deletes every record whose payload `grantId` field equals `grant_id`,
    /// in any namespace, expired ones included.
    ///
    /// # Returns
    ///
    /// Returns the number of records removed; zero matches is a successful
    /// no-op.
    pub async fn revoke_by_grant_id(&self, grant_id: &str) -> StoreResult<u64> {
        self.engine.remove_by_field(IndexField::GrantId, grant_id)
    }

    /// Lists every record in this namespace, most recently updated first,
    /// expired ones included.
    ///
    /// This is a diagnostic operation; the lookup paths never use it.
    pub async fn get_all(&self) -> StoreResult<Vec<Record>> {
        self.engine.list(&self.namespace)
    }

    /// Runs a purge sweep now, across all namespaces.
    ///
    /// # Returns
    ///
    /// Returns the number of expired records removed.
    pub async fn purge_expired(&self) -> StoreResult<u64> {
        self.engine.purge_expired()
    }
}

/// Turns a TTL in seconds into an expiry deadline. Zero means no expiry.
fn expiry_deadline(now: DateTime<Utc>, ttl_seconds: u64) -> Option<DateTime<Utc>> {
    if ttl_seconds == 0 {
        return None;
    }
    let capped = ttl_seconds.min(MAX_TTL_SECONDS) as i64;
    Some(now + Duration::seconds(capped))
}
