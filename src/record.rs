//! Record Model and Expiry Policy
//!
//! A record is the sole persisted entity: an opaque JSON payload filed under a
//! namespace and a globally unique id, with an optional expiry deadline and a
//! last-write timestamp. The store never interprets the payload beyond the
//! handful of well-known keys defined here:
//!
//! - the secondary-index fields ([`IndexField`]) resolvable without the
//!   primary id, and
//! - the [`CONSUMED_KEY`] marker that flags a record as used without
//!   deleting it.
//!
//! Liveness is a pure predicate over the expiry deadline and the query time
//! ([`is_live`]). It is applied on every read path and never at write time:
//! overwriting an expired record always succeeds. Time is wall-clock
//! (`chrono::Utc`); clock skew between replicas sharing a store is an
//! operational concern, not something this layer compensates for.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// The opaque payload a record carries: string keys to JSON values.
pub type Payload = serde_json::Map<String, Value>;

/// Payload key that marks a record as consumed.
///
/// Holds an ISO-8601 timestamp string. Set by
/// [`consume`](crate::RecordStore::consume); never written by the store
/// otherwise.
pub const CONSUMED_KEY: &str = "consumed";

/// Payload fields resolvable through the secondary index.
///
/// Only string values are indexed; a missing or non-string field simply keeps
/// the record out of that index, it is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    /// Account identifier carried by session-like records (`uid`)
    Uid,
    /// User-facing pairing code (`userCode`)
    UserCode,
    /// Grouping field tying related records to one grant (`grantId`)
    GrantId,
}

impl IndexField {
    /// Every field the index tracks.
    pub const ALL: [IndexField; 3] = [IndexField::Uid, IndexField::UserCode, IndexField::GrantId];

    /// The payload key this field matches.
    pub fn key(self) -> &'static str {
        match self {
            IndexField::Uid => "uid",
            IndexField::UserCode => "userCode",
            IndexField::GrantId => "grantId",
        }
    }
}

impl std::fmt::Display for IndexField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// A stored record, as returned by the listing path.
///
/// `updated_at` is the time of the last upsert; consuming a record does not
/// touch it, so listing order is stable across consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Kind of logical object this record represents (session, token, ...)
    pub namespace: String,
    /// Primary identifier, unique across all namespaces
    pub id: String,
    /// The opaque payload
    pub payload: Payload,
    /// When this record stops being visible to lookups (None = never)
    pub expires_at: Option<DateTime<Utc>>,
    /// When this record was last written
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Checks whether lookups may still return this record at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        is_live(self.expires_at, now)
    }
}

/// The liveness predicate: no deadline, or a deadline strictly in the future.
///
/// A record whose deadline equals the query time is already dead.
#[inline]
pub fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map(|at| at > now).unwrap_or(true)
}

/// Extracts the index terms a payload contributes: one `(field, value)` pair
/// per tracked field holding a string value.
pub fn index_terms(payload: &Payload) -> Vec<(IndexField, String)> {
    IndexField::ALL
        .iter()
        .filter_map(|field| {
            payload
                .get(field.key())
                .and_then(Value::as_str)
                .map(|value| (*field, value.to_owned()))
        })
        .collect()
}
