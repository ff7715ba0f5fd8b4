//! Store Error Types
//!
//! Every fallible store operation returns [`StoreResult`]. The error surface
//! is deliberately small:
//!
//! - "Not found" is an error only for [`consume`](crate::RecordStore::consume),
//!   which assumes the caller already confirmed the record exists. The lookup
//!   operations report absence as `Ok(None)` instead.
//! - A payload that lacks the field a secondary lookup matches on is not an
//!   error either; the record simply never enters the index, so the lookup
//!   reports no match.

use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// An operation that requires the record to exist was given an unknown id
    #[error("no record found for id {id:?}")]
    NotFound { id: String },

    /// The underlying storage rejected a read or write
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl StoreError {
    /// Not-found error for the given record id.
    pub(crate) fn not_found(id: &str) -> Self {
        StoreError::NotFound { id: id.to_owned() }
    }

    /// Storage failure raised when a table lock is poisoned
    /// (a writer panicked while holding it).
    pub(crate) fn poisoned() -> Self {
        StoreError::Storage {
            reason: "record tables poisoned by a panicked writer".to_owned(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Storage {
            reason: format!("payload codec: {}", err),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
