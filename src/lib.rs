//! # EmberKV - An Embeddable Expiring Record Store
//!
//! EmberKV is an in-process storage layer for records that carry a time to
//! live: sessions, grants, device codes, one-shot tokens. Records hold an
//! opaque JSON payload and are reachable by id or by a handful of indexed
//! payload fields.
//!
//! ## Features
//!
//! - **Namespaces**: One shared engine, one lightweight handle per record kind
//! - **TTL Support**: Per-record expiry enforced at read time, reclaimed in bulk
//! - **Secondary Lookups**: Find records by the `uid`, `userCode`, or `grantId`
//!   fields of their payload
//! - **Async API**: Built for Tokio callers; no lock is held across an await
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             EmberKV                              │
//! │                                                                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐               │
//! │  │ RecordStore │  │ RecordStore │  │ RecordStore │   (handles,   │
//! │  │ "session"   │  │ "token"     │  │ "device"    │    cheap to   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘    clone)     │
//! │         └────────────────┼────────────────┘                      │
//! │                          ▼                                       │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                      StorageEngine                         │  │
//! │  │   ┌───────────────────────┐  ┌─────────────────────────┐   │  │
//! │  │   │ records               │  │ index                   │   │  │
//! │  │   │ id -> StoredRecord    │  │ (field, value) -> {ids} │   │  │
//! │  │   └───────────────────────┘  └─────────────────────────┘   │  │
//! │  │                   (one RwLock, two tables)                 │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! │                          ▲                                       │
//! │                          │                                       │
//! │  ┌───────────────────────┴────────────────────────────────────┐  │
//! │  │                      PurgeSweeper                          │  │
//! │  │              (optional background Tokio task)              │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use emberkv::{RecordStore, StorageEngine};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! // One engine for the process, one handle per record kind
//! let engine = Arc::new(StorageEngine::new());
//! let sessions = RecordStore::new(Arc::clone(&engine), "session");
//! let tokens = RecordStore::new(Arc::clone(&engine), "token");
//!
//! let mut session = serde_json::Map::new();
//! session.insert("uid".to_owned(), json!("u-42"));
//! session.insert("grantId".to_owned(), json!("g-7"));
//!
//! // Store with a one-hour TTL, read back by id or by payload field
//! sessions.upsert("sess-1", session.clone(), 3600).await.unwrap();
//! assert!(sessions.find("sess-1").await.unwrap().is_some());
//! assert!(sessions.find_by_uid("u-42").await.unwrap().is_some());
//!
//! // Cascade: drop everything tied to the grant, in any namespace
//! let removed = tokens.revoke_by_grant_id("g-7").await.unwrap();
//! assert_eq!(removed, 1);
//! # });
//! ```
//!
//! ## Operations
//!
//! Per [`RecordStore`] handle:
//!
//! - `upsert(id, payload, ttl_seconds)` - create or replace (TTL 0 = no expiry)
//! - `find(id)` - live record by id, `None` for missing or expired
//! - `find_by_uid(value)` / `find_by_user_code(value)` - live record by
//!   indexed payload field
//! - `consume(id)` - stamp the payload with a `consumed` timestamp
//! - `destroy(id)` - delete, idempotent
//! - `revoke_by_grant_id(value)` - bulk delete across namespaces
//! - `get_all()` - list the namespace, newest first, expired included
//! - `purge_expired()` - sweep expired records out now
//!
//! ## Module Overview
//!
//! - [`record`]: The record model, payload type, and expiry rule
//! - [`storage`]: The shared engine, purge cadence, and background sweeper
//! - [`store`]: The namespace-scoped handle the caller codes against
//! - [`error`]: Error and result types
//!
//! ## Design Highlights
//!
//! ### Expiry Is a Read-Side Rule
//!
//! Writes never inspect deadlines and lookups never delete. A record past its
//! deadline is invisible to `find` and the secondary lookups but stays in the
//! tables until a purge sweep, a `destroy`, or a revocation removes it, so
//! read paths stay contention-free.
//!
//! ### Amortized Purging
//!
//! Every Nth upsert (10 by default, see
//! [`StoreConfig`](storage::StoreConfig)) runs a full sweep before writing.
//! Idle stores purge nothing on their own; deployments that want wall-clock
//! cleanup spawn a [`PurgeSweeper`](storage::PurgeSweeper).
//!
//! ### Transactional Secondary Index
//!
//! The id table and the field index live behind one `RwLock` and move
//! together. A lookup by `uid` is a map probe plus a liveness filter, never a
//! table scan.

pub mod error;
pub mod record;
pub mod storage;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{StoreError, StoreResult};
pub use record::{is_live, IndexField, Payload, Record, CONSUMED_KEY};
pub use storage::{
    start_purge_sweeper, PurgeSweeper, StorageEngine, StorageStats, StoreConfig,
    DEFAULT_PURGE_THRESHOLD, DEFAULT_SWEEP_INTERVAL,
};
pub use store::{RecordStore, MAX_TTL_SECONDS};

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
