//! Storage Engine Module
//!
//! This module provides the shared storage layer for EmberKV: the record
//! engine with its secondary index and purge cadence, and the optional
//! background sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       StorageEngine                         │
//! │   ┌──────────────────────────────────────────────────────┐  │
//! │   │ RwLock<Tables>                                       │  │
//! │   │   records: id -> (namespace, payload, expiry, ...)   │  │
//! │   │   index:   (field, value) -> {ids}                   │  │
//! │   └──────────────────────────────────────────────────────┘  │
//! │   purge counter: sweep every N upserts                      │
//! └─────────────────────────────────────────────────────────────┘
//!                             ▲
//!                             │
//!               ┌─────────────┴─────────────┐
//!               │       PurgeSweeper        │
//!               │ (optional Tokio task,     │
//!               │  fixed-interval sweeps)   │
//!               └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Single table set**: records and their secondary index mutate together
//! - **RwLock**: multiple concurrent readers, exclusive writers
//! - **Expiry at read time**: lookups filter dead records, never delete them
//! - **Amortized purging**: every Nth upsert sweeps all expired records
//! - **Interval purging**: optional background sweeper for write-idle stores
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::{StorageEngine, StoreConfig};
//! use serde_json::json;
//!
//! // Sweep after every 5th upsert instead of the default 10
//! let engine = StorageEngine::with_config(StoreConfig::new().with_purge_threshold(5));
//!
//! let mut payload = serde_json::Map::new();
//! payload.insert("grantId".to_owned(), json!("g-7"));
//! engine.upsert("token", "tok-1", &payload, None).unwrap();
//!
//! assert_eq!(engine.find("tok-1").unwrap(), Some(payload));
//! ```

pub mod engine;
pub mod purge;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats, StoreConfig, DEFAULT_PURGE_THRESHOLD};
pub use purge::{start_purge_sweeper, PurgeSweeper, DEFAULT_SWEEP_INTERVAL};
