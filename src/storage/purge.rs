//! Background Purge Sweeper
//!
//! The primary purge trigger is write-driven: every Nth upsert runs a sweep
//! ([`StorageEngine::maybe_sweep`](crate::StorageEngine::maybe_sweep)). That
//! cadence stalls when nothing writes, so a deployment that reads for hours
//! on end would keep expired records in memory the whole time.
//!
//! This module adds the time-driven alternative: a Tokio task that sweeps on
//! a fixed interval, independent of write traffic. Running it is optional;
//! it shares [`StorageEngine::purge_expired`](crate::StorageEngine::purge_expired)
//! with the write-driven trigger, so the two can coexist.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A handle to the running purge sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct PurgeSweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl PurgeSweeper {
    /// Starts the purge sweeper as a background task.
    ///
    /// # Arguments
    ///
    /// * `engine` - The storage engine to sweep
    /// * `interval` - Time between sweeps
    ///
    /// # Returns
    ///
    /// Returns a handle that can be used to stop the sweeper.
    /// The sweeper will automatically stop when the handle is dropped.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use emberkv::storage::{PurgeSweeper, StorageEngine};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = PurgeSweeper::start(Arc::clone(&engine), Duration::from_secs(30));
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, interval, shutdown_rx));

        info!(
            interval_ms = interval.as_millis() as u64,
            "background purge sweeper started"
        );

        Self { shutdown_tx }
    }

    /// Stops the purge sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("background purge sweeper stopped");
    }
}

impl Drop for PurgeSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // An interval's first tick completes immediately; skip it
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("purge sweeper received shutdown signal");
                    return;
                }
            }
        }

        match engine.purge_expired() {
            Ok(purged) if purged > 0 => {
                debug!(
                    purged,
                    remaining = engine.len(),
                    "interval sweep removed expired records"
                );
            }
            Ok(_) => {}
            Err(error) => {
                warn!(error = %error, "interval sweep failed");
            }
        }
    }
}

/// Starts the purge sweeper with the default interval.
///
/// This is a convenience function for simple use cases.
pub fn start_purge_sweeper(engine: Arc<StorageEngine>) -> PurgeSweeper {
    PurgeSweeper::start(engine, DEFAULT_SWEEP_INTERVAL)
}
