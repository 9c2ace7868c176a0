//! Background Expiry Sweeper
//!
//! Lazy expiry only removes a key when something touches it. A key that
//! expires and is never read again would stay resident forever, so a
//! background task purges expired keys on a fixed interval.
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for the configured interval (default: 1s)
//! 2. Enters the store's exclusive section and purges every expired key
//! 3. Logs how many keys were purged

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Sweep interval used when none is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// A zero interval is bumped to one millisecond so the task never spins.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use flintkv::storage::{ExpirySweeper, Store};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let store = Arc::new(Store::new(10_000));
    /// let sweeper = ExpirySweeper::start(store, Duration::from_secs(1));
    ///
    /// // Dropping the handle stops the task
    /// drop(sweeper);
    /// ```
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, interval, shutdown_rx));

        info!(
            interval_ms = interval.as_millis() as u64,
            "Background expiry sweeper started"
        );

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(store: Arc<Store>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let (purged, remaining) = {
            let mut keyspace = store.lock().await;
            let purged = keyspace.cleanup();
            (purged, keyspace.len())
        };

        if purged > 0 {
            debug!(purged, remaining, "Expired keys cleaned up");
        } else {
            trace!(remaining, "Expiry sweep found nothing to purge");
        }
    }
}
