//! Background TTL Monitor
//!
//! MongoDB removes documents covered by a TTL index from a background
//! thread, not on read. This module does the same for [`MemoryStore`]: a
//! Tokio task wakes up periodically and deletes every document whose indexed
//! date plus TTL has passed.
//!
//! Reads already skip expired documents, so the sweeper exists to reclaim
//! memory for documents nobody queries again.
//!
//! ## Adaptive Frequency
//!
//! When a sweep removes a large share of the collection the interval halves
//! (down to `min_interval`); when sweeps come back empty it doubles (up to
//! `max_interval`). With no TTL index registered the sweep is skipped.

use crate::storage::{DocumentStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval the sweeper starts with
    pub base_interval: Duration,

    pub min_interval: Duration,

    pub max_interval: Duration,

    /// Fraction of documents removed in one sweep above which sweeping speeds up
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            min_interval: Duration::from_millis(50),
            // MongoDB's TTL monitor runs once a minute
            max_interval: Duration::from_secs(60),
            speedup_threshold: 0.25,
        }
    }
}

/// Handle to a running sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docrepo::storage::{ExpiryConfig, ExpirySweeper, MemoryStore};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(MemoryStore::new("sessions"));
    /// let sweeper = ExpirySweeper::start(Arc::clone(&store), ExpiryConfig::default());
    ///
    /// // ... TTL-indexed documents disappear in the background ...
    ///
    /// drop(sweeper);
    /// ```
    pub fn start(store: Arc<MemoryStore>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweep_loop(store, config, shutdown_rx));
        info!("TTL expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Also called on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        debug!("TTL expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(
    store: Arc<MemoryStore>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
        }

        if !store.has_ttl_indexes() {
            continue;
        }

        let before = store.len();
        let removed = store.cleanup_expired();

        if before > 0 && removed as f64 / before as f64 > config.speedup_threshold {
            interval = (interval / 2).max(config.min_interval);
            trace!(
                removed,
                interval_ms = interval.as_millis() as u64,
                "Many documents expiring, sweeping more often"
            );
        } else if removed == 0 {
            interval = (interval * 2).min(config.max_interval);
            trace!(interval_ms = interval.as_millis() as u64, "Nothing expired, backing off");
        }

        if removed > 0 {
            debug!(
                collection = %store.name(),
                removed,
                remaining = store.len(),
                "Expired documents removed"
            );
        }
    }
}

/// Starts a sweeper with [`ExpiryConfig::default`].
pub fn start_expiry_sweeper(store: Arc<MemoryStore>) -> ExpirySweeper {
    ExpirySweeper::start(store, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, DateTime};

    fn fast_config() -> ExpiryConfig {
        ExpiryConfig {
            base_interval: Duration::from_millis(10),
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(40),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_documents() {
        let store = Arc::new(MemoryStore::new("c"));
        store.add_ttl_index("creation_date", Duration::from_secs(1)).unwrap();

        let past = DateTime::from_millis(DateTime::now().timestamp_millis() - 5_000);
        for i in 0..10 {
            store.insert(doc! { "i": i, "creation_date": past }).unwrap();
        }
        store.insert(doc! { "i": 99, "creation_date": DateTime::now() }).unwrap();
        assert_eq!(store.len(), 11);

        let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_picks_up_documents_as_they_age() {
        let store = Arc::new(MemoryStore::new("c"));
        store.add_ttl_index("creation_date", Duration::from_millis(100)).unwrap();
        store.insert(doc! { "creation_date": DateTime::now() }).unwrap();

        let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let store = Arc::new(MemoryStore::new("c"));
        store.add_ttl_index("creation_date", Duration::from_secs(1)).unwrap();

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config());
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        let past = DateTime::from_millis(DateTime::now().timestamp_millis() - 5_000);
        store.insert(doc! { "creation_date": past }).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody swept it, but reads already hide it
        assert_eq!(store.len(), 1);
        assert!(store.query(&doc! {}, &Default::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_ignores_store_without_ttl_index() {
        let store = Arc::new(MemoryStore::new("c"));
        let past = DateTime::from_millis(0);
        store.insert(doc! { "creation_date": past }).unwrap();

        let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.len(), 1);
    }
}
