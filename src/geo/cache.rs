//! Short-lived memo of resolved records, keyed by client address
//!
//! Entries expire after a fixed TTL and are never visible once expired. A
//! background task periodically evicts expired entries so memory stays bounded
//! between bursts of traffic.

use moka::sync::Cache;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;

use crate::config::CacheConfig;
use crate::geo::record::GeoRecord;

/// Floor for the purge period; `tokio::time::interval` rejects zero.
pub const MIN_PURGE_INTERVAL: Duration = Duration::from_millis(1);

/// Thread-safe TTL cache of resolved records
#[derive(Clone)]
pub struct ResolutionCache {
    records: Cache<String, Arc<GeoRecord>>,
}

impl ResolutionCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let records = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { records }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    pub fn get(&self, key: &str) -> Option<Arc<GeoRecord>> {
        self.records.get(key)
    }

    /// Store a complete record, replacing any previous entry for `key`.
    pub fn set(&self, key: impl Into<String>, record: Arc<GeoRecord>) {
        self.records.insert(key.into(), record);
    }

    /// Evict expired entries now.
    pub fn purge(&self) {
        self.records.run_pending_tasks();
    }

    pub fn clear(&self) {
        self.records.invalidate_all();
        self.records.run_pending_tasks();
    }

    /// Approximate number of live entries
    pub fn len(&self) -> u64 {
        self.records.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a background task that calls [`ResolutionCache::purge`] every
    /// `interval` (at least [`MIN_PURGE_INTERVAL`]). Must be called from within a
    /// tokio runtime.
    pub fn spawn_purger(&self, interval: Duration) -> PurgeTask {
        let interval = interval.max(MIN_PURGE_INTERVAL);
        let cache = self.clone();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.purge();
                        tracing::debug!(entries = cache.len(), "Purged expired geo cache entries");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("Geo cache purger stopped");
                            break;
                        }
                    }
                }
            }
        });

        PurgeTask { shutdown_tx }
    }
}

/// Handle to a running purge task. Dropping it also stops the task.
pub struct PurgeTask {
    shutdown_tx: watch::Sender<bool>,
}

impl PurgeTask {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Cache key for an extracted address: canonical form for valid IPs so that
/// e.g. `2001:DB8::1` and `2001:db8::1` share an entry, raw trimmed text otherwise.
pub fn cache_key(address: &str) -> String {
    let address = address.trim();
    match address.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => address.to_string(),
    }
}
