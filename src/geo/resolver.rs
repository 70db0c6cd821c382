//! The resolution pipeline: cache, then database, then overrides, then unknown
//!
//! Resolution never fails. Each source that cannot answer hands over to the
//! next one, and whatever comes out at the end (including the all-unknown
//! record) is cached for the configured TTL.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::geo::cache::{cache_key, PurgeTask, ResolutionCache};
use crate::geo::lookup::{GeoDatabase, GeoLookup};
use crate::geo::overrides::OverrideTable;
use crate::geo::record::GeoRecord;

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Cache,
    Database,
    Override,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: Arc<GeoRecord>,
    pub source: ResolutionSource,
}

/// Resolves client addresses to [`GeoRecord`]s.
///
/// The database handle is injected rather than opened here so several
/// resolvers can share one mapping.
#[derive(Clone)]
pub struct GeoResolver {
    lookup: Option<Arc<dyn GeoLookup>>,
    overrides: Arc<OverrideTable>,
    cache: ResolutionCache,
}

impl GeoResolver {
    pub fn new(
        lookup: Option<Arc<dyn GeoLookup>>,
        overrides: OverrideTable,
        cache: ResolutionCache,
    ) -> Self {
        Self {
            lookup,
            overrides: Arc::new(overrides),
            cache,
        }
    }

    /// Build overrides and cache from `config` around an already opened database.
    pub fn from_config(config: &Config, database: Option<GeoDatabase>) -> Self {
        let lookup = database.map(|db| Arc::new(db) as Arc<dyn GeoLookup>);
        Self::new(
            lookup,
            OverrideTable::new_or_disable(&config.location_overrides),
            ResolutionCache::from_config(&config.cache),
        )
    }

    pub fn resolve(&self, address: &str) -> Resolution {
        let key = cache_key(address);

        if let Some(record) = self.cache.get(&key) {
            return Resolution {
                record,
                source: ResolutionSource::Cache,
            };
        }

        let (record, source) = self.resolve_uncached(&key);
        debug!(address = %key, source = ?source, "Resolved client location");

        let record = Arc::new(record);
        self.cache.set(key, Arc::clone(&record));

        Resolution { record, source }
    }

    fn resolve_uncached(&self, address: &str) -> (GeoRecord, ResolutionSource) {
        if let Some(lookup) = &self.lookup {
            match lookup.lookup(address) {
                Ok(record) => return (record, ResolutionSource::Database),
                Err(e) if e.is_not_found() => {}
                Err(e) => debug!(address, error = %e, "GeoIP lookup failed"),
            }
        }

        match self.overrides.match_address(address) {
            Ok(record) => (record, ResolutionSource::Override),
            Err(_) => (GeoRecord::unknown(), ResolutionSource::Unknown),
        }
    }

    pub fn has_database(&self) -> bool {
        self.lookup.is_some()
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// See [`ResolutionCache::spawn_purger`].
    pub fn spawn_cache_purger(&self, interval: Duration) -> PurgeTask {
        self.cache.spawn_purger(interval)
    }
}
