//! GeoIP lookup adapter over MaxMind GeoLite2/GeoIP2 MMDB files
//!
//! The database is memory-mapped once and shared read-only between every
//! resolver that holds a clone of [`GeoDatabase`]; per-request lookups touch
//! only the mapping and never block on I/O.

use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{GeoError, GeoResult};
use crate::geo::record::GeoRecord;

/// Anything that can turn an address string into a [`GeoRecord`].
///
/// Implementations must report both unparseable input and addresses missing
/// from the data set as an error; the resolver treats every error as a miss.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, address: &str) -> GeoResult<GeoRecord>;
}

/// Granularity of an opened database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    City,
    Country,
}

impl DatabaseKind {
    /// Pick the variant from the database's `database_type` metadata, falling back
    /// to the file name for databases with unusual metadata.
    pub fn detect(database_type: &str, path: &Path) -> Option<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        [database_type, file_name]
            .into_iter()
            .find_map(Self::from_name)
    }

    fn from_name(name: &str) -> Option<Self> {
        if name.contains("City") {
            Some(DatabaseKind::City)
        } else if name.contains("Country") {
            Some(DatabaseKind::Country)
        } else {
            None
        }
    }
}

/// A memory-mapped City or Country database.
///
/// Cloning is cheap and shares the same mapping.
#[derive(Clone)]
pub enum GeoDatabase {
    City(Arc<Reader<Mmap>>),
    Country(Arc<Reader<Mmap>>),
}

impl GeoDatabase {
    /// Open and classify the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> GeoResult<Self> {
        let path = path.as_ref();

        std::fs::metadata(path).map_err(|source| GeoError::DatabaseMissing {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: the file is mapped read-only and is expected not to be
        // truncated or rewritten in place while the process runs.
        let reader = unsafe { Reader::open_mmap(path) }.map_err(|source| {
            GeoError::DatabaseUnavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let database_type = reader.metadata.database_type.clone();
        match DatabaseKind::detect(&database_type, path) {
            Some(DatabaseKind::City) => Ok(GeoDatabase::City(Arc::new(reader))),
            Some(DatabaseKind::Country) => Ok(GeoDatabase::Country(Arc::new(reader))),
            None => Err(GeoError::UnsupportedDatabase {
                path: path.to_path_buf(),
                database_type,
            }),
        }
    }

    /// Open the database, logging and returning `None` if it cannot be used.
    ///
    /// A failure here disables database lookups for the lifetime of whatever is
    /// built from the result; it is not retried.
    pub fn open_or_disable(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(db) => {
                info!(
                    path = %path.display(),
                    kind = ?db.kind(),
                    "Opened GeoIP database"
                );
                Some(db)
            }
            Err(e) => {
                warn!(error = %e, "GeoIP database disabled, falling back to overrides only");
                None
            }
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        match self {
            GeoDatabase::City(_) => DatabaseKind::City,
            GeoDatabase::Country(_) => DatabaseKind::Country,
        }
    }

    fn lookup_ip(&self, ip: IpAddr) -> GeoResult<GeoRecord> {
        match self {
            GeoDatabase::City(reader) => {
                let result = reader.lookup(ip)?;
                let city = result
                    .decode::<geoip2::City>()?
                    .ok_or(GeoError::AddressNotFound(ip))?;
                Ok(record_from_city(&city))
            }
            GeoDatabase::Country(reader) => {
                let result = reader.lookup(ip)?;
                let country = result
                    .decode::<geoip2::Country>()?
                    .ok_or(GeoError::AddressNotFound(ip))?;
                Ok(record_from_country(&country))
            }
        }
    }
}

impl GeoLookup for GeoDatabase {
    fn lookup(&self, address: &str) -> GeoResult<GeoRecord> {
        let ip = address
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| GeoError::UnparseableAddress(address.to_string()))?;
        self.lookup_ip(ip)
    }
}

impl std::fmt::Debug for GeoDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (GeoDatabase::City(reader) | GeoDatabase::Country(reader)) = self;
        f.debug_struct("GeoDatabase")
            .field("kind", &self.kind())
            .field("database_type", &reader.metadata.database_type)
            .finish()
    }
}

/// Region is the ISO code of the first subdivision; coordinates are only present
/// when the database carries location data.
fn record_from_city(city: &geoip2::City) -> GeoRecord {
    GeoRecord::unknown()
        .with_country(city.country.iso_code)
        .with_region(city.subdivisions.first().and_then(|s| s.iso_code))
        .with_city(city.city.names.english)
        .with_coordinates(city.location.latitude, city.location.longitude)
}

fn record_from_country(country: &geoip2::Country) -> GeoRecord {
    GeoRecord::unknown().with_country(country.country.iso_code)
}
