use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or running the geolocation pipeline.
///
/// None of these ever reach an HTTP caller: construction-time errors disable the
/// component that produced them, and lookup-time errors fall through to the next
/// resolution source.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geo database `{}` not found", .path.display())]
    DatabaseMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("geo database `{}` could not be opened", .path.display())]
    DatabaseUnavailable {
        path: PathBuf,
        #[source]
        source: maxminddb::MaxMindDbError,
    },

    #[error(
        "geo database `{}` has unsupported type `{database_type}` (expected City or Country)",
        .path.display()
    )]
    UnsupportedDatabase { path: PathBuf, database_type: String },

    #[error("location override #{index} has invalid range `{range}`")]
    InvalidOverride {
        index: usize,
        range: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("no geo data for {0}")]
    AddressNotFound(IpAddr),

    #[error("`{0}` is not an IP address")]
    UnparseableAddress(String),

    #[error(transparent)]
    Lookup(#[from] maxminddb::MaxMindDbError),
}

impl GeoError {
    /// Whether this error means "no data" rather than a broken data source.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GeoError::AddressNotFound(_) | GeoError::UnparseableAddress(_)
        )
    }
}

pub type GeoResult<T> = Result<T, GeoError>;
