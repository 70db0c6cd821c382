//! Client geolocation
//!
//! Resolution runs extractor → cache → database → overrides → unknown and
//! always produces a fully populated [`GeoRecord`].

pub mod cache;
pub mod ip_extractor;
pub mod lookup;
pub mod overrides;
pub mod record;
pub mod resolver;

pub use cache::ResolutionCache;
pub use ip_extractor::extract_client_ip;
pub use lookup::{DatabaseKind, GeoDatabase, GeoLookup};
pub use overrides::OverrideTable;
pub use record::{GeoField, GeoRecord, UNKNOWN};
pub use resolver::{GeoResolver, Resolution, ResolutionSource};
