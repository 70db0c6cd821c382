pub mod config;
pub mod error;
pub mod geo;
pub mod middleware;

pub use error::{GeoError, GeoResult};
pub use middleware::{GeoIpLayer, GeoIpService};
