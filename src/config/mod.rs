use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::geo::ip_extractor::REAL_IP_HEADER;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub headers: HeaderNames,
    #[serde(default = "Config::default_real_ip_header")]
    pub real_ip_header: String,
    #[serde(default)]
    pub location_overrides: Vec<LocationOverride>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Output header name per record field. An empty name means the field is not emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderNames {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: String,
    pub longitude: String,
}

/// One CIDR override entry as written by the operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationOverride {
    pub ip_range: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub purge_interval_secs: u64,
    pub max_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct OverridesFile {
    #[serde(default)]
    location_overrides: Vec<LocationOverride>,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            country: "Geoip_Country".to_string(),
            region: "Geoip_Region".to_string(),
            city: "Geoip_City".to_string(),
            latitude: "Geoip_Latitude".to_string(),
            longitude: "Geoip_Longitude".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            purge_interval_secs: 600,
            max_entries: 100_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: Self::default_database_path(),
            headers: HeaderNames::default(),
            real_ip_header: Self::default_real_ip_header(),
            location_overrides: Vec::new(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub const DEFAULT_DATABASE_PATH: &'static str = "GeoLite2-Country.mmdb";

    fn default_database_path() -> String {
        Self::DEFAULT_DATABASE_PATH.to_string()
    }

    fn default_real_ip_header() -> String {
        REAL_IP_HEADER.to_string()
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let database_path =
            std::env::var("GEOIP_DB_PATH").unwrap_or(defaults.database_path);

        // Unset keeps the default name, set-but-empty disables the header
        let header = |key: &str, default: String| std::env::var(key).unwrap_or(default);
        let headers = HeaderNames {
            country: header("GEOIP_HEADER_COUNTRY", defaults.headers.country),
            region: header("GEOIP_HEADER_REGION", defaults.headers.region),
            city: header("GEOIP_HEADER_CITY", defaults.headers.city),
            latitude: header("GEOIP_HEADER_LATITUDE", defaults.headers.latitude),
            longitude: header("GEOIP_HEADER_LONGITUDE", defaults.headers.longitude),
        };

        let real_ip_header = std::env::var("GEOIP_REAL_IP_HEADER")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.real_ip_header);

        let cache = CacheConfig {
            ttl_secs: env_u64("GEOIP_CACHE_TTL_SECS", defaults.cache.ttl_secs)?,
            purge_interval_secs: env_u64(
                "GEOIP_CACHE_PURGE_SECS",
                defaults.cache.purge_interval_secs,
            )?,
            max_entries: env_u64("GEOIP_CACHE_MAX_ENTRIES", defaults.cache.max_entries)?,
        };

        let location_overrides = match std::env::var("GEOIP_OVERRIDES_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::load_overrides(&path)?,
            _ => Vec::new(),
        };

        let host = std::env::var("HOST").unwrap_or(defaults.server.host);
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| defaults.server.port.to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        Ok(Config {
            database_path,
            headers,
            real_ip_header,
            location_overrides,
            cache,
            server: ServerConfig { host, port },
        })
    }

    /// Read `location_overrides` from a TOML, JSON or YAML file (chosen by extension).
    ///
    /// Ranges are not validated here; that happens when the override table is built.
    pub fn load_overrides(path: &str) -> anyhow::Result<Vec<LocationOverride>> {
        let file: OverridesFile = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to read location overrides from {}", path))?;

        Ok(file.location_overrides)
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}
