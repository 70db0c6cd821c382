//! The fixed-shape geolocation record attached to every request

use serde::Serialize;

/// Placeholder written into any field no resolution source could fill.
pub const UNKNOWN: &str = "XX";

/// One of the five fields carried by a [`GeoRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoField {
    Country,
    Region,
    City,
    Latitude,
    Longitude,
}

impl GeoField {
    pub const ALL: [GeoField; 5] = [
        GeoField::Country,
        GeoField::Region,
        GeoField::City,
        GeoField::Latitude,
        GeoField::Longitude,
    ];
}

/// Geographic attributes resolved for a client address.
///
/// Every field always holds a value: anything unresolved (or resolved to an empty
/// string) is stored as [`UNKNOWN`]. The fields are private so that invariant can
/// only be established through the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoRecord {
    country: String,
    region: String,
    city: String,
    latitude: String,
    longitude: String,
}

impl Default for GeoRecord {
    fn default() -> Self {
        Self::unknown()
    }
}

impl GeoRecord {
    /// A record with every field set to [`UNKNOWN`].
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            latitude: UNKNOWN.to_string(),
            longitude: UNKNOWN.to_string(),
        }
    }

    pub fn with_country<S: AsRef<str>>(mut self, value: Option<S>) -> Self {
        self.country = or_unknown(value);
        self
    }

    pub fn with_region<S: AsRef<str>>(mut self, value: Option<S>) -> Self {
        self.region = or_unknown(value);
        self
    }

    pub fn with_city<S: AsRef<str>>(mut self, value: Option<S>) -> Self {
        self.city = or_unknown(value);
        self
    }

    pub fn with_latitude<S: AsRef<str>>(mut self, value: Option<S>) -> Self {
        self.latitude = or_unknown(value);
        self
    }

    pub fn with_longitude<S: AsRef<str>>(mut self, value: Option<S>) -> Self {
        self.longitude = or_unknown(value);
        self
    }

    /// Set both coordinates from database values, six decimal places each.
    pub fn with_coordinates(self, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        self.with_latitude(latitude.map(|v| format!("{v:.6}")))
            .with_longitude(longitude.map(|v| format!("{v:.6}")))
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn latitude(&self) -> &str {
        &self.latitude
    }

    pub fn longitude(&self) -> &str {
        &self.longitude
    }

    pub fn get(&self, field: GeoField) -> &str {
        match field {
            GeoField::Country => &self.country,
            GeoField::Region => &self.region,
            GeoField::City => &self.city,
            GeoField::Latitude => &self.latitude,
            GeoField::Longitude => &self.longitude,
        }
    }

    /// True when no field carries real data.
    pub fn is_unknown(&self) -> bool {
        GeoField::ALL.iter().all(|f| self.get(*f) == UNKNOWN)
    }
}

fn or_unknown<S: AsRef<str>>(value: Option<S>) -> String {
    match value {
        Some(v) if !v.as_ref().trim().is_empty() => v.as_ref().to_string(),
        _ => UNKNOWN.to_string(),
    }
}
