use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::config::HeaderNames;
use crate::geo::record::{GeoField, GeoRecord, UNKNOWN};

/// Writes record fields into request headers under the configured names.
#[derive(Debug, Clone)]
pub struct HeaderInjector {
    targets: Vec<(GeoField, HeaderName)>,
}

impl HeaderInjector {
    /// Empty names are skipped; names that are not valid HTTP header names are
    /// logged and skipped as well.
    pub fn new(names: &HeaderNames) -> Self {
        let targets = GeoField::ALL
            .into_iter()
            .filter_map(|field| {
                let name = configured_name(names, field).trim();
                if name.is_empty() {
                    return None;
                }
                match HeaderName::from_bytes(name.as_bytes()) {
                    Ok(header) => Some((field, header)),
                    Err(e) => {
                        warn!(field = ?field, name, error = %e, "Ignoring invalid geo header name");
                        None
                    }
                }
            })
            .collect();

        Self { targets }
    }

    /// Set every configured header, replacing any value the client sent.
    pub fn inject(&self, headers: &mut HeaderMap, record: &GeoRecord) {
        for (field, name) in &self.targets {
            // Raw bytes so non-ASCII city names survive
            let value = HeaderValue::from_bytes(record.get(*field).as_bytes())
                .unwrap_or_else(|_| HeaderValue::from_static(UNKNOWN));
            headers.insert(name.clone(), value);
        }
    }

    pub fn header_names(&self) -> impl Iterator<Item = &HeaderName> {
        self.targets.iter().map(|(_, name)| name)
    }
}

fn configured_name(names: &HeaderNames, field: GeoField) -> &str {
    match field {
        GeoField::Country => &names.country,
        GeoField::Region => &names.region,
        GeoField::City => &names.city,
        GeoField::Latitude => &names.latitude,
        GeoField::Longitude => &names.longitude,
    }
}
