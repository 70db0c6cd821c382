//! Operator-supplied CIDR location overrides
//!
//! Consulted only when the database cannot resolve an address. Rules are
//! evaluated in declaration order and the first containing range wins, even if
//! a later rule is more specific.

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::{info, warn};

use crate::config::LocationOverride;
use crate::error::{GeoError, GeoResult};
use crate::geo::record::GeoRecord;

/// A parsed override: a network and the record it resolves to.
#[derive(Debug, Clone)]
pub struct OverrideRule {
    pub network: IpNet,
    pub record: GeoRecord,
}

impl OverrideRule {
    fn parse(index: usize, rule: &LocationOverride) -> GeoResult<Self> {
        let network = rule
            .ip_range
            .trim()
            .parse::<IpNet>()
            .map_err(|source| GeoError::InvalidOverride {
                index,
                range: rule.ip_range.clone(),
                source,
            })?;

        let record = GeoRecord::unknown()
            .with_country(Some(&rule.country))
            .with_region(Some(&rule.region))
            .with_city(Some(&rule.city))
            .with_latitude(Some(&rule.latitude))
            .with_longitude(Some(&rule.longitude));

        Ok(Self { network, record })
    }
}

/// Ordered, immutable list of override rules.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    rules: Vec<OverrideRule>,
}

impl OverrideTable {
    /// Parse every rule; a single malformed range rejects the whole table.
    pub fn new(rules: &[LocationOverride]) -> GeoResult<Self> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| OverrideRule::parse(index, rule))
            .collect::<GeoResult<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Like [`OverrideTable::new`], but a malformed table is logged and replaced
    /// by an empty one that never matches.
    pub fn new_or_disable(rules: &[LocationOverride]) -> Self {
        match Self::new(rules) {
            Ok(table) => {
                if !table.is_empty() {
                    info!(rules = table.len(), "Loaded location overrides");
                }
                table
            }
            Err(e) => {
                warn!(error = %e, "Location overrides disabled");
                Self::default()
            }
        }
    }

    /// The record of the first rule whose range contains `address`.
    pub fn match_address(&self, address: &str) -> GeoResult<GeoRecord> {
        let ip = address
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| GeoError::UnparseableAddress(address.to_string()))?;

        self.rules
            .iter()
            .find(|rule| rule.network.contains(&ip))
            .map(|rule| rule.record.clone())
            .ok_or(GeoError::AddressNotFound(ip))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
