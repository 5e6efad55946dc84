//! Boundary-scoped name resolution.
//!
//! A private hosted zone maps stable internal names to the router's address
//! and answers queries only for resolvers inside its own network boundary.
//! Records carry a TTL; a TTL of zero disables caching entirely, so a router
//! replacement is visible to the very next resolution.

use crate::boundary::NetworkId;
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no record for '{0}'")]
    NameNotFound(String),
    #[error("zone '{zone}' is not visible from network '{network}'")]
    OutOfScope { zone: String, network: NetworkId },
}

/// One A-record equivalent: a name aliased to a routable address.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub name: String,
    pub target: SocketAddr,
    pub ttl: Duration,
}

impl RecordSet {
    pub fn alias(name: impl Into<String>, target: SocketAddr) -> Self {
        Self {
            name: name.into(),
            target,
            ttl: Duration::ZERO,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A zone visible only inside one network boundary.
#[derive(Debug)]
pub struct PrivateHostedZone {
    zone_name: String,
    network: NetworkId,
    records: RwLock<HashMap<String, RecordSet>>,
}

impl PrivateHostedZone {
    pub fn new(zone_name: impl Into<String>, network: NetworkId) -> Self {
        Self {
            zone_name: zone_name.into(),
            network,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn zone_name(&self) -> &str {
        &self.zone_name
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    /// Insert or replace the record for `record.name`.
    pub fn upsert(&self, record: RecordSet) {
        self.records
            .write()
            .expect("zone record lock poisoned")
            .insert(record.name.clone(), record);
    }

    fn lookup(&self, name: &str) -> Option<RecordSet> {
        self.records
            .read()
            .expect("zone record lock poisoned")
            .get(name)
            .cloned()
    }
}

struct CachedAnswer {
    target: SocketAddr,
    expires_at: Instant,
}

/// A resolver pinned to the network it runs in. Queries against a zone from
/// another boundary fail; matching queries honor record TTLs, with TTL zero
/// meaning every call re-reads the zone.
pub struct Resolver {
    network: NetworkId,
    zone: Arc<PrivateHostedZone>,
    cache: DashMap<String, CachedAnswer>,
}

impl Resolver {
    pub fn inside(network: NetworkId, zone: Arc<PrivateHostedZone>) -> Self {
        Self {
            network,
            zone,
            cache: DashMap::new(),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<SocketAddr, ResolveError> {
        if self.zone.network() != &self.network {
            return Err(ResolveError::OutOfScope {
                zone: self.zone.zone_name().to_string(),
                network: self.network.clone(),
            });
        }

        if let Some(cached) = self.cache.get(name) {
            if cached.expires_at > Instant::now() {
                return Ok(cached.target);
            }
        }
        self.cache.remove(name);

        let record = self
            .zone
            .lookup(name)
            .ok_or_else(|| ResolveError::NameNotFound(name.to_string()))?;

        if !record.ttl.is_zero() {
            self.cache.insert(
                name.to_string(),
                CachedAnswer {
                    target: record.target,
                    expires_at: Instant::now() + record.ttl,
                },
            );
        }

        Ok(record.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Arc<PrivateHostedZone> {
        let zone = PrivateHostedZone::new("internal-stock.com", NetworkId::new("net-stock"));
        zone.upsert(RecordSet::alias(
            "internal-stock.com",
            "10.2.5.1:443".parse().unwrap(),
        ));
        Arc::new(zone)
    }

    #[test]
    fn resolves_inside_the_boundary() {
        let resolver = Resolver::inside(NetworkId::new("net-stock"), zone());
        assert_eq!(
            resolver.resolve("internal-stock.com").unwrap(),
            "10.2.5.1:443".parse().unwrap()
        );
    }

    #[test]
    fn refuses_queries_from_another_network() {
        let resolver = Resolver::inside(NetworkId::new("net-public"), zone());
        assert!(matches!(
            resolver.resolve("internal-stock.com"),
            Err(ResolveError::OutOfScope { .. })
        ));
    }

    #[test]
    fn unknown_name_is_an_error() {
        let resolver = Resolver::inside(NetworkId::new("net-stock"), zone());
        assert!(matches!(
            resolver.resolve("nowhere.internal"),
            Err(ResolveError::NameNotFound(_))
        ));
    }

    #[test]
    fn ttl_zero_sees_record_updates_immediately() {
        let zone = zone();
        let resolver = Resolver::inside(NetworkId::new("net-stock"), zone.clone());
        resolver.resolve("internal-stock.com").unwrap();

        zone.upsert(RecordSet::alias(
            "internal-stock.com",
            "10.2.5.2:443".parse().unwrap(),
        ));
        assert_eq!(
            resolver.resolve("internal-stock.com").unwrap(),
            "10.2.5.2:443".parse().unwrap()
        );
    }

    #[test]
    fn positive_ttl_serves_cached_answer_until_expiry() {
        let zone = zone();
        zone.upsert(
            RecordSet::alias("internal-stock.com", "10.2.5.1:443".parse().unwrap())
                .with_ttl(Duration::from_secs(300)),
        );
        let resolver = Resolver::inside(NetworkId::new("net-stock"), zone.clone());
        resolver.resolve("internal-stock.com").unwrap();

        zone.upsert(
            RecordSet::alias("internal-stock.com", "10.2.5.9:443".parse().unwrap())
                .with_ttl(Duration::from_secs(300)),
        );
        assert_eq!(
            resolver.resolve("internal-stock.com").unwrap(),
            "10.2.5.1:443".parse().unwrap()
        );
    }
}
