//! Network isolation boundary bookkeeping.
//!
//! Models the private address space the platform runs in, the ingress rules
//! guarding it, and the private entry point whose backing addresses the edge
//! router tracks. None of this touches the wire; it is the control-plane
//! record the policy engine, the ingress guard and the target reconciler all
//! consult.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::RwLock;
use thiserror::Error;

/// Identifier of an isolation boundary (a private network).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Stable identifier of a private entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("endpoint address set must not be empty once provisioned")]
    EmptyAddressSet,
}

/// One allowed inbound flow: a source network and a destination port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRule {
    pub source: IpNet,
    pub port: u16,
}

impl IngressRule {
    pub fn allows(&self, peer: IpAddr, port: u16) -> bool {
        self.port == port && self.source.contains(&peer)
    }
}

/// A private address space with no route to the public internet.
///
/// Inbound traffic is denied unless an ingress rule matches, mirroring the
/// default-deny posture of the security group guarding the entry point.
#[derive(Debug, Clone)]
pub struct NetworkBoundary {
    id: NetworkId,
    cidr: IpNet,
    ingress: Vec<IngressRule>,
}

impl NetworkBoundary {
    pub fn new(id: NetworkId, cidr: IpNet) -> Self {
        Self {
            id,
            cidr,
            ingress: Vec::new(),
        }
    }

    pub fn id(&self) -> &NetworkId {
        &self.id
    }

    pub fn cidr(&self) -> IpNet {
        self.cidr
    }

    /// Permit inbound traffic on `port` from `source`.
    pub fn allow_ingress(&mut self, source: IpNet, port: u16) {
        self.ingress.push(IngressRule { source, port });
    }

    /// Whether `addr` lies inside this boundary's address space.
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.cidr.contains(&addr)
    }

    /// Whether a peer is allowed to open a connection to `port`.
    pub fn allows(&self, peer: IpAddr, port: u16) -> bool {
        self.ingress.iter().any(|rule| rule.allows(peer, port))
    }
}

/// Wire representation of an entry point, served on the stock ops surface and
/// consumed by the edge router's address discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub endpoint_id: EndpointId,
    pub addresses: Vec<SocketAddr>,
}

/// The sanctioned private entry point for an internal API.
///
/// The address set is refreshed asynchronously (listeners come and go as the
/// underlying interfaces are replaced); readers always see a complete
/// snapshot. An endpoint is never allowed to shrink to zero addresses.
#[derive(Debug)]
pub struct PrivateEndpoint {
    id: EndpointId,
    boundary: NetworkId,
    port: u16,
    addresses: RwLock<Vec<SocketAddr>>,
}

impl PrivateEndpoint {
    pub fn new(id: EndpointId, boundary: NetworkId, port: u16) -> Self {
        Self {
            id,
            boundary,
            port,
            addresses: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn boundary(&self) -> &NetworkId {
        &self.boundary
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Snapshot of the current backing addresses.
    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.addresses
            .read()
            .expect("endpoint address lock poisoned")
            .clone()
    }

    pub fn is_provisioned(&self) -> bool {
        !self.addresses().is_empty()
    }

    /// Replace the backing address set.
    ///
    /// An empty set is rejected and the previous addresses stay in place.
    pub fn set_addresses(&self, addrs: Vec<SocketAddr>) -> Result<(), BoundaryError> {
        if addrs.is_empty() {
            return Err(BoundaryError::EmptyAddressSet);
        }

        let mut guard = self
            .addresses
            .write()
            .expect("endpoint address lock poisoned");
        *guard = addrs;
        Ok(())
    }

    pub fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor {
            endpoint_id: self.id.clone(),
            addresses: self.addresses(),
        }
    }
}
