//! Target synchronization with the private entry point.
//!
//! A background reconciler periodically fetches the entry point's current
//! address list and converges the target group toward it. Discovery failures
//! and empty answers leave the existing target set untouched; the next cycle
//! tries again.

use crate::services::metrics::{record_reconcile_cycle, set_target_gauges};
use crate::targets::TargetGroup;
use async_trait::async_trait;
use gateway_core::boundary::{EndpointDescriptor, PrivateEndpoint};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Where the reconciler learns the entry point's backend addresses.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn current_addresses(&self) -> anyhow::Result<Vec<SocketAddr>>;
}

/// Fixed address list, for static registration and tests.
pub struct StaticAddressSource {
    addrs: Vec<SocketAddr>,
}

impl StaticAddressSource {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self { addrs }
    }
}

#[async_trait]
impl AddressSource for StaticAddressSource {
    async fn current_addresses(&self) -> anyhow::Result<Vec<SocketAddr>> {
        Ok(self.addrs.clone())
    }
}

/// Reads the entry point registry shared within this process.
pub struct EndpointAddressSource {
    endpoint: Arc<PrivateEndpoint>,
}

impl EndpointAddressSource {
    pub fn new(endpoint: Arc<PrivateEndpoint>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl AddressSource for EndpointAddressSource {
    async fn current_addresses(&self) -> anyhow::Result<Vec<SocketAddr>> {
        Ok(self.endpoint.addresses())
    }
}

/// Fetches the entry point descriptor from a service's ops surface.
pub struct HttpAddressSource {
    client: reqwest::Client,
    url: String,
}

impl HttpAddressSource {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AddressSource for HttpAddressSource {
    async fn current_addresses(&self) -> anyhow::Result<Vec<SocketAddr>> {
        let descriptor: EndpointDescriptor = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(descriptor.addresses)
    }
}

pub struct Reconciler {
    source: Arc<dyn AddressSource>,
    group: Arc<TargetGroup>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(source: Arc<dyn AddressSource>, group: Arc<TargetGroup>, interval: Duration) -> Self {
        Self {
            source,
            group,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("reconciler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.reconcile_once().await;
                }
            }
        }
    }

    /// One reconciliation cycle. Never fails the loop: errors are logged
    /// and the current target set stays as it was.
    pub async fn reconcile_once(&self) {
        match self.source.current_addresses().await {
            Ok(addrs) if addrs.is_empty() => {
                tracing::warn!("address source returned no addresses, keeping current targets");
                record_reconcile_cycle("empty");
            }
            Ok(addrs) => {
                let now = Instant::now();
                let outcome = self.group.sync(&addrs, now);
                let removed = self.group.reap_drained(now);

                if outcome.is_noop() && removed.is_empty() {
                    record_reconcile_cycle("noop");
                } else {
                    tracing::info!(
                        added = ?outcome.added,
                        drained = ?outcome.drained,
                        removed = ?removed,
                        "target set updated"
                    );
                    record_reconcile_cycle("applied");
                }
                set_target_gauges(
                    self.group.targets().len() as i64,
                    self.group.healthy_count() as i64,
                    self.group.draining_count() as i64,
                );
            }
            Err(error) => {
                tracing::warn!(error = %error, "address discovery failed, keeping current targets");
                record_reconcile_cycle("error");
            }
        }
    }
}
