//! Periodic health probing.
//!
//! Each tick probes every active target concurrently; a given target is
//! probed at most once per tick, so its own probes stay serialized. A probe
//! passes when the response status matches the configured signature, which
//! for gated backends is the 403 an unauthenticated probe earns. Connection
//! failures and timeouts count as failed probes.

use crate::config::HealthConfig;
use crate::services::metrics::{record_health_probe, record_health_transition};
use crate::targets::{Target, TargetGroup};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct HealthChecker {
    group: Arc<TargetGroup>,
    config: HealthConfig,
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new(group: Arc<TargetGroup>, config: HealthConfig) -> anyhow::Result<Self> {
        // Targets are addressed by IP, so certificate names will never
        // match; the probe only cares about reachability and status.
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            group,
            config,
            client,
        })
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("health checker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
            }
        }
    }

    pub async fn probe_all(&self) {
        let targets = self.group.targets();
        let probes = targets
            .into_iter()
            .map(|target| self.probe_target(target));
        futures::future::join_all(probes).await;
    }

    pub async fn probe_target(&self, target: Arc<Target>) {
        let pass = self.probe(target.addr()).await;
        record_health_probe(pass);

        if let Some(state) = target.record_probe(
            pass,
            self.config.healthy_threshold,
            self.config.unhealthy_threshold,
        ) {
            tracing::info!(target = %target.addr(), state = ?state, "target health changed");
            record_health_transition(state);
        }
    }

    async fn probe(&self, addr: SocketAddr) -> bool {
        let url = format!("{}://{}{}", self.config.scheme, addr, self.config.path);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().as_u16() == self.config.expected_status,
            Err(error) => {
                tracing::debug!(target = %addr, error = %error, "probe did not complete");
                false
            }
        }
    }
}
