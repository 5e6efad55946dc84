//! Client for the private stock API.
//!
//! Resolution happens inside the boundary on every call: the stock record
//! carries TTL zero, so when the edge router is replaced the next order
//! already reaches the new address. The HTTP client pins the domain to the
//! resolved address and is rebuilt only when that address changes.

use crate::config::StockApiConfig;
use crate::services::{record_stock_call, STOCK_CALL_DURATION};
use gateway_core::middleware::API_KEY_HEADER;
use gateway_core::observability::TracedClientExt;
use gateway_core::resolve::{ResolveError, Resolver};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("could not resolve the stock api: {0}")]
    Resolve(#[from] ResolveError),
    #[error("stock api unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stock api answered {status}")]
    Upstream { status: StatusCode, body: String },
}

impl StockError {
    pub fn outcome(&self) -> &'static str {
        match self {
            StockError::Resolve(_) => "resolve-error",
            StockError::Transport(_) => "transport-error",
            StockError::Upstream { .. } => "upstream-error",
        }
    }
}

struct Pinned {
    target: SocketAddr,
    client: reqwest::Client,
}

pub struct StockClient {
    resolver: Resolver,
    domain: String,
    scheme: String,
    base_path: String,
    api_key: Secret<String>,
    timeout: Duration,
    accept_invalid_certs: bool,
    pinned: Mutex<Option<Pinned>>,
}

impl StockClient {
    pub fn new(resolver: Resolver, config: &StockApiConfig) -> Self {
        Self {
            resolver,
            domain: config.domain.clone(),
            scheme: config.scheme.clone(),
            base_path: config.base_path.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            accept_invalid_certs: config.accept_invalid_certs,
            pinned: Mutex::new(None),
        }
    }

    /// The invoke URL for a resolved target. Name resolution carries no port,
    /// so the URL spells out the target's.
    fn url_for(&self, target: SocketAddr) -> String {
        format!(
            "{}://{}:{}/{}/stock",
            self.scheme,
            self.domain,
            target.port(),
            self.base_path
        )
    }

    fn client_for(&self, target: SocketAddr) -> Result<reqwest::Client, reqwest::Error> {
        let mut guard = self.pinned.lock().expect("pinned client lock poisoned");
        if let Some(pinned) = guard.as_ref() {
            if pinned.target == target {
                return Ok(pinned.client.clone());
            }
            tracing::info!(
                old = %pinned.target,
                new = %target,
                "stock api address changed, repinning client"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .resolve(&self.domain, target)
            .build()?;
        *guard = Some(Pinned {
            target,
            client: client.clone(),
        });
        Ok(client)
    }

    /// Fetch the current catalog through the router.
    pub async fn fetch_stock(&self) -> Result<serde_json::Value, StockError> {
        let started = Instant::now();
        let result = self.call().await;
        STOCK_CALL_DURATION.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => record_stock_call("ok"),
            Err(e) => record_stock_call(e.outcome()),
        }
        result
    }

    async fn call(&self) -> Result<serde_json::Value, StockError> {
        let target = self.resolver.resolve(&self.domain)?;
        let client = self.client_for(target)?;

        let response = client
            .traced_get(&self.url_for(target))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "stock api refused the call");
            return Err(StockError::Upstream { status, body });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::boundary::NetworkId;
    use gateway_core::resolve::PrivateHostedZone;
    use std::sync::Arc;

    fn client(scheme: &str) -> StockClient {
        let network = NetworkId::new("net-stock");
        let zone = Arc::new(PrivateHostedZone::new("stock.internal", network.clone()));
        let config = StockApiConfig {
            domain: "stock.internal".to_string(),
            scheme: scheme.to_string(),
            base_path: "prod".to_string(),
            api_key: Secret::new("super-secret-api-key".to_string()),
            timeout_secs: 5,
            accept_invalid_certs: false,
            failure_mode: crate::config::FailureMode::BadGateway,
        };
        StockClient::new(Resolver::inside(network, zone), &config)
    }

    #[test]
    fn invoke_url_spells_out_the_resolved_port() {
        let client = client("https");
        let url = client.url_for("10.2.5.1:8443".parse().unwrap());
        assert_eq!(url, "https://stock.internal:8443/prod/stock");
    }

    #[tokio::test]
    async fn unresolvable_domain_reports_a_resolve_error() {
        let client = client("http");
        let err = client.fetch_stock().await.unwrap_err();
        assert!(matches!(err, StockError::Resolve(_)));
    }
}
