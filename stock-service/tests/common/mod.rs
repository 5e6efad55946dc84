//! Common test utilities for stock-service integration tests.

use gateway_core::identity::QuotaPeriod;
use std::net::SocketAddr;
use std::sync::Once;
use stock_service::config::{
    BoundaryConfig, EndpointConfig, IdentityConfig, ListenerConfig, PlanConfig, StockConfig,
};
use stock_service::startup::Application;

pub const STAGE: &str = "prod";
pub const API_KEY: &str = "super-secret-api-key";
pub const SANCTIONED_ENDPOINT: &str = "vpce-0a1b2c3d";
pub const ROGUE_ENDPOINT: &str = "vpce-9f8e7d6c";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,stock_service=debug,gateway_core=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A config the tests can tweak before spawning: loopback listeners on
/// ephemeral ports, a boundary covering loopback, the sanctioned entry point
/// plus a second one the policy does not sanction.
pub fn base_config() -> StockConfig {
    StockConfig {
        common: gateway_core::config::Config { port: 0 },
        service_name: "stock-service".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        stage: STAGE.to_string(),
        boundary: BoundaryConfig {
            network_id: "net-stock".to_string(),
            cidr: "127.0.0.0/8".parse().expect("valid cidr"),
        },
        endpoint: EndpointConfig {
            endpoint_id: SANCTIONED_ENDPOINT.to_string(),
            listeners: vec![
                ListenerConfig {
                    endpoint_id: SANCTIONED_ENDPOINT.to_string(),
                    addr: "127.0.0.1:0".parse().expect("valid addr"),
                },
                ListenerConfig {
                    endpoint_id: ROGUE_ENDPOINT.to_string(),
                    addr: "127.0.0.1:0".parse().expect("valid addr"),
                },
            ],
        },
        service_listen_addr: "127.0.0.1:0".to_string(),
        identity: IdentityConfig {
            key_name: "orders-rate-limited-api-key".to_string(),
            customer_id: "orders-api".to_string(),
            api_key: secrecy::Secret::new(API_KEY.to_string()),
            enabled: true,
            plan: PlanConfig {
                name: "orders-usage-plan".to_string(),
                rate_per_second: 10,
                burst: 2,
                quota_limit: 500,
                quota_period: QuotaPeriod::Day,
                stock_rate_per_second: 10,
                stock_burst: 2,
            },
        },
    }
}

pub struct TestApp {
    pub client: reqwest::Client,
    pub sanctioned_addr: SocketAddr,
    pub rogue_addr: SocketAddr,
    pub service_addr: SocketAddr,
    pub ops_port: u16,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(base_config()).await
    }

    pub async fn spawn_with(config: StockConfig) -> Self {
        init_tracing();

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let find = |wanted: &str| {
            app.endpoint_addrs()
                .iter()
                .find(|(id, _)| id.as_str() == wanted)
                .map(|(_, addr)| *addr)
                .unwrap_or_else(|| panic!("no listener bound for {wanted}"))
        };
        let sanctioned_addr = find(SANCTIONED_ENDPOINT);
        let rogue_addr = find(ROGUE_ENDPOINT);
        let service_addr = app.service_addr();
        let ops_port = app.ops_port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("http://127.0.0.1:{ops_port}/health");
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            client,
            sanctioned_addr,
            rogue_addr,
            service_addr,
            ops_port,
        }
    }

    /// `GET /{stage}/stock` through the given listener, optionally with an
    /// API key.
    pub async fn get_stock(&self, via: SocketAddr, api_key: Option<&str>) -> reqwest::Response {
        self.get(via, &format!("/{STAGE}/stock"), api_key).await
    }

    pub async fn get(
        &self,
        via: SocketAddr,
        path: &str,
        api_key: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self.client.get(format!("http://{via}{path}"));
        if let Some(key) = api_key {
            req = req.header("x-api-key", key);
        }
        req.send().await.expect("request failed")
    }

    pub fn ops_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.ops_port, path)
    }
}
