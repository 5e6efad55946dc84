//! Cross-service workflow integration tests library.
//!
//! Spawns the whole platform in-process: the stock service with its gated
//! listeners, the edge router discovering and probing those listeners, and
//! the orders service resolving the stock domain to the router. Tests drive
//! real HTTP through the chain and assert what a customer would see.

use anyhow::anyhow;
use edge_router::config::{
    DiscoveryConfig, HealthConfig, ProxyConfig, RouterConfig, TlsConfig,
};
use gateway_core::resolve::PrivateHostedZone;
use orders_service::config::{FailureMode, OrdersConfig, ResolverConfig, StockApiConfig};
use secrecy::Secret;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use stock_service::config::{
    BoundaryConfig, EndpointConfig, IdentityConfig, ListenerConfig, PlanConfig, StockConfig,
};

pub const STAGE: &str = "prod";
pub const API_KEY: &str = "super-secret-api-key";
pub const STOCK_DOMAIN: &str = "stock.internal";
pub const SANCTIONED_ENDPOINT: &str = "vpce-0a1b2c3d";
pub const ROGUE_ENDPOINT: &str = "vpce-9f8e7d6c";

/// How long to wait for a spawned service to come up.
pub const SPAWN_TIMEOUT: Duration = Duration::from_secs(30);

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,workflow_tests=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Poll `url` until it answers 2xx or the timeout passes.
pub async fn wait_until_ready(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let start = Instant::now();
    loop {
        if let Ok(response) = client.get(url).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        if start.elapsed() > timeout {
            return Err(anyhow!("timeout waiting for {url}"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Stock service on loopback: the sanctioned entry point, a second entry
/// point the policy does not sanction, and the direct service listener, all
/// on ephemeral ports.
pub fn stock_config() -> StockConfig {
    StockConfig {
        common: gateway_core::config::Config { port: 0 },
        service_name: "stock-service".to_string(),
        log_level: "info".to_string(),
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
            api_key: Secret::new(API_KEY.to_string()),
            enabled: true,
            plan: PlanConfig {
                name: "orders-usage-plan".to_string(),
                rate_per_second: 10,
                burst: 2,
                quota_limit: 500,
                quota_period: gateway_core::identity::QuotaPeriod::Day,
                stock_rate_per_second: 10,
                stock_burst: 2,
            },
        },
    }
}

/// Edge router with second-granularity sync and probing, no discovery wired
/// up yet; callers point it at a descriptor URL or static targets.
pub fn router_config() -> RouterConfig {
    RouterConfig {
        common: gateway_core::config::Config { port: 0 },
        service_name: "edge-router".to_string(),
        log_level: "info".to_string(),
        otlp_endpoint: None,
        listen_addr: "127.0.0.1:0".to_string(),
        discovery: DiscoveryConfig {
            endpoint_url: None,
            static_targets: Vec::new(),
            sync_interval_secs: 1,
            drain_timeout_secs: 2,
        },
        health: HealthConfig {
            interval_secs: 1,
            timeout_secs: 2,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
            expected_status: 403,
            path: "/".to_string(),
            scheme: "http".to_string(),
        },
        proxy: ProxyConfig {
            max_connections: 64,
        },
        tls: None,
    }
}

/// Orders service resolving `stock.internal` to `target` with TTL zero.
/// Failure mode is passthrough so tests can read the upstream status at the
/// orders boundary.
pub fn orders_config(target: Option<SocketAddr>) -> OrdersConfig {
    OrdersConfig {
        common: gateway_core::config::Config { port: 0 },
        service_name: "orders-service".to_string(),
        log_level: "info".to_string(),
        otlp_endpoint: None,
        stock: StockApiConfig {
            domain: STOCK_DOMAIN.to_string(),
            scheme: "http".to_string(),
            base_path: STAGE.to_string(),
            api_key: Secret::new(API_KEY.to_string()),
            timeout_secs: 5,
            accept_invalid_certs: false,
            failure_mode: FailureMode::Passthrough,
        },
        resolver: ResolverConfig {
            network_id: "net-stock".to_string(),
            target_addr: target,
            ttl_secs: 0,
        },
    }
}

pub struct StockHandles {
    pub sanctioned_addr: SocketAddr,
    pub rogue_addr: SocketAddr,
    pub service_addr: SocketAddr,
    pub ops_port: u16,
}

pub async fn spawn_stock(config: StockConfig) -> StockHandles {
    let app = stock_service::startup::Application::build(config)
        .await
        .expect("Failed to build stock-service");

    let find = |wanted: &str| {
        app.endpoint_addrs()
            .iter()
            .find(|(id, _)| id.as_str() == wanted)
            .map(|(_, addr)| *addr)
            .unwrap_or_else(|| panic!("no listener bound for {wanted}"))
    };
    let handles = StockHandles {
        sanctioned_addr: find(SANCTIONED_ENDPOINT),
        rogue_addr: find(ROGUE_ENDPOINT),
        service_addr: app.service_addr(),
        ops_port: app.ops_port(),
    };

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let client = reqwest::Client::new();
    wait_until_ready(
        &client,
        &format!("http://127.0.0.1:{}/health", handles.ops_port),
        SPAWN_TIMEOUT,
    )
    .await
    .expect("stock-service did not come up");

    handles
}

pub struct RouterHandles {
    pub proxy_addr: SocketAddr,
    pub ops_port: u16,
}

pub async fn spawn_router(config: RouterConfig) -> RouterHandles {
    let app = edge_router::startup::Application::build(config)
        .await
        .expect("Failed to build edge-router");
    let handles = RouterHandles {
        proxy_addr: app.proxy_addr(),
        ops_port: app.ops_port(),
    };

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let client = reqwest::Client::new();
    wait_until_ready(
        &client,
        &format!("http://127.0.0.1:{}/health", handles.ops_port),
        SPAWN_TIMEOUT,
    )
    .await
    .expect("edge-router did not come up");

    handles
}

pub struct OrdersHandles {
    pub port: u16,
    pub zone: Arc<PrivateHostedZone>,
}

pub async fn spawn_orders(config: OrdersConfig) -> OrdersHandles {
    let app = orders_service::startup::Application::build(config)
        .await
        .expect("Failed to build orders-service");
    let handles = OrdersHandles {
        port: app.port(),
        zone: app.zone(),
    };

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let client = reqwest::Client::new();
    wait_until_ready(
        &client,
        &format!("http://127.0.0.1:{}/health", handles.port),
        SPAWN_TIMEOUT,
    )
    .await
    .expect("orders-service did not come up");

    handles
}

/// Knobs a workflow can turn before the platform comes up.
pub struct TestBedOptions {
    pub stock_rate_per_second: u32,
    pub stock_burst: u32,
    pub quota_limit: u64,
    /// Terminate TLS at the router and call it over https from orders.
    pub tls: bool,
}

impl Default for TestBedOptions {
    fn default() -> Self {
        Self {
            stock_rate_per_second: 10,
            stock_burst: 2,
            quota_limit: 500,
            tls: false,
        }
    }
}

/// The whole platform, spawned in-process and ready to serve.
pub struct TestBed {
    pub client: reqwest::Client,
    pub stock: StockHandles,
    pub router: RouterHandles,
    pub orders: OrdersHandles,
    _tls_dir: Option<tempfile::TempDir>,
}

impl TestBed {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestBedOptions::default()).await
    }

    pub async fn spawn_with(options: TestBedOptions) -> Self {
        init_tracing();
        let client = reqwest::Client::new();

        let mut stock_cfg = stock_config();
        stock_cfg.identity.plan.stock_rate_per_second = options.stock_rate_per_second;
        stock_cfg.identity.plan.stock_burst = options.stock_burst;
        stock_cfg.identity.plan.quota_limit = options.quota_limit;
        let stock = spawn_stock(stock_cfg).await;

        let mut router_cfg = router_config();
        router_cfg.discovery.endpoint_url = Some(format!(
            "http://127.0.0.1:{}/internal/endpoint",
            stock.ops_port
        ));
        let tls_dir = if options.tls {
            let dir = tempfile::tempdir().expect("temp dir for certs");
            let (cert_path, key_path) = write_self_signed_certs(&dir);
            router_cfg.tls = Some(TlsConfig {
                cert_path,
                key_path,
            });
            Some(dir)
        } else {
            None
        };
        let router = spawn_router(router_cfg).await;

        // The router is usable once a probed target has crossed the healthy
        // threshold.
        wait_until_ready(
            &client,
            &format!("http://127.0.0.1:{}/ready", router.ops_port),
            SPAWN_TIMEOUT,
        )
        .await
        .expect("edge-router never became ready");

        let mut orders_cfg = orders_config(Some(router.proxy_addr));
        if options.tls {
            orders_cfg.stock.scheme = "https".to_string();
            orders_cfg.stock.accept_invalid_certs = true;
        }
        let orders = spawn_orders(orders_cfg).await;

        TestBed {
            client,
            stock,
            router,
            orders,
            _tls_dir: tls_dir,
        }
    }

    /// `GET /{stage}/stock` against any listener (plain HTTP), optionally
    /// with an API key.
    pub async fn get_stock_via(
        &self,
        addr: SocketAddr,
        api_key: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self.client.get(format!("http://{addr}/{STAGE}/stock"));
        if let Some(key) = api_key {
            req = req.header("x-api-key", key);
        }
        req.send().await.expect("stock request failed")
    }

    pub async fn post_order(&self) -> reqwest::Response {
        self.client
            .post(format!("http://127.0.0.1:{}/orders", self.orders.port))
            .json(&serde_json::json!({ "quantity": 1 }))
            .send()
            .await
            .expect("order request failed")
    }

    pub fn router_ops_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.router.ops_port, path)
    }

    pub fn stock_ops_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.stock.ops_port, path)
    }

    pub fn orders_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.orders.port, path)
    }
}

/// Self-signed certificate covering the stock domain, for a router that
/// terminates TLS in a workflow.
fn write_self_signed_certs(dir: &tempfile::TempDir) -> (String, String) {
    let cert = rcgen::generate_simple_self_signed(vec![
        STOCK_DOMAIN.to_string(),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .expect("generate certificate");

    let cert_path = dir.path().join("router.crt");
    let key_path = dir.path().join("router.key");
    std::fs::write(&cert_path, cert.serialize_pem().expect("serialize certificate"))
        .expect("write certificate");
    std::fs::write(&key_path, cert.serialize_private_key_pem()).expect("write key");

    (
        cert_path.to_string_lossy().into_owned(),
        key_path.to_string_lossy().into_owned(),
    )
}
