//! Common test utilities for orders-service integration tests.

use axum::extract::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use gateway_core::resolve::PrivateHostedZone;
use orders_service::config::{
    FailureMode, OrdersConfig, ResolverConfig, StockApiConfig,
};
use orders_service::startup::Application;
use std::net::SocketAddr;
use std::sync::{Arc, Once};

pub const API_KEY: &str = "super-secret-api-key";
pub const STOCK_DOMAIN: &str = "stock.internal";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,orders_service=debug,gateway_core=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Spawn a stand-in for the gated stock API: `GET /prod/stock` serves `body`
/// when the expected key is presented and 403 otherwise.
pub async fn spawn_stock_stub(
    expected_key: &'static str,
    body: serde_json::Value,
) -> SocketAddr {
    let app = Router::new().route(
        "/prod/stock",
        get(move |headers: HeaderMap| {
            let body = body.clone();
            async move {
                let key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
                if key == Some(expected_key) {
                    (StatusCode::OK, Json(body)).into_response()
                } else {
                    StatusCode::FORBIDDEN.into_response()
                }
            }
        }),
    );
    spawn_router(app).await
}

/// Spawn a stub answering every path with `status`.
#[allow(dead_code)]
pub async fn spawn_status_stub(status: StatusCode) -> SocketAddr {
    let app = Router::new().fallback(move || async move { status });
    spawn_router(app).await
}

async fn spawn_router(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub listener");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

/// A config pointing the stock record at `target`, plain HTTP, TTL zero.
pub fn base_config(target: Option<SocketAddr>) -> OrdersConfig {
    OrdersConfig {
        common: gateway_core::config::Config { port: 0 },
        service_name: "orders-service".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        stock: StockApiConfig {
            domain: STOCK_DOMAIN.to_string(),
            scheme: "http".to_string(),
            base_path: "prod".to_string(),
            api_key: secrecy::Secret::new(API_KEY.to_string()),
            timeout_secs: 5,
            accept_invalid_certs: false,
            failure_mode: FailureMode::BadGateway,
        },
        resolver: ResolverConfig {
            network_id: "net-stock".to_string(),
            target_addr: target,
            ttl_secs: 0,
        },
    }
}

pub struct TestApp {
    pub client: reqwest::Client,
    pub port: u16,
    pub zone: Arc<PrivateHostedZone>,
}

impl TestApp {
    pub async fn spawn_with(config: OrdersConfig) -> Self {
        init_tracing();

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let zone = app.zone();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("http://127.0.0.1:{port}/health");
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp { client, port, zone }
    }

    pub async fn post_order(&self) -> reqwest::Response {
        self.client
            .post(format!("http://127.0.0.1:{}/orders", self.port))
            .json(&serde_json::json!({ "quantity": 1 }))
            .send()
            .await
            .expect("order request")
    }
}
