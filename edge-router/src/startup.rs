//! Application assembly and lifecycle for edge-router.

use crate::config::RouterConfig;
use crate::health::HealthChecker;
use crate::proxy::ProxyServer;
use crate::services::{get_metrics, init_metrics};
use crate::sync::{AddressSource, HttpAddressSource, Reconciler, StaticAddressSource};
use crate::targets::{HealthState, TargetGroup};
use crate::tls::load_tls_acceptor;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use gateway_core::error::AppError;
use gateway_core::middleware::{metrics_middleware, request_id_middleware};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct OpsState {
    group: Arc<TargetGroup>,
}

/// Liveness endpoint with a target summary.
async fn health_check(State(state): State<OpsState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "edge-router",
        "targets": {
            "total": state.group.targets().len(),
            "healthy": state.group.healthy_count(),
            "draining": state.group.draining_count(),
        }
    }))
}

/// Ready only once at least one target is healthy; before that the proxy
/// would refuse every connection anyway.
async fn readiness_check(State(state): State<OpsState>) -> impl IntoResponse {
    if state.group.healthy_count() > 0 {
        StatusCode::OK
    } else {
        tracing::debug!("readiness check failed, no healthy targets");
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

#[derive(Serialize)]
struct TargetView {
    addr: SocketAddr,
    state: HealthState,
}

/// Current target list for operators.
async fn list_targets(State(state): State<OpsState>) -> impl IntoResponse {
    let targets: Vec<TargetView> = state
        .group
        .targets()
        .iter()
        .map(|t| TargetView {
            addr: t.addr(),
            state: t.health(),
        })
        .collect();
    Json(targets)
}

/// Application container for managing server lifecycle.
pub struct Application {
    ops_listener: TcpListener,
    ops_port: u16,
    proxy: ProxyServer,
    proxy_addr: SocketAddr,
    reconciler: Reconciler,
    health_checker: HealthChecker,
    group: Arc<TargetGroup>,
    shutdown: CancellationToken,
}

impl Application {
    pub async fn build(config: RouterConfig) -> Result<Self, AppError> {
        init_metrics();

        let group = Arc::new(TargetGroup::new(Duration::from_secs(
            config.discovery.drain_timeout_secs,
        )));

        let source: Arc<dyn AddressSource> = match &config.discovery.endpoint_url {
            Some(url) => {
                tracing::info!(url = %url, "discovering targets from entry point descriptor");
                Arc::new(HttpAddressSource::new(url.clone()).map_err(AppError::ConfigError)?)
            }
            None => {
                if config.discovery.static_targets.is_empty() {
                    tracing::warn!("no discovery url and no static targets configured");
                }
                Arc::new(StaticAddressSource::new(
                    config.discovery.static_targets.clone(),
                ))
            }
        };

        let reconciler = Reconciler::new(
            source,
            group.clone(),
            Duration::from_secs(config.discovery.sync_interval_secs),
        );
        let health_checker =
            HealthChecker::new(group.clone(), config.health.clone()).map_err(AppError::ConfigError)?;

        let tls = match &config.tls {
            Some(tls) => Some(
                load_tls_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                    .map_err(AppError::ConfigError)?,
            ),
            None => None,
        };

        let proxy_listener = TcpListener::bind(&config.listen_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %config.listen_addr, "Failed to bind proxy listener");
            AppError::from(e)
        })?;
        let proxy_addr = proxy_listener.local_addr()?;
        let proxy = ProxyServer::new(
            proxy_listener,
            group.clone(),
            tls,
            config.proxy.max_connections,
        );

        let ops_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let ops_listener = TcpListener::bind(ops_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %ops_addr, "Failed to bind ops listener");
            AppError::from(e)
        })?;
        let ops_port = ops_listener.local_addr()?.port();

        tracing::info!(
            proxy_addr = %proxy_addr,
            ops_port = ops_port,
            tls = config.tls.is_some(),
            "edge-router listeners bound"
        );

        Ok(Self {
            ops_listener,
            ops_port,
            proxy,
            proxy_addr,
            reconciler,
            health_checker,
            group,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy_addr
    }

    pub fn ops_port(&self) -> u16 {
        self.ops_port
    }

    /// Run the proxy, the ops surface, and the background loops until one of
    /// the servers exits. Background loops are cancelled on the way out.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let Application {
            ops_listener,
            ops_port: _,
            proxy,
            proxy_addr,
            reconciler,
            health_checker,
            group,
            shutdown,
        } = self;

        let reconciler_task = tokio::spawn(reconciler.run(shutdown.child_token()));
        let health_task = tokio::spawn(health_checker.run(shutdown.child_token()));

        let ops_state = OpsState { group };
        let ops_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route("/targets", get(list_targets))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(ops_state);

        tracing::info!(proxy_addr = %proxy_addr, "edge-router ready to accept connections");

        tokio::select! {
            result = axum::serve(ops_listener, ops_router) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "ops server error");
                    shutdown.cancel();
                    return Err(std::io::Error::other(format!("ops server error: {}", e)));
                }
            }
            _ = proxy.run(shutdown.child_token()) => {}
        }

        shutdown.cancel();
        let _ = reconciler_task.await;
        let _ = health_task.await;
        Ok(())
    }
}
