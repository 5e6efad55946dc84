//! Application assembly and lifecycle for stock-service.
//!
//! The service binds three kinds of listeners. Entry point listeners stamp
//! requests with their endpoint's id and sit behind the boundary's ingress
//! rules; the direct service listener stamps nothing, so the access policy
//! denies whatever arrives on it; the ops listener serves health, metrics and
//! the entry point descriptor without any gates.

use crate::config::StockConfig;
use crate::handlers;
use crate::models::seed_catalog;
use crate::services::{get_metrics, init_metrics, metrics::CATALOG_SIZE};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use gateway_core::boundary::{EndpointId, NetworkBoundary, NetworkId, PrivateEndpoint};
use gateway_core::error::AppError;
use gateway_core::identity::{Identity, IdentityGate, RouteKey, Throttle, UsagePlan};
use gateway_core::middleware::{
    access_policy_middleware, api_key_middleware, boundary_ingress_middleware, metrics_middleware,
    origin_middleware, request_id_middleware, IngressGuard, KeyGate, PolicyEnforcer, RequestOrigin,
};
use gateway_core::policy::AccessPolicy;
use secrecy::ExposeSecret;
use serde_json::json;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct OpsState {
    endpoint: Arc<PrivateEndpoint>,
}

/// Liveness endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "stock-service"
    }))
}

/// Ready once the sanctioned entry point has at least one address.
async fn readiness_check(State(state): State<OpsState>) -> impl IntoResponse {
    if state.endpoint.is_provisioned() {
        StatusCode::OK
    } else {
        tracing::debug!("readiness check failed, entry point has no addresses");
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

/// The entry point descriptor the edge router discovers targets from.
async fn endpoint_descriptor(State(state): State<OpsState>) -> impl IntoResponse {
    Json(state.endpoint.descriptor())
}

/// The gate chain for one listener. Layers execute top to bottom: request id,
/// metrics, trace, origin stamp, ingress rules (entry point listeners only),
/// access policy, key gate, then the routes under `/{stage}`.
fn gated_router(
    state: AppState,
    stage: &str,
    key_gate: Arc<KeyGate>,
    enforcer: Arc<PolicyEnforcer>,
    origin: RequestOrigin,
    guard: Option<Arc<IngressGuard>>,
) -> Router {
    let routes = Router::new()
        .route("/stock", get(handlers::get_stock))
        .with_state(state);

    let mut router = Router::new()
        .nest(&format!("/{stage}"), routes)
        .layer(middleware::from_fn_with_state(key_gate, api_key_middleware))
        .layer(middleware::from_fn_with_state(
            enforcer,
            access_policy_middleware,
        ));
    if let Some(guard) = guard {
        router = router.layer(middleware::from_fn_with_state(
            guard,
            boundary_ingress_middleware,
        ));
    }
    router
        .layer(middleware::from_fn_with_state(origin, origin_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
}

type ServerFuture = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

/// Application container for managing server lifecycle.
pub struct Application {
    endpoint_addrs: Vec<(EndpointId, SocketAddr)>,
    service_addr: SocketAddr,
    ops_port: u16,
    servers: Vec<ServerFuture>,
}

impl Application {
    pub async fn build(config: StockConfig) -> Result<Self, AppError> {
        init_metrics();

        let state = AppState::new(seed_catalog());
        CATALOG_SIZE.set(state.catalog.len() as i64);

        let plan_cfg = &config.identity.plan;
        let mut plan = UsagePlan::new(
            plan_cfg.name.clone(),
            Throttle {
                rate_per_second: plan_cfg.rate_per_second,
                burst: plan_cfg.burst,
            },
        )
        .with_method_override(
            RouteKey::new("GET", "/stock"),
            Throttle {
                rate_per_second: plan_cfg.stock_rate_per_second,
                burst: plan_cfg.stock_burst,
            },
        );
        if let Some(quota) = plan_cfg.quota() {
            plan = plan.with_quota(quota);
        }

        let mut identity = Identity::new(
            config.identity.key_name.clone(),
            config.identity.api_key.expose_secret().clone(),
            plan_cfg.name.clone(),
        )
        .with_customer(config.identity.customer_id.clone());
        if !config.identity.enabled {
            identity = identity.disabled();
        }

        let gate =
            IdentityGate::new(vec![plan], vec![identity]).map_err(AppError::ConfigError)?;
        let key_gate = Arc::new(KeyGate::new(Arc::new(gate), config.stage.clone()));

        let sanctioned = EndpointId::new(config.endpoint.endpoint_id.clone());
        let enforcer = Arc::new(PolicyEnforcer::new(
            AccessPolicy::private_api(&sanctioned),
            config.stage.clone(),
        ));

        let network = NetworkId::new(config.boundary.network_id.clone());
        let mut boundary = NetworkBoundary::new(network.clone(), config.boundary.cidr);

        let mut endpoint_listeners = Vec::new();
        for listener_cfg in &config.endpoint.listeners {
            let listener = TcpListener::bind(listener_cfg.addr).await.map_err(|e| {
                tracing::error!(error = %e, addr = %listener_cfg.addr, "Failed to bind entry point listener");
                AppError::from(e)
            })?;
            let addr = listener.local_addr()?;
            boundary.allow_ingress(config.boundary.cidr, addr.port());
            endpoint_listeners.push((
                EndpointId::new(listener_cfg.endpoint_id.clone()),
                listener,
                addr,
            ));
        }

        let sanctioned_addrs: Vec<SocketAddr> = endpoint_listeners
            .iter()
            .filter(|(id, _, _)| *id == sanctioned)
            .map(|(_, _, addr)| *addr)
            .collect();
        let endpoint_port = sanctioned_addrs.first().map(|a| a.port()).unwrap_or(443);
        let endpoint = Arc::new(PrivateEndpoint::new(
            sanctioned.clone(),
            network,
            endpoint_port,
        ));
        if sanctioned_addrs.is_empty() {
            tracing::warn!(endpoint = %sanctioned, "no listener bound for the sanctioned entry point");
        } else {
            endpoint.set_addresses(sanctioned_addrs)?;
        }

        let mut servers: Vec<ServerFuture> = Vec::new();
        let mut endpoint_addrs = Vec::new();
        for (endpoint_id, listener, addr) in endpoint_listeners {
            let guard = Arc::new(IngressGuard::new(boundary.clone(), addr.port()));
            let router = gated_router(
                state.clone(),
                &config.stage,
                key_gate.clone(),
                enforcer.clone(),
                RequestOrigin::via(endpoint_id.clone()),
                Some(guard),
            );
            tracing::info!(endpoint = %endpoint_id, addr = %addr, "entry point listener bound");
            servers.push(Box::pin(
                axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .into_future(),
            ));
            endpoint_addrs.push((endpoint_id, addr));
        }

        let service_listener = TcpListener::bind(&config.service_listen_addr)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, addr = %config.service_listen_addr, "Failed to bind service listener");
                AppError::from(e)
            })?;
        let service_addr = service_listener.local_addr()?;
        let service_router = gated_router(
            state.clone(),
            &config.stage,
            key_gate.clone(),
            enforcer.clone(),
            RequestOrigin::untrusted(),
            None,
        );
        servers.push(Box::pin(
            axum::serve(
                service_listener,
                service_router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .into_future(),
        ));

        let ops_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let ops_listener = TcpListener::bind(ops_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %ops_addr, "Failed to bind ops listener");
            AppError::from(e)
        })?;
        let ops_port = ops_listener.local_addr()?.port();
        let ops_state = OpsState { endpoint };
        let ops_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route("/internal/endpoint", get(endpoint_descriptor))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(ops_state);
        servers.push(Box::pin(axum::serve(ops_listener, ops_router).into_future()));

        tracing::info!(
            service_addr = %service_addr,
            ops_port = ops_port,
            stage = %config.stage,
            "stock-service listeners bound"
        );

        Ok(Self {
            endpoint_addrs,
            service_addr,
            ops_port,
            servers,
        })
    }

    /// Bound entry point listeners, in configuration order.
    pub fn endpoint_addrs(&self) -> &[(EndpointId, SocketAddr)] {
        &self.endpoint_addrs
    }

    pub fn service_addr(&self) -> SocketAddr {
        self.service_addr
    }

    pub fn ops_port(&self) -> u16 {
        self.ops_port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        futures::future::try_join_all(self.servers).await?;
        Ok(())
    }
}
