//! Application assembly and lifecycle for orders-service.

use crate::config::OrdersConfig;
use crate::handlers;
use crate::services::{init_metrics, StockClient};
use crate::AppState;
use axum::routing::{get, post};
use axum::{middleware, Router};
use gateway_core::boundary::NetworkId;
use gateway_core::error::AppError;
use gateway_core::middleware::{metrics_middleware, request_id_middleware};
use gateway_core::resolve::{PrivateHostedZone, RecordSet, Resolver};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    zone: Arc<PrivateHostedZone>,
}

impl Application {
    pub async fn build(config: OrdersConfig) -> Result<Self, AppError> {
        init_metrics();

        let network = NetworkId::new(config.resolver.network_id.clone());
        let zone = Arc::new(PrivateHostedZone::new(
            config.stock.domain.clone(),
            network.clone(),
        ));
        match config.resolver.target_addr {
            Some(target) => {
                zone.upsert(
                    RecordSet::alias(config.stock.domain.clone(), target)
                        .with_ttl(Duration::from_secs(config.resolver.ttl_secs)),
                );
                tracing::info!(
                    domain = %config.stock.domain,
                    target = %target,
                    ttl_secs = config.resolver.ttl_secs,
                    "stock record registered"
                );
            }
            None => {
                tracing::warn!(
                    domain = %config.stock.domain,
                    "no stock target configured, orders fail until a record is added"
                );
            }
        }

        let resolver = Resolver::inside(network, zone.clone());
        let state = AppState {
            stock: Arc::new(StockClient::new(resolver, &config.stock)),
            failure_mode: config.stock.failure_mode,
        };

        let app = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics_handler))
            .route("/orders", post(handlers::create_order))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            zone,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The private zone holding the stock record, so a supervisor can repoint
    /// it without restarting the service.
    pub fn zone(&self) -> Arc<PrivateHostedZone> {
        self.zone.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
