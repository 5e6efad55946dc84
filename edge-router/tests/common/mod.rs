//! Common test utilities for edge-router integration tests.

use axum::http::StatusCode;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Once;
use tokio::net::TcpListener;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,edge_router=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Spawn a stub HTTP backend answering every path with `status`, the way a
/// gated service answers unauthenticated probes. Returns its address.
#[allow(dead_code)]
pub async fn spawn_http_backend(status: StatusCode) -> SocketAddr {
    let app = Router::new().fallback(move || async move { status });
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub backend");
    let addr = listener.local_addr().expect("stub backend addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    addr
}
