use crate::boundary::{EndpointId, NetworkBoundary};
use crate::error::AppError;
use axum::extract::{ConnectInfo, Request, State};
use axum::{middleware::Next, response::Response};
use std::net::SocketAddr;
use std::sync::Arc;

/// Provenance stamped onto every request by the listener it arrived on.
///
/// Listeners bound to a private entry point stamp that endpoint's id; any
/// other listener stamps `None`, which the policy engine treats as untrusted.
#[derive(Debug, Clone)]
pub struct RequestOrigin {
    pub endpoint: Option<EndpointId>,
}

impl RequestOrigin {
    pub fn via(endpoint: EndpointId) -> Self {
        Self {
            endpoint: Some(endpoint),
        }
    }

    pub fn untrusted() -> Self {
        Self { endpoint: None }
    }
}

pub async fn origin_middleware(
    State(origin): State<RequestOrigin>,
    mut req: Request,
    next: Next,
) -> Response {
    req.extensions_mut().insert(origin);
    next.run(req).await
}

/// Enforces the boundary's inbound rules against the connecting peer, the
/// way a security group guards a listener.
pub struct IngressGuard {
    boundary: NetworkBoundary,
    port: u16,
}

impl IngressGuard {
    pub fn new(boundary: NetworkBoundary, port: u16) -> Self {
        Self { boundary, port }
    }
}

pub async fn boundary_ingress_middleware(
    State(guard): State<Arc<IngressGuard>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match peer {
        Some(addr) if guard.boundary.allows(addr.ip(), guard.port) => Ok(next.run(req).await),
        Some(addr) => {
            tracing::warn!(peer = %addr, port = guard.port, "connection outside ingress rules");
            Err(AppError::Forbidden(anyhow::anyhow!(
                "peer is not permitted by the boundary's ingress rules"
            )))
        }
        None => {
            tracing::warn!("peer address unavailable, refusing request");
            Err(AppError::Forbidden(anyhow::anyhow!(
                "peer address could not be determined"
            )))
        }
    }
}
