use crate::error::AppError;
use crate::middleware::ingress::RequestOrigin;
use crate::middleware::route_path;
use crate::policy::{AccessPolicy, Decision, RequestContext};
use axum::extract::{Request, State};
use axum::{middleware::Next, response::Response};
use metrics::counter;
use std::sync::Arc;

/// Evaluates the access policy against each request's provenance before any
/// identity checks run. Requests that were never stamped with an origin are
/// denied outright.
pub struct PolicyEnforcer {
    policy: AccessPolicy,
    stage: String,
}

impl PolicyEnforcer {
    pub fn new(policy: AccessPolicy, stage: impl Into<String>) -> Self {
        Self {
            policy,
            stage: stage.into(),
        }
    }
}

pub async fn access_policy_middleware(
    State(enforcer): State<Arc<PolicyEnforcer>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let source_endpoint = req
        .extensions()
        .get::<RequestOrigin>()
        .and_then(|origin| origin.endpoint.clone());

    let path = route_path(req.uri().path(), &enforcer.stage);
    let ctx = RequestContext::invoke(
        &enforcer.stage,
        req.method().as_str(),
        path,
        source_endpoint,
    );

    match enforcer.policy.evaluate(&ctx) {
        Decision::Allow => {
            counter!("policy_decisions_total", &[("decision", "allow")]).increment(1);
            Ok(next.run(req).await)
        }
        Decision::Deny => {
            counter!("policy_decisions_total", &[("decision", "deny")]).increment(1);
            tracing::warn!(
                resource = %ctx.resource,
                source_endpoint = ?ctx.source_endpoint,
                "request denied by access policy"
            );
            Err(AppError::Forbidden(anyhow::anyhow!(
                "request origin is not permitted by the access policy"
            )))
        }
    }
}
