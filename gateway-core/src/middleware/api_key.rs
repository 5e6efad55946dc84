use crate::error::AppError;
use crate::identity::{IdentityGate, Rejection, RouteKey};
use crate::middleware::route_path;
use axum::extract::{Request, State};
use axum::{middleware::Next, response::Response};
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state for the key gate: the gate itself plus the stage prefix to
/// strip when matching per-method throttle overrides.
pub struct KeyGate {
    gate: Arc<IdentityGate>,
    stage: String,
}

impl KeyGate {
    pub fn new(gate: Arc<IdentityGate>, stage: impl Into<String>) -> Self {
        Self {
            gate,
            stage: stage.into(),
        }
    }
}

/// Resolves `x-api-key` to an identity and applies the identity's usage
/// plan. Successful requests carry the [`crate::identity::Authorized`]
/// outcome in their extensions for handlers and logging downstream.
pub async fn api_key_middleware(
    State(state): State<Arc<KeyGate>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let api_key = match api_key {
        Some(key) => key,
        None => {
            counter!("authorizations_total", &[("outcome", "missing-key")]).increment(1);
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "missing {API_KEY_HEADER} header"
            )));
        }
    };

    let path = route_path(req.uri().path(), &state.stage);
    let route = RouteKey::new(req.method().as_str(), path);

    match state.gate.authorize(api_key, &route, Utc::now()) {
        Ok(authorized) => {
            counter!("authorizations_total", &[("outcome", "ok")]).increment(1);
            req.extensions_mut().insert(authorized);
            Ok(next.run(req).await)
        }
        Err(rejection) => {
            counter!("authorizations_total", &[("outcome", rejection.reason())]).increment(1);
            tracing::warn!(route = %route, reason = rejection.reason(), "request rejected by key gate");
            Err(match rejection {
                Rejection::InvalidKey => {
                    AppError::Forbidden(anyhow::anyhow!("invalid or disabled api key"))
                }
                Rejection::Throttled { retry_after } => AppError::TooManyRequests(
                    "rate limit exceeded, slow down".to_string(),
                    Some(retry_after.as_secs()),
                ),
                Rejection::QuotaExceeded { resets_at } => {
                    let retry_after = (resets_at - Utc::now()).num_seconds().max(0) as u64;
                    AppError::TooManyRequests(
                        "usage quota exhausted for this period".to_string(),
                        Some(retry_after),
                    )
                }
            })
        }
    }
}
