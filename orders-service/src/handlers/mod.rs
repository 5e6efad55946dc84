use crate::config::FailureMode;
use crate::services::{get_metrics, record_order, StockError};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::error::AppError;
use serde_json::json;

/// Liveness endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "orders-service"
    }))
}

/// Metrics endpoint for Prometheus scraping.
pub async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// `POST /orders`. Placing an order needs the current catalog, so the
/// handler calls the private stock API and answers with whatever it served.
pub async fn create_order(
    State(state): State<AppState>,
    order: Option<Json<serde_json::Value>>,
) -> Result<Response, AppError> {
    if let Some(Json(order)) = &order {
        tracing::debug!(order = %order, "placing order");
    }

    match state.stock.fetch_stock().await {
        Ok(stock) => {
            record_order("created");
            Ok((StatusCode::OK, Json(stock)).into_response())
        }
        Err(StockError::Upstream { status, body })
            if state.failure_mode == FailureMode::Passthrough =>
        {
            record_order("passthrough");
            Ok((status, body).into_response())
        }
        Err(e) => {
            record_order("stock-unavailable");
            tracing::warn!(error = %e, "order failed, stock api unavailable");
            Err(AppError::BadGateway(e.to_string()))
        }
    }
}
