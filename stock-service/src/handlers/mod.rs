use crate::models::StockResponse;
use crate::services::record_stock_request;
use crate::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use gateway_core::identity::Authorized;

/// `GET /stock`. By the time this runs the request has passed the ingress
/// rules, the access policy, and the key gate.
pub async fn get_stock(
    State(state): State<AppState>,
    authorized: Option<Extension<Authorized>>,
) -> Json<StockResponse> {
    if let Some(Extension(authorized)) = authorized {
        tracing::debug!(
            identity = %authorized.identity_id,
            plan = %authorized.plan_id,
            "serving stock catalog"
        );
    }
    record_stock_request("served");

    Json(StockResponse {
        stock: state.catalog.as_ref().clone(),
    })
}
