//! Integration tests for order placement and the dependent stock call.

mod common;

use common::{base_config, spawn_status_stub, spawn_stock_stub, TestApp, API_KEY, STOCK_DOMAIN};
use gateway_core::resolve::RecordSet;
use orders_service::config::FailureMode;
use reqwest::StatusCode;

fn catalog(marker: &str) -> serde_json::Value {
    serde_json::json!({
        "stock": [
            { "stockId": 1, "description": marker }
        ]
    })
}

#[tokio::test]
async fn order_returns_the_stock_catalog_verbatim() {
    let body = catalog("hand soap");
    let stub = spawn_stock_stub(API_KEY, body.clone()).await;
    let app = TestApp::spawn_with(base_config(Some(stub))).await;

    let response = app.post_order().await;

    // 200 also proves the key and the `/prod/stock` path reached the stub;
    // without them it would have answered 403.
    assert_eq!(response.status(), StatusCode::OK);
    let returned: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(returned, body);
}

#[tokio::test]
async fn stock_failure_maps_to_bad_gateway() {
    let stub = spawn_status_stub(StatusCode::INTERNAL_SERVER_ERROR).await;
    let app = TestApp::spawn_with(base_config(Some(stub))).await;

    let response = app.post_order().await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn passthrough_mode_forwards_the_upstream_status() {
    let stub = spawn_status_stub(StatusCode::SERVICE_UNAVAILABLE).await;
    let mut config = base_config(Some(stub));
    config.stock.failure_mode = FailureMode::Passthrough;
    let app = TestApp::spawn_with(config).await;

    let response = app.post_order().await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn missing_stock_record_is_bad_gateway() {
    let app = TestApp::spawn_with(base_config(None)).await;

    let response = app.post_order().await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn repointed_record_reaches_the_new_address_on_the_next_order() {
    let first = spawn_stock_stub(API_KEY, catalog("from-first")).await;
    let second = spawn_stock_stub(API_KEY, catalog("from-second")).await;
    let app = TestApp::spawn_with(base_config(Some(first))).await;

    let response = app.post_order().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["stock"][0]["description"], "from-first");

    // TTL zero: the very next order follows the updated record.
    app.zone.upsert(RecordSet::alias(STOCK_DOMAIN, second));

    let response = app.post_order().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["stock"][0]["description"], "from-second");
}
