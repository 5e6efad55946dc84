//! Integration tests for request provenance: which listener a request came
//! through decides whether the access policy lets it reach the key gate.

mod common;

use common::{TestApp, API_KEY};
use reqwest::StatusCode;

#[tokio::test]
async fn stock_via_the_sanctioned_entry_point_is_served() {
    let app = TestApp::spawn().await;

    let response = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert!(!body["stock"].as_array().expect("stock array").is_empty());
}

#[tokio::test]
async fn stock_via_an_unsanctioned_entry_point_is_forbidden() {
    let app = TestApp::spawn().await;

    // Same network, same valid key; only the entry point differs.
    let response = app.get_stock(app.rogue_addr, Some(API_KEY)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stock_via_the_direct_service_listener_is_forbidden() {
    let app = TestApp::spawn().await;

    // No entry point stamped its provenance, so the deny condition holds.
    let response = app.get_stock(app.service_addr, Some(API_KEY)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unauthenticated_probes_get_403_on_every_listener() {
    let app = TestApp::spawn().await;

    // The router's health checker reads 403 as "alive"; a 404 here would
    // make a healthy backend look dead.
    for via in [app.sanctioned_addr, app.rogue_addr, app.service_addr] {
        let response = app.get(via, "/", None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "listener {via}");
    }
}
