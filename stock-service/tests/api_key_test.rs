//! Integration tests for the API-key gate: key matching, the token-bucket
//! throttle, the per-method override, and the fixed-window quota.

mod common;

use common::{base_config, TestApp, API_KEY, STAGE};
use reqwest::StatusCode;

#[tokio::test]
async fn stock_requires_an_api_key() {
    let app = TestApp::spawn().await;

    let response = app.get_stock(app.sanctioned_addr, None).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn wrong_api_key_is_forbidden() {
    let app = TestApp::spawn().await;

    let response = app
        .get_stock(app.sanctioned_addr, Some("not-the-key"))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn disabled_key_is_forbidden_even_when_correct() {
    let mut config = base_config();
    config.identity.enabled = false;
    let app = TestApp::spawn_with(config).await;

    let response = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn burst_of_two_then_throttled_with_retry_after() {
    let mut config = base_config();
    // Sustained rate of 1/s so the bucket cannot refill between requests.
    config.identity.plan.stock_rate_per_second = 1;
    config.identity.plan.stock_burst = 2;
    let app = TestApp::spawn_with(config).await;

    let first = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;
    let second = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;
    let third = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = third
        .headers()
        .get("retry-after")
        .expect("429 carries a retry-after header");
    retry_after
        .to_str()
        .unwrap()
        .parse::<u64>()
        .expect("retry-after is whole seconds");
}

#[tokio::test]
async fn quota_exhaustion_returns_429_until_the_window_resets() {
    let mut config = base_config();
    // Throttle limits high enough that only the quota can say no.
    config.identity.plan.rate_per_second = 100;
    config.identity.plan.burst = 100;
    config.identity.plan.stock_rate_per_second = 100;
    config.identity.plan.stock_burst = 100;
    config.identity.plan.quota_limit = 3;
    let app = TestApp::spawn_with(config).await;

    for _ in 0..3 {
        let response = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let exhausted = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;
    assert_eq!(exhausted.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(exhausted.headers().get("retry-after").is_some());

    // Still refused; the window only resets on the calendar boundary.
    let again = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;
    assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn stock_override_throttles_independently_of_the_plan_bucket() {
    let mut config = base_config();
    config.identity.plan.rate_per_second = 1;
    config.identity.plan.burst = 1;
    config.identity.plan.stock_rate_per_second = 1;
    config.identity.plan.stock_burst = 3;
    let app = TestApp::spawn_with(config).await;

    for _ in 0..3 {
        let response = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let throttled = app.get_stock(app.sanctioned_addr, Some(API_KEY)).await;
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

    // The plan-level bucket is untouched, so another route still admits one
    // request (404: nothing is mounted there).
    let other = app
        .get(app.sanctioned_addr, &format!("/{STAGE}/warehouse"), Some(API_KEY))
        .await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}
