//! Health checker integration tests against stub backends.

mod common;

use axum::http::StatusCode;
use edge_router::config::HealthConfig;
use edge_router::health::HealthChecker;
use edge_router::targets::{HealthState, TargetGroup};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn health_config() -> HealthConfig {
    HealthConfig {
        interval_secs: 30,
        timeout_secs: 1,
        healthy_threshold: 2,
        unhealthy_threshold: 2,
        expected_status: 403,
        path: "/".to_string(),
        scheme: "http".to_string(),
    }
}

#[tokio::test]
async fn forbidden_response_counts_as_alive() {
    common::init_tracing();
    let backend = common::spawn_http_backend(StatusCode::FORBIDDEN).await;

    let group = Arc::new(TargetGroup::new(Duration::from_secs(30)));
    group.sync(&[backend], std::time::Instant::now());
    let checker = HealthChecker::new(group.clone(), health_config()).unwrap();
    let target = group.targets().remove(0);

    checker.probe_target(target.clone()).await;
    assert_eq!(target.health(), HealthState::Initial);

    checker.probe_target(target.clone()).await;
    assert_eq!(target.health(), HealthState::Healthy);
}

#[tokio::test]
async fn unexpected_status_is_a_failed_probe() {
    common::init_tracing();
    let backend = common::spawn_http_backend(StatusCode::OK).await;

    let group = Arc::new(TargetGroup::new(Duration::from_secs(30)));
    group.sync(&[backend], std::time::Instant::now());
    let checker = HealthChecker::new(group.clone(), health_config()).unwrap();
    let target = group.targets().remove(0);

    checker.probe_target(target.clone()).await;
    checker.probe_target(target.clone()).await;
    assert_eq!(target.health(), HealthState::Unhealthy);
}

#[tokio::test]
async fn unreachable_target_goes_unhealthy() {
    common::init_tracing();
    // Grab a port that nothing listens on once the listener drops.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let group = Arc::new(TargetGroup::new(Duration::from_secs(30)));
    group.sync(&[dead], std::time::Instant::now());
    let checker = HealthChecker::new(group.clone(), health_config()).unwrap();
    let target = group.targets().remove(0);

    checker.probe_target(target.clone()).await;
    checker.probe_target(target.clone()).await;
    assert_eq!(target.health(), HealthState::Unhealthy);
}

#[tokio::test]
async fn probe_all_covers_every_target() {
    common::init_tracing();
    let alive = common::spawn_http_backend(StatusCode::FORBIDDEN).await;
    let wrong = common::spawn_http_backend(StatusCode::NOT_FOUND).await;

    let group = Arc::new(TargetGroup::new(Duration::from_secs(30)));
    group.sync(&[alive, wrong], std::time::Instant::now());
    let checker = HealthChecker::new(group.clone(), health_config()).unwrap();

    checker.probe_all().await;
    checker.probe_all().await;

    for target in group.targets() {
        let expected = if target.addr() == alive {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };
        assert_eq!(target.health(), expected, "target {}", target.addr());
        assert!(target.last_checked().is_some());
    }
}
