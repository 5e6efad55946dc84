//! Prometheus metrics for edge-router.

use crate::targets::HealthState;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_gauge, register_int_gauge_vec, CounterVec, Encoder,
    IntGauge, IntGaugeVec, TextEncoder,
};

/// Counter for accepted connections by outcome.
pub static CONNECTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "router_connections_total",
        "Connections handled by the proxy, by outcome",
        &["outcome"]
    )
    .expect("Failed to register CONNECTIONS")
});

/// Gauge of connections currently being forwarded.
pub static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "router_active_connections",
        "Connections currently being forwarded"
    )
    .expect("Failed to register ACTIVE_CONNECTIONS")
});

/// Counter for health probes by result.
pub static HEALTH_PROBES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "router_health_probes_total",
        "Health probes issued, by result",
        &["result"]
    )
    .expect("Failed to register HEALTH_PROBES")
});

/// Counter for health state transitions.
pub static HEALTH_TRANSITIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "router_health_transitions_total",
        "Target health state transitions",
        &["state"]
    )
    .expect("Failed to register HEALTH_TRANSITIONS")
});

/// Counter for reconciliation cycles by outcome.
pub static RECONCILE_CYCLES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "router_reconcile_cycles_total",
        "Target synchronization cycles, by outcome",
        &["outcome"]
    )
    .expect("Failed to register RECONCILE_CYCLES")
});

/// Gauges for target counts by state.
pub static TARGETS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "router_targets",
        "Targets currently tracked, by state",
        &["state"]
    )
    .expect("Failed to register TARGETS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&CONNECTIONS);
    Lazy::force(&ACTIVE_CONNECTIONS);
    Lazy::force(&HEALTH_PROBES);
    Lazy::force(&HEALTH_TRANSITIONS);
    Lazy::force(&RECONCILE_CYCLES);
    Lazy::force(&TARGETS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a proxy connection outcome.
pub fn record_connection(outcome: &str) {
    CONNECTIONS.with_label_values(&[outcome]).inc();
}

/// Record a health probe result.
pub fn record_health_probe(pass: bool) {
    let result = if pass { "pass" } else { "fail" };
    HEALTH_PROBES.with_label_values(&[result]).inc();
}

/// Record a target health transition.
pub fn record_health_transition(state: HealthState) {
    let label = match state {
        HealthState::Initial => "initial",
        HealthState::Healthy => "healthy",
        HealthState::Unhealthy => "unhealthy",
    };
    HEALTH_TRANSITIONS.with_label_values(&[label]).inc();
}

/// Record a reconciliation cycle outcome.
pub fn record_reconcile_cycle(outcome: &str) {
    RECONCILE_CYCLES.with_label_values(&[outcome]).inc();
}

/// Update the target gauges after a reconciliation pass.
pub fn set_target_gauges(total: i64, healthy: i64, draining: i64) {
    TARGETS.with_label_values(&["total"]).set(total);
    TARGETS.with_label_values(&["healthy"]).set(healthy);
    TARGETS.with_label_values(&["draining"]).set(draining);
}
