//! Prometheus metrics for orders-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, CounterVec, Encoder, Histogram, TextEncoder,
};

/// Counter for placed orders by outcome.
pub static ORDERS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "orders_requests_total",
        "Order requests, by outcome",
        &["outcome"]
    )
    .expect("Failed to register ORDERS")
});

/// Counter for dependent stock calls by outcome.
pub static STOCK_CALLS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "orders_stock_calls_total",
        "Dependent stock API calls, by outcome",
        &["outcome"]
    )
    .expect("Failed to register STOCK_CALLS")
});

/// Histogram for dependent stock call duration.
pub static STOCK_CALL_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "orders_stock_call_duration_seconds",
        "Dependent stock API call duration in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register STOCK_CALL_DURATION")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ORDERS);
    Lazy::force(&STOCK_CALLS);
    Lazy::force(&STOCK_CALL_DURATION);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record an order request.
pub fn record_order(outcome: &str) {
    ORDERS.with_label_values(&[outcome]).inc();
}

/// Record a dependent stock call.
pub fn record_stock_call(outcome: &str) {
    STOCK_CALLS.with_label_values(&[outcome]).inc();
}
