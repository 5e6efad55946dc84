//! Prometheus metrics for stock-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_gauge, CounterVec, Encoder, IntGauge, TextEncoder,
};

/// Counter for stock catalog requests by outcome.
pub static STOCK_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stock_requests_total",
        "Stock catalog requests, by outcome",
        &["outcome"]
    )
    .expect("Failed to register STOCK_REQUESTS")
});

/// Gauge for the catalog size.
pub static CATALOG_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("stock_catalog_items", "Items in the stock catalog")
        .expect("Failed to register CATALOG_SIZE")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&STOCK_REQUESTS);
    Lazy::force(&CATALOG_SIZE);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a stock catalog request.
pub fn record_stock_request(outcome: &str) {
    STOCK_REQUESTS.with_label_values(&[outcome]).inc();
}
