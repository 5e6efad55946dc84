//! stock-service: the private stock API.
//!
//! Exposes `GET /{stage}/stock` behind three gates: boundary ingress rules on
//! the entry point listeners, the access policy on request provenance, and
//! the API-key identity gate with the usage plan's throttle and quota. An
//! ungated ops listener serves health, metrics and the entry point
//! descriptor the edge router discovers targets from.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

use models::StockItem;

/// Shared state for the stock handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: std::sync::Arc<Vec<StockItem>>,
}

impl AppState {
    pub fn new(catalog: Vec<StockItem>) -> Self {
        Self {
            catalog: std::sync::Arc::new(catalog),
        }
    }
}
