//! orders-service: places orders against the private stock API.
//!
//! The service carries no gates of its own; it is the caller side of the
//! control plane. Each order resolves the stock domain inside the network
//! boundary, calls the private API through the edge router with the
//! pre-issued key, and hands the catalog back to the customer.

pub mod config;
pub mod handlers;
pub mod services;
pub mod startup;

use crate::config::FailureMode;
use crate::services::StockClient;
use std::sync::Arc;

/// Shared state for the order handlers.
#[derive(Clone)]
pub struct AppState {
    pub stock: Arc<StockClient>,
    pub failure_mode: FailureMode,
}
