pub mod metrics;
pub mod stock_client;

pub use metrics::{
    get_metrics, init_metrics, record_order, record_stock_call, STOCK_CALL_DURATION,
};
pub use stock_client::{StockClient, StockError};
