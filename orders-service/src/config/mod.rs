//! Configuration module for orders-service.

use gateway_core::config as core_config;
use gateway_core::error::AppError;
use secrecy::Secret;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct OrdersConfig {
    /// Shared settings; `common.port` is where the public API binds.
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub stock: StockApiConfig,
    pub resolver: ResolverConfig,
}

/// How the dependent stock call reaches the private API.
#[derive(Debug, Clone)]
pub struct StockApiConfig {
    /// Internal name of the stock API, resolved inside the boundary.
    pub domain: String,
    pub scheme: String,
    /// Stage segment of the invoke path, `/{base_path}/stock`.
    pub base_path: String,
    /// The key issued for the orders identity. Never logged.
    pub api_key: Secret<String>,
    pub timeout_secs: u64,
    /// Accept the router's certificate without a trust chain. Off unless the
    /// deployment runs its own CA.
    pub accept_invalid_certs: bool,
    pub failure_mode: FailureMode,
}

/// What an order reports when the stock call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Answer 502 regardless of what the stock API said.
    BadGateway,
    /// Forward the upstream status and body verbatim.
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub network_id: String,
    /// Where the stock record points, normally the edge router inside the
    /// boundary. Without it orders fail until a record is added.
    pub target_addr: Option<SocketAddr>,
    /// TTL for the stock record. Zero re-resolves on every order.
    pub ttl_secs: u64,
}

impl OrdersConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let target_addr = match env::var("STOCK_TARGET_ADDR") {
            Ok(raw) => Some(raw.parse().map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!(
                    "STOCK_TARGET_ADDR is not a valid socket address"
                ))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "orders-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            stock: StockApiConfig {
                domain: env::var("STOCK_DOMAIN")
                    .unwrap_or_else(|_| "stock.internal".to_string()),
                scheme: env::var("STOCK_SCHEME").unwrap_or_else(|_| "https".to_string()),
                base_path: env::var("STOCK_BASE_PATH").unwrap_or_else(|_| "prod".to_string()),
                api_key: Secret::new(
                    env::var("STOCK_API_KEY")
                        .unwrap_or_else(|_| "super-secret-api-key".to_string()),
                ),
                timeout_secs: parse_env("STOCK_TIMEOUT_SECS", 10),
                accept_invalid_certs: parse_env("STOCK_ACCEPT_INVALID_CERTS", false),
                failure_mode: env::var("STOCK_FAILURE_MODE")
                    .ok()
                    .and_then(|s| parse_failure_mode(&s))
                    .unwrap_or(FailureMode::BadGateway),
            },
            resolver: ResolverConfig {
                network_id: env::var("NETWORK_ID").unwrap_or_else(|_| "net-stock".to_string()),
                target_addr,
                ttl_secs: parse_env("STOCK_RECORD_TTL_SECS", 0),
            },
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn parse_failure_mode(raw: &str) -> Option<FailureMode> {
    match raw.to_ascii_lowercase().as_str() {
        "bad-gateway" | "bad_gateway" => Some(FailureMode::BadGateway),
        "passthrough" => Some(FailureMode::Passthrough),
        _ => None,
    }
}
