//! Configuration module for stock-service.

use gateway_core::config as core_config;
use gateway_core::error::AppError;
use gateway_core::identity::{QuotaLimit, QuotaPeriod};
use ipnet::IpNet;
use secrecy::Secret;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct StockConfig {
    /// Shared settings; `common.port` is the ops surface (health, readiness,
    /// metrics, descriptor).
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Deployment stage; request paths are served under `/{stage}`.
    pub stage: String,
    pub boundary: BoundaryConfig,
    pub endpoint: EndpointConfig,
    /// Address of the direct service listener. Requests arriving here carry
    /// no entry-point provenance, so the access policy denies them.
    pub service_listen_addr: String,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    pub network_id: String,
    pub cidr: IpNet,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// The one entry point the access policy sanctions.
    pub endpoint_id: String,
    pub listeners: Vec<ListenerConfig>,
}

/// One listener bound on behalf of an entry point. Requests accepted here are
/// stamped with `endpoint_id` as their provenance.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub endpoint_id: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub key_name: String,
    pub customer_id: String,
    /// The key value callers present in `x-api-key`. Never logged.
    pub api_key: Secret<String>,
    pub enabled: bool,
    pub plan: PlanConfig,
}

#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub name: String,
    pub rate_per_second: u32,
    pub burst: u32,
    /// Requests per quota period. `0` disables the quota.
    pub quota_limit: u64,
    pub quota_period: QuotaPeriod,
    /// Per-method throttle for `GET /stock`, replacing the plan-level rate
    /// on that route.
    pub stock_rate_per_second: u32,
    pub stock_burst: u32,
}

impl PlanConfig {
    pub fn quota(&self) -> Option<QuotaLimit> {
        if self.quota_limit == 0 {
            return None;
        }
        Some(QuotaLimit {
            limit: self.quota_limit,
            period: self.quota_period,
        })
    }
}

impl StockConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let cidr: IpNet = env::var("BOUNDARY_CIDR")
            .unwrap_or_else(|_| "10.2.0.0/16".to_string())
            .parse()
            .map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("BOUNDARY_CIDR is not a valid CIDR block"))
            })?;

        let endpoint_id =
            env::var("ENDPOINT_ID").unwrap_or_else(|_| "vpce-0f1e2d3c4b5a".to_string());
        let listeners = env::var("ENDPOINT_LISTEN_ADDRS")
            .unwrap_or_else(|_| "0.0.0.0:8443".to_string());
        let listeners = parse_addr_list(&listeners)?
            .into_iter()
            .map(|addr| ListenerConfig {
                endpoint_id: endpoint_id.clone(),
                addr,
            })
            .collect();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "stock-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            stage: env::var("STAGE").unwrap_or_else(|_| "prod".to_string()),
            boundary: BoundaryConfig {
                network_id: env::var("NETWORK_ID").unwrap_or_else(|_| "net-stock".to_string()),
                cidr,
            },
            endpoint: EndpointConfig {
                endpoint_id,
                listeners,
            },
            service_listen_addr: env::var("SERVICE_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            identity: IdentityConfig {
                key_name: env::var("API_KEY_NAME")
                    .unwrap_or_else(|_| "orders-rate-limited-api-key".to_string()),
                customer_id: env::var("API_KEY_CUSTOMER")
                    .unwrap_or_else(|_| "orders-api".to_string()),
                api_key: Secret::new(
                    env::var("API_KEY").unwrap_or_else(|_| "super-secret-api-key".to_string()),
                ),
                enabled: parse_env("API_KEY_ENABLED", true),
                plan: PlanConfig {
                    name: env::var("USAGE_PLAN_NAME")
                        .unwrap_or_else(|_| "orders-usage-plan".to_string()),
                    rate_per_second: parse_env("PLAN_RATE_LIMIT", 10),
                    burst: parse_env("PLAN_BURST_LIMIT", 2),
                    quota_limit: parse_env("PLAN_QUOTA_LIMIT", 500),
                    quota_period: env::var("PLAN_QUOTA_PERIOD")
                        .ok()
                        .and_then(|s| parse_period(&s))
                        .unwrap_or(QuotaPeriod::Day),
                    stock_rate_per_second: parse_env("STOCK_RATE_LIMIT", 10),
                    stock_burst: parse_env("STOCK_BURST_LIMIT", 2),
                },
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

fn parse_period(raw: &str) -> Option<QuotaPeriod> {
    match raw.to_ascii_lowercase().as_str() {
        "day" => Some(QuotaPeriod::Day),
        "week" => Some(QuotaPeriod::Week),
        "month" => Some(QuotaPeriod::Month),
        _ => None,
    }
}

fn parse_addr_list(raw: &str) -> Result<Vec<SocketAddr>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("invalid listener address '{s}'"))
            })
        })
        .collect()
}
