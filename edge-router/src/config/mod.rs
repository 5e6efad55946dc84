//! Configuration for edge-router.

use gateway_core::config as core_config;
use gateway_core::error::AppError;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Shared settings; `common.port` is the ops surface (health, readiness,
    /// metrics, target list).
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Address the forwarding listener binds to.
    pub listen_addr: String,
    pub discovery: DiscoveryConfig,
    pub health: HealthConfig,
    pub proxy: ProxyConfig,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// URL returning the entry point's current descriptor. When unset the
    /// router runs on `static_targets` alone.
    pub endpoint_url: Option<String>,
    pub static_targets: Vec<SocketAddr>,
    pub sync_interval_secs: u64,
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    /// Status a probe must return to count as a pass. Backends behind an
    /// authorization gate answer unauthenticated probes with 403, so that is
    /// the default "alive" signature.
    pub expected_status: u16,
    pub path: String,
    pub scheme: String,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upper bound on concurrently handled connections; accepts beyond it
    /// are refused rather than queued.
    pub max_connections: usize,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

impl RouterConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "edge-router".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8443".to_string()),
            discovery: DiscoveryConfig {
                endpoint_url: env::var("ENDPOINT_DISCOVERY_URL").ok(),
                static_targets: match env::var("STATIC_TARGETS") {
                    Ok(raw) => parse_addr_list(&raw)?,
                    Err(_) => Vec::new(),
                },
                sync_interval_secs: parse_env("SYNC_INTERVAL_SECS", 15),
                drain_timeout_secs: parse_env("DRAIN_TIMEOUT_SECS", 30),
            },
            health: HealthConfig {
                interval_secs: parse_env("HEALTH_INTERVAL_SECS", 30),
                timeout_secs: parse_env("HEALTH_TIMEOUT_SECS", 5),
                healthy_threshold: parse_env("HEALTHY_THRESHOLD", 2),
                unhealthy_threshold: parse_env("UNHEALTHY_THRESHOLD", 2),
                expected_status: parse_env("HEALTH_EXPECTED_STATUS", 403),
                path: env::var("HEALTH_PATH").unwrap_or_else(|_| "/".to_string()),
                scheme: env::var("HEALTH_SCHEME").unwrap_or_else(|_| "http".to_string()),
            },
            proxy: ProxyConfig {
                max_connections: parse_env("MAX_CONNECTIONS", 1024),
            },
            tls: match (env::var("TLS_CERT_PATH").ok(), env::var("TLS_KEY_PATH").ok()) {
                (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                    cert_path,
                    key_path,
                }),
                (None, None) => None,
                _ => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "TLS_CERT_PATH and TLS_KEY_PATH must be set together"
                    )))
                }
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

fn parse_addr_list(raw: &str) -> Result<Vec<SocketAddr>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("invalid target address '{s}'"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_targets() {
        let addrs = parse_addr_list("10.2.1.10:443, 10.2.2.10:443").unwrap();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0], "10.2.1.10:443".parse().unwrap());
    }

    #[test]
    fn rejects_malformed_target() {
        assert!(parse_addr_list("not-an-address").is_err());
    }
}
