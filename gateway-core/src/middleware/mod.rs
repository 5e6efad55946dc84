pub mod access;
pub mod api_key;
pub mod ingress;
pub mod metrics;
pub mod tracing;

pub use access::{access_policy_middleware, PolicyEnforcer};
pub use api_key::{api_key_middleware, KeyGate, API_KEY_HEADER};
pub use ingress::{boundary_ingress_middleware, origin_middleware, IngressGuard, RequestOrigin};
pub use metrics::metrics_middleware;
pub use tracing::{request_id_middleware, REQUEST_ID_HEADER};

/// Strip the stage prefix from a request path, so `/prod/stock` and `/stock`
/// both gate as the `/stock` route.
pub(crate) fn route_path<'a>(path: &'a str, stage: &str) -> &'a str {
    let prefix_len = stage.len() + 1;
    if path.len() > prefix_len
        && path.as_bytes()[0] == b'/'
        && path[1..].starts_with(stage)
        && path.as_bytes()[prefix_len] == b'/'
    {
        &path[prefix_len..]
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::route_path;

    #[test]
    fn strips_stage_prefix_only_when_present() {
        assert_eq!(route_path("/prod/stock", "prod"), "/stock");
        assert_eq!(route_path("/stock", "prod"), "/stock");
        assert_eq!(route_path("/production/stock", "prod"), "/production/stock");
        assert_eq!(route_path("/prod", "prod"), "/prod");
    }
}
