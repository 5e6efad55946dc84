//! edge-router: TLS-terminating internal load balancer.
//!
//! Forwards accepted connections to healthy backend targets and keeps the
//! target set synchronized with the private entry point's addresses. The
//! router never looks inside a request; authorization happens downstream at
//! the services it fronts.

pub mod config;
pub mod health;
pub mod proxy;
pub mod services;
pub mod startup;
pub mod sync;
pub mod targets;
pub mod tls;
