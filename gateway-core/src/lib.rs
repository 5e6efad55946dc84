//! gateway-core: Shared control-plane infrastructure for the private stock platform.
//!
//! Everything that keeps traffic inside the trust boundary lives here: the
//! access-policy engine, the API-key identity gate with usage plans, the
//! network-boundary bookkeeping for the private entry point, and the
//! boundary-scoped name resolution. Services compose these through the axum
//! middleware in [`middleware`].
pub mod boundary;
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod observability;
pub mod policy;
pub mod resolve;

pub use axum;
pub use secrecy;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
