//! Middleware for the gatekeeper.
//!
//! # Components
//!
//! - `auth` - Auth gate for every request
//! - `claims` - Claim-to-context projection
//! - `heartbeat` - `GET/HEAD /ping`
//! - `http_metrics` - HTTP request metrics
//! - `real_ip` - Client address from proxy headers
//! - `recover` - Panic to 500 conversion
//! - `request_log` - Structured request logging for `TraceLayer`

pub mod auth;
pub mod claims;
pub mod heartbeat;
pub mod http_metrics;
pub mod real_ip;
pub mod recover;
pub mod request_log;

pub use auth::require_auth;
pub use claims::project_claims;
pub use heartbeat::heartbeat;
pub use http_metrics::http_metrics_middleware;
pub use real_ip::real_ip;
pub use recover::handle_panic;
pub use request_log::RequestLogger;
