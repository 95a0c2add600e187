//! Gatekeeper Library
//!
//! An HTTP server bootstrap that puts OIDC bearer-token authentication in
//! front of application routes:
//!
//! - Key loading from a remote JWKS endpoint, cached until rotation
//! - RS256 token verification with audience, issuer and time checks
//! - An auth gate that exempts configured public path prefixes
//! - Projection of verified claims into a per-request context
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> server.rs -> middleware/*.rs -> auth/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key loader, token verifier, auth gate, claims projector
//! - `config` - Service configuration from environment
//! - `context` - Per-request context extractor
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - Built-in and demo HTTP handlers
//! - `middleware` - Request pipeline layers
//! - `observability` - Prometheus metrics
//! - `routes` - Documented route registration
//! - `server` - Server bootstrap and graceful shutdown

pub mod auth;
pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;

pub use config::Config;
pub use context::RequestContext;
pub use routes::Routes;
pub use server::GateServer;
