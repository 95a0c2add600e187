//! HTTP request handlers for the gatekeeper binary and diagnostics.

pub mod hello;
pub mod me;
pub mod metrics;

pub use hello::{hello_public, hello_root};
pub use me::get_me;
pub use metrics::metrics_handler;
