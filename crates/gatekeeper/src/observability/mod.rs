//! Observability: Prometheus metrics for HTTP traffic and token validation.

pub mod metrics;
