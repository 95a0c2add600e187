//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! This endpoint is mounted outside the auth gate so Prometheus can scrape
//! it. Metrics carry no claim values or tokens, only bounded labels.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns 200 OK with Prometheus text format:
/// ```text
/// # TYPE gk_http_requests_total counter
/// gk_http_requests_total{method="GET",status_code="200"} 42
/// ```
#[tracing::instrument(skip_all, name = "gk.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
