//! HTTP metrics middleware for capturing all request/response metrics
//!
//! Applied outermost so that heartbeat answers, auth rejections, timeouts,
//! recovered panics and 404s are all counted.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Middleware that records HTTP request metrics for all responses
///
/// This captures:
/// - Request method
/// - Response status code
/// - Request duration
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;

    record_http_request(&method, response.status().as_u16(), start.elapsed());

    response
}
