//! Structured request logging.
//!
//! [`RequestLogger`] plugs into `tower_http::trace::TraceLayer` as span
//! maker, request hook and response hook. Each request gets a span carrying
//! the request metadata and two events, "request started" and
//! "request complete".

use crate::middleware::real_ip::client_addr;
use axum::body::HttpBody;
use axum::http::{header, HeaderMap, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::{MakeSpan, OnRequest, OnResponse};
use tracing::Span;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Span maker and request/response hooks for `TraceLayer`.
#[derive(Debug, Clone, Default)]
pub struct RequestLogger {
    /// Static `LOG_FIELDS`, pre-rendered as `k=v,k2=v2`.
    fields: Arc<str>,
}

impl RequestLogger {
    pub fn new(fields: &[(String, String)]) -> Self {
        let rendered = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        Self {
            fields: Arc::from(rendered),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn scheme<B>(request: &Request<B>) -> &str {
    request
        .uri()
        .scheme_str()
        .or_else(|| {
            request
                .headers()
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
        })
        .unwrap_or("http")
}

impl<B> MakeSpan<B> for RequestLogger {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let headers = request.headers();
        let scheme = scheme(request);
        let host = request
            .uri()
            .host()
            .unwrap_or_else(|| header_str(headers, header::HOST.as_str()));
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let remote_addr = client_addr(request.extensions()).unwrap_or_default();

        tracing::info_span!(
            target: "gk.http",
            "request",
            fields = %self.fields,
            req_id = %header_str(headers, REQUEST_ID_HEADER),
            http_scheme = %scheme,
            http_proto = ?request.version(),
            http_method = %request.method(),
            remote_addr = %remote_addr,
            user_agent = %header_str(headers, header::USER_AGENT.as_str()),
            uri = %format!("{scheme}://{host}{path}"),
        )
    }
}

impl<B> OnRequest<B> for RequestLogger {
    fn on_request(&mut self, _request: &Request<B>, _span: &Span) {
        tracing::info!(target: "gk.http", "request started");
    }
}

impl<B: HttpBody> OnResponse<B> for RequestLogger {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        let resp_bytes_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .or_else(|| response.body().size_hint().exact())
            .unwrap_or(0);
        let resp_elapsed_ms = latency.as_secs_f64() * 1000.0;

        tracing::info!(
            target: "gk.http",
            resp_status = response.status().as_u16(),
            resp_bytes_length,
            resp_elapsed_ms,
            "request complete"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;
    use tower_http::trace::TraceLayer;

    #[test]
    fn test_fields_are_rendered_in_order() {
        let logger = RequestLogger::new(&[
            ("service".to_string(), "api".to_string()),
            ("env".to_string(), "dev".to_string()),
        ]);
        assert_eq!(&*logger.fields, "service=api,env=dev");
        assert_eq!(&*RequestLogger::default().fields, "");
    }

    #[test]
    fn test_scheme_prefers_forwarded_proto() {
        let plain = Request::builder().uri("/x").body(()).unwrap();
        assert_eq!(scheme(&plain), "http");

        let forwarded = Request::builder()
            .uri("/x")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap();
        assert_eq!(scheme(&forwarded), "https");
    }

    #[tokio::test]
    async fn test_trace_layer_with_logger_serves_requests() {
        let logger = RequestLogger::new(&[("service".to_string(), "test".to_string())]);
        let app = Router::new().route("/", get(|| async { "hi" })).layer(
            TraceLayer::new_for_http()
                .make_span_with(logger.clone())
                .on_request(logger.clone())
                .on_response(logger)
                .on_failure(()),
        );

        let request = Request::builder()
            .uri("/")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
