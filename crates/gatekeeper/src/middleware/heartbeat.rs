//! Liveness endpoint answered before routing and authentication.

use axum::{
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Path answered by [`heartbeat`].
pub const HEARTBEAT_PATH: &str = "/ping";

/// Responds `200 "."` to `GET`/`HEAD /ping`; everything else passes through.
pub async fn heartbeat(req: Request, next: Next) -> Response {
    let is_probe = matches!(*req.method(), Method::GET | Method::HEAD);
    if is_probe && req.uri().path() == HEARTBEAT_PATH {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            ".",
        )
            .into_response();
    }
    next.run(req).await
}
