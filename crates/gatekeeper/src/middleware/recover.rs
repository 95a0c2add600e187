//! Panic recovery for handlers.
//!
//! Used with `tower_http::catch_panic::CatchPanicLayer::custom`. The panic
//! message is logged; the client receives a generic 500.

use crate::errors::internal_error_response;
use axum::response::Response;
use std::any::Any;

pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };

    tracing::error!(target: "gk.http", panic = %message, "Handler panicked");
    internal_error_response()
}
