//! Claims projection middleware.
//!
//! Applies the configured [`ClaimMapping`] to the request context left by
//! the auth middleware. A missing claim rejects the request with 401.

use crate::auth::ClaimMapping;
use crate::context::RequestContext;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

pub async fn project_claims(
    State(mapping): State<Arc<ClaimMapping>>,
    mut req: Request,
    next: Next,
) -> Response {
    let projected = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| mapping.project(ctx));

    match projected {
        None => next.run(req).await,
        Some(Ok(ctx)) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Some(Err(e)) => {
            tracing::debug!(target: "gk.middleware.claims", error = %e, "Claim projection failed");
            e.into_response()
        }
    }
}
