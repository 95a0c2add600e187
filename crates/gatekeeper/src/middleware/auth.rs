//! Authentication middleware.
//!
//! Runs the [`AuthGate`] for every request. Verified tokens are stored in
//! the request extensions as a [`RequestContext`]; rejected requests get a
//! 401 and never reach the handler.

use crate::auth::{AuthGate, GateDecision};
use crate::context::RequestContext;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// Authentication middleware that validates bearer tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Public path prefixes pass through without a token
/// - Returns 401 Unauthorized with WWW-Authenticate header if the token is missing or invalid
/// - Continues to the next handler with a `RequestContext` in extensions if the token is valid
#[instrument(skip(gate, req, next), name = "gk.middleware.auth", fields(path = %req.uri().path()))]
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let decision = gate.decide(parts.uri.path(), &parts.headers).await;

    match decision {
        GateDecision::Exempt => next.run(Request::from_parts(parts, body)).await,
        GateDecision::Verified(token) => {
            parts.extensions.insert(RequestContext::verified(token));
            next.run(Request::from_parts(parts, body)).await
        }
        GateDecision::Rejected(e) => {
            tracing::debug!(target: "gk.middleware.auth", error = %e, "Request rejected");
            e.into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::{Jwk, KeyLookup, KeyResolver, VerificationKey};
    use crate::auth::{PublicPaths, TokenVerifier};
    use crate::errors::KeyLoadError;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use gatekeeper_test_utils::crypto_fixtures::TestSigningKey;
    use gatekeeper_test_utils::token_builders::{TestTokenBuilder, TEST_AUDIENCE, TEST_ISSUER};
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedResolver(Arc<VerificationKey>);

    #[async_trait]
    impl KeyResolver for FixedResolver {
        async fn lookup(&self, kid: &str) -> KeyLookup {
            let key = if kid == self.0.kid() {
                Ok(Arc::clone(&self.0))
            } else {
                Err(KeyLoadError::KeyNotFound(kid.to_string()))
            };
            KeyLookup { generation: 0, key }
        }

        async fn reload(&self, _seen: u64) {}
    }

    fn test_app(calls: Arc<AtomicUsize>) -> Router {
        let signing_key = TestSigningKey::primary();
        let jwk: Jwk = serde_json::from_value(signing_key.jwk()).unwrap();
        let key = VerificationKey::from_jwk(signing_key.kid(), &jwk).unwrap();
        let verifier = TokenVerifier::new(
            Arc::new(FixedResolver(Arc::new(key))),
            TEST_AUDIENCE.to_string(),
            TEST_ISSUER.to_string(),
            Duration::from_secs(300),
        );
        let gate = Arc::new(AuthGate::new(
            verifier,
            PublicPaths::new(vec!["/public".to_string()]),
        ));

        let handler = move |ctx: RequestContext| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                match ctx.token() {
                    Some(token) => token.claims().subject().unwrap_or("").to_string(),
                    None => "anonymous".to_string(),
                }
            }
        };

        Router::new()
            .route("/hello", get(handler.clone()))
            .route("/public/info", get(handler))
            .layer(middleware::from_fn_with_state(gate, require_auth))
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler_with_context() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = TestTokenBuilder::new().subject("alice").build();

        let request = HttpRequest::builder()
            .uri("/hello")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app(calls.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "alice");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_token_never_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));

        let request = HttpRequest::builder()
            .uri("/hello")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app(calls.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_public_prefix_reaches_handler_with_invalid_token() {
        let calls = Arc::new(AtomicUsize::new(0));

        let request = HttpRequest::builder()
            .uri("/public/info")
            .header(header::AUTHORIZATION, "Bearer garbage")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app(calls.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "anonymous");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_audience_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = TestTokenBuilder::new()
            .audience("https://someone-else.example.com")
            .build();

        let request = HttpRequest::builder()
            .uri("/hello")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app(calls.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_string(response).await.contains("invalid audience"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
