//! Authentication integration tests.
//!
//! Tests JWT validation and protected endpoints against a real server with a
//! mocked JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use gatekeeper::Routes;
use gatekeeper_test_utils::{
    jwks_document, TestGateServer, TestSigningKey, TestTokenBuilder, TEST_AUDIENCE,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const JWKS_PATH: &str = "/.well-known/jwks.json";

fn counting_routes(calls: Arc<AtomicUsize>) -> Routes {
    Routes::new().get("/hello", move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            "Hello root"
        }
    })
}

async fn get_with_token(server: &TestGateServer, path: &str, token: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{}{}", server.url(), path))
        .bearer_auth(token)
        .send()
        .await
        .expect("request should be sent")
}

async fn error_message(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.expect("error body should be JSON");
    body["error"].as_str().unwrap_or_default().to_string()
}

// =============================================================================
// Auth gate
// =============================================================================

/// Test that a valid token reaches the handler.
#[tokio::test]
async fn test_hello_with_valid_token() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let token = TestTokenBuilder::new().build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "Hello root");

    Ok(())
}

/// Test that a missing token is rejected before the handler runs.
#[tokio::test]
async fn test_missing_token_never_reaches_handler() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let server = TestGateServer::builder()
        .routes(counting_routes(Arc::clone(&calls)))
        .spawn()
        .await?;

    let response = reqwest::get(format!("{}/hello", server.url())).await?;

    assert_eq!(response.status(), 401);
    let www_auth = response.headers().get("www-authenticate");
    assert!(www_auth.is_some(), "Should include WWW-Authenticate header");
    assert_eq!(
        error_message(response).await,
        "required authorization token not found"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(server.jwks_fetches().await, 0);

    Ok(())
}

/// Test that a non-Bearer Authorization header is rejected.
#[tokio::test]
async fn test_invalid_auth_format_rejected() -> Result<()> {
    let server = TestGateServer::spawn().await?;

    let response = reqwest::Client::new()
        .get(format!("{}/hello", server.url()))
        .header("Authorization", "Basic abc123")
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    assert_eq!(
        error_message(response).await,
        "Authorization header format must be Bearer {token}"
    );

    Ok(())
}

/// Test that public prefixes bypass authentication entirely.
#[tokio::test]
async fn test_public_prefix_bypasses_auth() -> Result<()> {
    let server = TestGateServer::builder()
        .env("PUBLIC_URL_PREFIXES", "/public")
        .spawn()
        .await?;

    let response = reqwest::get(format!("{}/public", server.url())).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "Hello public");

    // A garbage token on a public path is never inspected
    let response = get_with_token(&server, "/public", "not-a-jwt").await;
    assert_eq!(response.status(), 200);

    let response = reqwest::get(format!("{}/hello", server.url())).await?;
    assert_eq!(response.status(), 401);

    assert_eq!(server.jwks_fetches().await, 0);

    Ok(())
}

/// Test that unknown paths are still gated.
#[tokio::test]
async fn test_unknown_path_requires_auth() -> Result<()> {
    let server = TestGateServer::spawn().await?;

    let response = reqwest::get(format!("{}/nowhere", server.url())).await?;
    assert_eq!(response.status(), 401);

    let token = TestTokenBuilder::new().build();
    let response = get_with_token(&server, "/nowhere", &token).await;
    assert_eq!(response.status(), 404);

    Ok(())
}

// =============================================================================
// Token verification
// =============================================================================

/// Test that audience mismatch is rejected without touching the JWKS.
#[tokio::test]
async fn test_audience_mismatch_rejected() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let token = TestTokenBuilder::new()
        .audience("https://other.example.com")
        .build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 401);
    assert_eq!(error_message(response).await, "invalid audience");
    assert_eq!(server.jwks_fetches().await, 0);

    Ok(())
}

/// Test that an array audience containing the expected value is accepted.
#[tokio::test]
async fn test_array_audience_accepted() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let token = TestTokenBuilder::new()
        .audiences(&["https://other.example.com", TEST_AUDIENCE])
        .build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 200);

    Ok(())
}

/// Test that issuer mismatch is rejected.
#[tokio::test]
async fn test_issuer_mismatch_rejected() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let token = TestTokenBuilder::new()
        .issuer("https://evil.example.com/")
        .build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 401);
    assert_eq!(error_message(response).await, "invalid issuer");

    Ok(())
}

/// Test that expired tokens are rejected.
#[tokio::test]
async fn test_expired_token_rejected() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let now = chrono::Utc::now().timestamp();
    let token = TestTokenBuilder::new()
        .issued_at(now - 7200)
        .expires_at(now - 3600)
        .build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 401);

    Ok(())
}

/// Test that a token signed by a key outside the JWKS is rejected.
#[tokio::test]
async fn test_unknown_kid_rejected() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let token = TestTokenBuilder::new()
        .signed_with(TestSigningKey::rotated())
        .build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 401);
    assert_eq!(
        error_message(response).await,
        "can't load public key for JWT validation"
    );

    Ok(())
}

/// Test that malformed tokens are rejected.
#[tokio::test]
async fn test_malformed_token_rejected() -> Result<()> {
    let server = TestGateServer::spawn().await?;

    let response = get_with_token(&server, "/hello", "not.a.valid.jwt").await;

    assert_eq!(response.status(), 401);
    assert_eq!(error_message(response).await, "token is malformed");

    Ok(())
}

/// Test that JWKS endpoint failures surface as 401.
#[tokio::test]
async fn test_jwks_unavailable_rejected() -> Result<()> {
    let server = TestGateServer::builder().without_jwks().spawn().await?;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(server.mock_server())
        .await;

    let token = TestTokenBuilder::new().build();
    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 401);
    assert_eq!(
        error_message(response).await,
        "can't load public key for JWT validation"
    );

    Ok(())
}

/// Test that keys published as x5c certificates verify tokens.
#[tokio::test]
async fn test_x5c_key_verifies_token() -> Result<()> {
    let server = TestGateServer::builder()
        .jwks(vec![TestSigningKey::primary().x5c_jwk()])
        .spawn()
        .await?;
    let token = TestTokenBuilder::new().build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 200);

    Ok(())
}

// =============================================================================
// Key rotation and caching
// =============================================================================

/// Test that a newly published key is picked up without a restart.
#[tokio::test]
async fn test_key_rotation_recovery() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let rotated_token = TestTokenBuilder::new()
        .signed_with(TestSigningKey::rotated())
        .build();

    let response = get_with_token(&server, "/hello", &rotated_token).await;
    assert_eq!(response.status(), 401);

    // Publish the rotated key alongside the primary
    server.mock_server().reset().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(&[
            TestSigningKey::primary().jwk(),
            TestSigningKey::rotated().jwk(),
        ])))
        .mount(server.mock_server())
        .await;

    let response = get_with_token(&server, "/hello", &rotated_token).await;
    assert_eq!(response.status(), 200);

    let response = get_with_token(&server, "/hello", &TestTokenBuilder::new().build()).await;
    assert_eq!(response.status(), 200);

    Ok(())
}

/// Test that concurrent first requests share a single JWKS fetch.
#[tokio::test]
async fn test_concurrent_requests_fetch_jwks_once() -> Result<()> {
    let server = TestGateServer::builder().without_jwks().spawn().await?;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_document(&[TestSigningKey::primary().jwk()]))
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .expect(1)
        .mount(server.mock_server())
        .await;

    let token = TestTokenBuilder::new().build();
    let requests = (0..10).map(|_| get_with_token(&server, "/hello", &token));
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.status(), 200);
    }
    server.mock_server().verify().await;

    Ok(())
}

// =============================================================================
// Claims projection
// =============================================================================

/// Test that mapped claims reach the handler's context.
#[tokio::test]
async fn test_me_shows_projected_claims() -> Result<()> {
    let server = TestGateServer::builder()
        .env("CLAIM_CONTEXT_MAPPING", "sub=user,email=email")
        .spawn()
        .await?;
    let token = TestTokenBuilder::new()
        .subject("alice")
        .claim("email", json!("alice@example.com"))
        .build();

    let response = get_with_token(&server, "/me", &token).await;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["kid"], TestSigningKey::primary().kid());
    assert_eq!(
        body["context"],
        json!({"user": "alice", "email": "alice@example.com"})
    );

    Ok(())
}

/// Test that a missing mapped claim rejects the request.
#[tokio::test]
async fn test_missing_mapped_claim_rejected() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let server = TestGateServer::builder()
        .routes(counting_routes(Arc::clone(&calls)))
        .env("CLAIM_CONTEXT_MAPPING", "sub=user,email=email")
        .spawn()
        .await?;
    let token = TestTokenBuilder::new().build();

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 401);
    assert_eq!(
        error_message(response).await,
        "email claim not found in claims"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    Ok(())
}

/// Test that public requests get an empty context.
#[tokio::test]
async fn test_public_me_is_unauthenticated() -> Result<()> {
    let server = TestGateServer::builder()
        .env("PUBLIC_URL_PREFIXES", "/me")
        .env("CLAIM_CONTEXT_MAPPING", "sub=user")
        .spawn()
        .await?;

    let response = reqwest::get(format!("{}/me", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["context"], json!({}));

    Ok(())
}

/// Test that oversized tokens are rejected before decoding.
#[tokio::test]
async fn test_oversized_token_rejected() -> Result<()> {
    let server = TestGateServer::spawn().await?;
    let token = TestTokenBuilder::new()
        .claim("padding", json!("x".repeat(9000)))
        .build();
    assert!(token.len() > common::jwt::MAX_JWT_SIZE_BYTES);

    let response = get_with_token(&server, "/hello", &token).await;

    assert_eq!(response.status(), 401);
    assert_eq!(error_message(response).await, "token is malformed");
    assert_eq!(server.jwks_fetches().await, 0);

    Ok(())
}
