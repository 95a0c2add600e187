//! Gatekeeper error types.
//!
//! `KeyLoadError` classifies JWKS failures inside the key loader.
//! `AuthError` is what the auth gate and the claims projector reject a
//! request with; it maps to `401 Unauthorized` with a `{"error": "..."}`
//! body via the `IntoResponse` impl. Key-loading details are logged
//! server-side and never returned to clients.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Value of the `WWW-Authenticate` header on 401 responses.
const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"gatekeeper\", error=\"invalid_token\"";

/// Failures while loading or resolving JWKS key material.
///
/// `Clone` so that every caller coalesced onto one fetch receives the same
/// outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyLoadError {
    /// Network or transport failure reaching the JWKS endpoint.
    #[error("failed to fetch JWKS: {0}")]
    Fetch(String),

    /// The JWKS body is not a valid key set document.
    #[error("failed to parse JWKS: {0}")]
    Parse(String),

    /// No entry in the key set carries the requested key ID.
    #[error("key {0:?} not found in JWKS")]
    KeyNotFound(String),

    /// The entry exists but its key material cannot be decoded.
    #[error("key {kid:?} in JWKS is unusable: {reason}")]
    InvalidKey { kid: String, reason: String },
}

impl KeyLoadError {
    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            KeyLoadError::Fetch(_) => "fetch",
            KeyLoadError::Parse(_) => "parse",
            KeyLoadError::KeyNotFound(_) => "key_not_found",
            KeyLoadError::InvalidKey { .. } => "invalid_key",
        }
    }
}

/// Reasons a request is rejected by authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header, or not of the form `Bearer <token>`.
    #[error("{0}")]
    MissingToken(&'static str),

    /// Not a structurally valid JWT (size, segments, header, kid).
    #[error("token is malformed")]
    MalformedToken,

    #[error("invalid audience")]
    InvalidAudience,

    #[error("invalid issuer")]
    InvalidIssuer,

    /// Header `alg` is anything other than RS256.
    #[error("expected RS256 signing method but token specified {0}")]
    UnsupportedAlgorithm(String),

    /// Key resolution failed even after a JWKS reload.
    #[error("can't load public key for JWT validation")]
    KeyLoad(#[source] KeyLoadError),

    /// Signature did not verify against the resolved key.
    #[error("token signature is invalid")]
    Signature,

    /// `exp`, `nbf` or `iat` outside the accepted window.
    #[error("token is expired or not yet valid")]
    Expired,

    /// A claim required by the claim-to-context mapping is absent.
    #[error("{0} claim not found in claims")]
    MissingClaim(String),
}

impl AuthError {
    /// HTTP status of the rejection. Every authentication failure is a 401.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::MissingToken(_) => "missing_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::KeyLoad(_) => "key_load",
            AuthError::Signature => "signature",
            AuthError::Expired => "expired",
            AuthError::MissingClaim(_) => "missing_claim",
        }
    }
}

/// JSON error body shared by every rejection.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::KeyLoad(source) = &self {
            // Log actual cause server-side, return generic message to client
            tracing::warn!(target: "gk.auth", error = %source, "Rejecting request: key load failed");
        } else {
            tracing::debug!(target: "gk.auth", error = %self, "Rejecting request");
        }

        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(WWW_AUTHENTICATE_VALUE),
        );
        response
    }
}

/// Body for requests whose handler panicked.
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
        }),
    )
        .into_response()
}
