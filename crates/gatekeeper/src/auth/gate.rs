//! Per-request authentication decision.
//!
//! Each request ends in exactly one [`GateDecision`]: exempt (public path),
//! verified (valid bearer token) or rejected. The decision is linear; the
//! only retry happens inside the verifier's key reload.

use crate::auth::claims::VerifiedToken;
use crate::auth::jwks::JwksKeyLoader;
use crate::auth::jwt::TokenVerifier;
use crate::config::OidcConfig;
use crate::errors::AuthError;
use axum::http::{header, HeaderMap};
use std::sync::Arc;

const MISSING_TOKEN: &str = "required authorization token not found";
const MALFORMED_HEADER: &str = "Authorization header format must be Bearer {token}";

/// Path prefixes exempt from authentication.
///
/// Prefixes are tested in configuration order and the first match exempts
/// the request. Overlapping prefixes are not ranked by specificity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicPaths {
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// The first configured prefix `path` starts with.
    pub fn matching_prefix(&self, path: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .map(String::as_str)
            .find(|prefix| path.starts_with(prefix))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.matching_prefix(path).is_some()
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// Terminal outcome of the auth gate for one request.
#[derive(Debug)]
pub enum GateDecision {
    Exempt,
    Verified(VerifiedToken),
    Rejected(AuthError),
}

/// Bearer-token gate in front of protected routes.
pub struct AuthGate {
    verifier: TokenVerifier,
    public_paths: PublicPaths,
}

impl AuthGate {
    pub fn new(verifier: TokenVerifier, public_paths: PublicPaths) -> Self {
        Self {
            verifier,
            public_paths,
        }
    }

    /// Gate backed by an HTTP JWKS loader for `oidc`.
    pub fn from_config(oidc: &OidcConfig) -> Self {
        let loader = JwksKeyLoader::from_url(oidc.jwks_url.clone(), oidc.jwks_http_timeout);
        let verifier = TokenVerifier::new(
            Arc::new(loader),
            oidc.audience.clone(),
            oidc.issuer.clone(),
            oidc.clock_skew,
        );
        Self::new(verifier, PublicPaths::new(oidc.public_url_prefixes.clone()))
    }

    pub fn public_paths(&self) -> &PublicPaths {
        &self.public_paths
    }

    /// Decide the request at `path` carrying `headers`.
    pub async fn decide(&self, path: &str, headers: &HeaderMap) -> GateDecision {
        if let Some(prefix) = self.public_paths.matching_prefix(path) {
            tracing::trace!(target: "gk.auth.gate", prefix = %prefix, "Public path, skipping authentication");
            return GateDecision::Exempt;
        }

        let token = match bearer_token(headers) {
            Ok(token) => token,
            Err(e) => return GateDecision::Rejected(e),
        };

        match self.verifier.verify(token).await {
            Ok(verified) => GateDecision::Verified(verified),
            Err(e) => GateDecision::Rejected(e),
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively; the header must contain exactly
/// a scheme and a token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(AuthError::MissingToken(MISSING_TOKEN));
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::MissingToken(MALFORMED_HEADER))?;
    if value.trim().is_empty() {
        return Err(AuthError::MissingToken(MISSING_TOKEN));
    }

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MissingToken(MALFORMED_HEADER)),
    }
}
