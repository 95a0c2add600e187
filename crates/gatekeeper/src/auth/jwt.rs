//! Bearer token verification.
//!
//! Validates incoming JWTs against keys resolved through a [`KeyResolver`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - `aud` and `iss` are checked before any key is resolved
//! - Only RS256 is accepted
//! - `exp`/`nbf` (when present) and `iat` are validated with clock skew tolerance
//! - A failed key resolution triggers exactly one JWKS reload and retry

use crate::auth::claims::{Claims, VerifiedToken};
use crate::auth::jwks::{KeyResolver, VerificationKey};
use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::{extract_kid, peek_claims, validate_iat};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Verifies bearer tokens for one audience and issuer.
pub struct TokenVerifier {
    resolver: Arc<dyn KeyResolver>,
    audience: String,
    issuer: String,
    clock_skew: Duration,
}

impl TokenVerifier {
    pub fn new(
        resolver: Arc<dyn KeyResolver>,
        audience: String,
        issuer: String,
        clock_skew: Duration,
    ) -> Self {
        Self {
            resolver,
            audience,
            issuer,
            clock_skew,
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify a token and return its claims.
    ///
    /// # Checks, in order
    ///
    /// 1. Size and structure, with an unverified read of the payload
    /// 2. `aud` contains the configured audience (string or array, exact match)
    /// 3. `iss` equals the configured issuer
    /// 4. Header `alg` is RS256 and a `kid` is present
    /// 5. Key resolution, with one reload + retry on failure
    /// 6. RS256 signature, `exp`/`nbf` with leeway
    /// 7. `iat` not further in the future than the clock skew
    ///
    /// # Errors
    ///
    /// The first failed check, as an [`AuthError`].
    #[instrument(skip_all, name = "gk.auth.verify")]
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        let result = self.verify_inner(token).await;
        match &result {
            Ok(_) => metrics::record_token_validation("success", None),
            Err(e) => metrics::record_token_validation("error", Some(e.error_type())),
        }
        result
    }

    async fn verify_inner(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        let unverified = peek_claims(token).map_err(|e| {
            tracing::debug!(target: "gk.auth.jwt", error = ?e, "Token payload could not be read");
            AuthError::MalformedToken
        })?;

        if !audience_matches(&unverified, &self.audience) {
            tracing::debug!(target: "gk.auth.jwt", "Token rejected: audience mismatch");
            return Err(AuthError::InvalidAudience);
        }
        if unverified.get("iss").and_then(Value::as_str) != Some(self.issuer.as_str()) {
            tracing::debug!(target: "gk.auth.jwt", "Token rejected: issuer mismatch");
            return Err(AuthError::InvalidIssuer);
        }

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "gk.auth.jwt", error = %e, "Token header could not be decoded");
            AuthError::MalformedToken
        })?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = extract_kid(token).map_err(|e| {
            tracing::debug!(target: "gk.auth.jwt", error = ?e, "Token kid extraction failed");
            AuthError::MalformedToken
        })?;

        let key = self.resolve_key(&kid).await?;
        let claims = self.verify_signature(token, &key)?;

        if let Some(iat) = claims.issued_at() {
            validate_iat(iat, self.clock_skew).map_err(|e| {
                tracing::debug!(target: "gk.auth.jwt", error = ?e, "Token iat validation failed");
                AuthError::Expired
            })?;
        }

        tracing::debug!(target: "gk.auth.jwt", kid = %kid, "Token validated successfully");
        Ok(VerifiedToken::new(kid, claims))
    }

    /// Resolve `kid`, reloading the key set once if the first attempt fails.
    async fn resolve_key(&self, kid: &str) -> Result<Arc<VerificationKey>, AuthError> {
        let first = self.resolver.lookup(kid).await;
        match first.key {
            Ok(key) => Ok(key),
            Err(e) => {
                tracing::info!(target: "gk.auth.jwt", kid = %kid, error = %e, "Key resolution failed, reloading JWKS");
                self.resolver.reload(first.generation).await;
                self.resolver
                    .get_public_key(kid)
                    .await
                    .map_err(AuthError::KeyLoad)
            }
        }
    }

    fn verify_signature(&self, token: &str, key: &VerificationKey) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.clock_skew.as_secs();

        let token_data = decode::<Claims>(token, key.decoding_key(), &validation).map_err(|e| {
            tracing::debug!(target: "gk.auth.jwt", error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthError::Expired,
                _ => AuthError::Signature,
            }
        })?;

        Ok(token_data.claims)
    }
}

/// `aud` may be a single string or an array of strings.
fn audience_matches(claims: &Map<String, Value>, audience: &str) -> bool {
    match claims.get("aud") {
        Some(Value::String(aud)) => aud == audience,
        Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(audience)),
        _ => false,
    }
}
