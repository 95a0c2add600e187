//! JWT structure helpers shared by the verifier and the test utilities.
//!
//! These functions look at a compact JWT *without* verifying its signature.
//! They exist so the verifier can pick a key (`kid`) and reject tokens with
//! the wrong audience or issuer before any key material is fetched.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any base64 or JSON decoding
//! - Nothing returned from this module is trusted until the signature has
//!   been verified against a key from the JWKS
//! - Error messages are generic; details go to debug logs only

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (8KB).
///
/// Identity-provider access tokens are typically well under 2KB. Anything
/// larger is rejected before it is decoded.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for time-based claims (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound for configurable clock skew (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Structural problems with a compact JWT.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Not three dot-separated segments, bad base64, or bad JSON.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// `iat` lies further in the future than the allowed clock skew.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three segments after the size check.
fn segments(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode one base64url segment into a JSON object.
fn decode_segment(segment: &str, what: &'static str) -> Result<Map<String, Value>, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, segment = what, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            tracing::debug!(target: "common.jwt", segment = what, "JWT segment is not a JSON object");
            Err(JwtValidationError::MalformedToken)
        }
        Err(e) => {
            tracing::debug!(target: "common.jwt", error = %e, segment = what, "Failed to parse JWT segment JSON");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// The returned value must only be used to look up a key in a trusted JWKS.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong structure, bad base64 or invalid JSON
/// - `MissingKid` - header has no `kid`, or it is empty or not a string
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let (header, _, _) = segments(token)?;
    let header = decode_segment(header, "header")?;

    header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Decode the payload of a JWT without verifying the signature.
///
/// Used for cheap pre-checks (`aud`, `iss`) that must run before any key is
/// resolved. Callers must still verify the signature before trusting claims.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong structure, bad base64, or payload is not a JSON object
pub fn peek_claims(token: &str) -> Result<Map<String, Value>, JwtValidationError> {
    let (_, payload, _) = segments(token)?;
    decode_segment(payload, "payload")
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
