//! Builder patterns for test tokens
//!
//! Produces signed RS256 JWTs with sensible defaults for the claims the
//! gatekeeper checks.

use crate::crypto_fixtures::TestSigningKey;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::{Map, Value};

/// Audience the test gatekeeper expects.
pub const TEST_AUDIENCE: &str = "http://localhost";

/// Issuer the test gatekeeper expects.
pub const TEST_ISSUER: &str = "https://issuer.example.com/";

/// Builder for signed test JWTs
///
/// Defaults: `sub` "alice", `aud` [`TEST_AUDIENCE`], `iss` [`TEST_ISSUER`],
/// issued now, expiring in one hour, signed by the primary test key with its
/// `kid` in the header.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .subject("bob")
///     .claim("email", json!("bob@example.com"))
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    signing_key: TestSigningKey,
    include_kid: bool,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::from("alice"));
        claims.insert("aud".to_string(), Value::from(TEST_AUDIENCE));
        claims.insert("iss".to_string(), Value::from(TEST_ISSUER));
        claims.insert("iat".to_string(), Value::from(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            Value::from((now + Duration::seconds(3600)).timestamp()),
        );
        Self {
            claims,
            signing_key: TestSigningKey::primary(),
            include_kid: true,
        }
    }

    pub fn subject(self, subject: &str) -> Self {
        self.claim("sub", Value::from(subject))
    }

    /// Single-string audience
    pub fn audience(self, audience: &str) -> Self {
        self.claim("aud", Value::from(audience))
    }

    /// Array audience
    pub fn audiences(self, audiences: &[&str]) -> Self {
        self.claim(
            "aud",
            Value::Array(audiences.iter().map(|a| Value::from(*a)).collect()),
        )
    }

    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", Value::from(issuer))
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.claim("iat", Value::from(timestamp))
    }

    /// Set expiration timestamp
    pub fn expires_at(self, timestamp: i64) -> Self {
        self.claim("exp", Value::from(timestamp))
    }

    /// Set not-before timestamp
    pub fn not_before(self, timestamp: i64) -> Self {
        self.claim("nbf", Value::from(timestamp))
    }

    /// Set an arbitrary claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Drop a claim, including defaults
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Leave `kid` out of the header
    pub fn without_kid(mut self) -> Self {
        self.include_kid = false;
        self
    }

    pub fn signed_with(mut self, signing_key: TestSigningKey) -> Self {
        self.signing_key = signing_key;
        self
    }

    /// The claims as a JSON value
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign and serialize the token.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub fn build(self) -> String {
        let mut header = Header::new(Algorithm::RS256);
        if self.include_kid {
            header.kid = Some(self.signing_key.kid().to_string());
        }
        encode(
            &header,
            &Value::Object(self.claims),
            &self.signing_key.encoding_key(),
        )
        .expect("test token signing should succeed")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
