//! Authentication module for the gatekeeper.
//!
//! Bearer tokens issued by an OIDC provider are verified against the
//! provider's JWKS and their claims exposed to handlers.
//!
//! # Components
//!
//! - `jwks` - JWKS key loader with generation-stamped caching
//! - `jwt` - Token verifier (audience, issuer, RS256 signature, time claims)
//! - `gate` - Per-request exempt / verified / rejected decision
//! - `projector` - Claim-to-context projection
//! - `claims` - Claim values and the verified token

pub mod claims;
pub mod gate;
pub mod jwks;
pub mod jwt;
pub mod projector;

pub use claims::{ClaimValue, Claims, VerifiedToken};
pub use gate::{AuthGate, GateDecision, PublicPaths};
pub use jwks::{
    HttpJwksFetcher, JwksFetcher, JwksKeyLoader, KeyLookup, KeyResolver, VerificationKey,
};
pub use jwt::TokenVerifier;
pub use projector::ClaimMapping;
