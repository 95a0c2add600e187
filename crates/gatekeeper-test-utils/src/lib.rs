//! # Gatekeeper Test Utilities
//!
//! Shared test utilities for the gatekeeper.
//!
//! This crate provides:
//! - RSA signing keys and JWKS documents (`crypto_fixtures`)
//! - Signed token construction (`TestTokenBuilder`)
//! - Server test harness (`TestGateServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gatekeeper_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let server = TestGateServer::spawn().await?;
//!     let token = TestTokenBuilder::new().subject("alice").build();
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use token_builders::*;
