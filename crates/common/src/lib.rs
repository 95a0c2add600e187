//! Common utilities shared across gatekeeper crates.

#![warn(clippy::pedantic)]

/// Module for JWT structure helpers (size limits, kid extraction, unverified claims)
pub mod jwt;
